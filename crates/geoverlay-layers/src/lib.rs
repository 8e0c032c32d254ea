//! Layer lifecycle and attribute management for geoverlay-rs.
//!
//! Applications describe what to draw as a list of [`Layer`] values, rebuilt
//! every frame. The [`LayerManager`] matches each list against the previous
//! one by id, moves the per-layer [`LayerState`] to the new value, and lets
//! the [`AttributeManager`] recompute only the buffers that went stale.
//! Drawing and picking go through the [`RenderContext`] trait.

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Layer and attribute types are generic over their update context
#![allow(clippy::module_name_repetitions)]

pub mod attribute;
pub mod attribute_manager;
pub mod draw_and_pick;
pub mod layer;
pub mod layer_manager;
pub mod render;
pub mod scatterplot;

#[cfg(test)]
mod test_support;

pub use attribute::{
    Attribute, AttributeBinding, AttributeBuffer, AttributeDescriptor, ElementType, UpdateArgs,
    UpdateFn,
};
pub use attribute_manager::{AttributeManager, AttributeUpdate, BufferMap, UpdateHook};
pub use draw_and_pick::PickInfo;
pub use layer::{
    num_instances, ChangeFlags, DataComparator, Layer, LayerContext, LayerProps, LayerState,
    PickHandler, UpdateParams, PICKING_COLORS_ATTRIBUTE,
};
pub use layer_manager::LayerManager;
pub use render::{DrawCall, LayerUniforms, RenderContext, OPACITY_GAMMA};
pub use scatterplot::{accessor, Accessor, ScatterplotLayer};
