//! geoverlay-rs: GPU-instanced geospatial layers drawn over a web map.
//!
//! The crate covers the two parts of a map overlay that carry real
//! algorithmic weight: viewport projection math and the layer lifecycle.
//! Rendering itself is left to a [`RenderContext`] supplied by the caller.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use geoverlay::*;
//!
//! # fn run(ctx: &mut dyn RenderContext) -> Result<()> {
//! init_logging();
//!
//! let points = Rc::new(vec![DVec3::new(-122.4, 37.8, 0.0)]);
//! let mut overlay = Overlay::new(Options::default());
//! let map_state = MapState {
//!     width: 800.0,
//!     height: 600.0,
//!     ..Default::default()
//! };
//!
//! let layer = ScatterplotLayer::new("points", points, |p: &DVec3| *p)
//!     .with_props(|props| props.pickable(true));
//! overlay.frame(&map_state, [Box::new(layer) as Box<dyn Layer>], ctx)?;
//!
//! let _picked = overlay.pick(400.0, 300.0, PickMode::Click, ctx)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`Viewport`] and [`WebMercatorViewport`] project between world and pixel space
//! - [`get_uniforms_from_viewport`] turns a viewport into shader uniforms
//! - [`LayerManager`] matches layer lists across frames by id and keeps state alive
//! - [`AttributeManager`] recomputes only the attribute buffers that went stale

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]

mod overlay;

pub use overlay::Overlay;

// Re-export core types
pub use geoverlay_core::{
    decode_picking_color, encode_picking_color, fp64ify, Callback, Logger, Options, OverlayError,
    PickMode, PropSet, PropValue, Result,
};

// Re-export viewport types
pub use geoverlay_viewport::{
    get_uniforms_from_viewport, CoordinateSystem, MapState, OrthographicParams,
    OrthographicViewport, PerspectiveParams, PerspectiveViewport, ProjectOptions,
    ProjectionUniforms, UniformOptions, Viewport, ViewportDescriptor, ViewportUniforms,
    WebMercatorViewport,
};

// Re-export layer types
pub use geoverlay_layers::{
    accessor, Accessor, AttributeBuffer, AttributeDescriptor, AttributeManager, ChangeFlags,
    DrawCall, ElementType, Layer, LayerContext, LayerManager, LayerProps, LayerState,
    LayerUniforms, PickInfo, RenderContext, ScatterplotLayer, UpdateArgs, UpdateParams,
};

pub use glam::{DMat4, DVec2, DVec3, DVec4};

/// Installs `env_logger` as the `log` backend. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
