//! Layer trait and related types.
//!
//! A [`Layer`] is a cheap, immutable description of what to draw. Layers
//! are recreated by the application every frame; the [`LayerState`] that
//! holds computed attributes lives in the layer manager and is carried over
//! to the next layer value with the same id.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use geoverlay_core::{
    compare_props, encode_picking_color, Callback, Logger, OverlayError, PropSet, PropValue,
    Result,
};
use geoverlay_viewport::{CoordinateSystem, UniformOptions, Viewport};
use glam::{DMat4, DVec2};

use crate::attribute::{AttributeBuffer, AttributeDescriptor, ElementType, UpdateArgs};
use crate::attribute_manager::{AttributeManager, AttributeUpdate, BufferMap};
use crate::render::{DrawCall, LayerUniforms, RenderContext};
use crate::PickInfo;

/// Name of the picking color attribute every layer carries.
pub const PICKING_COLORS_ATTRIBUTE: &str = "instancePickingColors";

/// Prop keys excluded from the generic prop diff.
const IGNORED_PROPS: &[&str] = &["data", "update_triggers"];

/// Returns true when two data values should be treated as equal.
///
/// Called with `(new, old)`.
pub type DataComparator = Callback<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Pick callback; returns true if the event was handled.
pub type PickHandler = Callback<dyn Fn(&PickInfo) -> bool>;

/// Props shared by every layer.
#[derive(Clone)]
pub struct LayerProps {
    pub id: String,
    pub visible: bool,
    pub pickable: bool,
    pub opacity: f64,
    /// Overrides the instance count deduced from data.
    pub num_instances: Option<usize>,
    /// Per-attribute invalidation keys. The key `"all"` covers every attribute.
    pub update_triggers: BTreeMap<String, PropSet>,
    pub coordinate_system: CoordinateSystem,
    /// `[lng, lat]` origin for meter-offset positions.
    pub coordinate_origin: DVec2,
    pub model_matrix: Option<DMat4>,
    /// Custom data equality; data is compared by address without one.
    pub data_comparator: Option<DataComparator>,
    /// Precomputed attribute buffers that replace the layer's updaters.
    pub buffers: BufferMap,
    pub on_click: Option<PickHandler>,
    pub on_hover: Option<PickHandler>,
}

impl LayerProps {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visible: true,
            pickable: false,
            opacity: 0.8,
            num_instances: None,
            update_triggers: BTreeMap::new(),
            coordinate_system: CoordinateSystem::LngLat,
            coordinate_origin: DVec2::ZERO,
            model_matrix: None,
            data_comparator: None,
            buffers: BufferMap::new(),
            on_click: None,
            on_hover: None,
        }
    }

    #[must_use]
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub fn pickable(mut self, pickable: bool) -> Self {
        self.pickable = pickable;
        self
    }

    #[must_use]
    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    #[must_use]
    pub fn num_instances(mut self, num_instances: usize) -> Self {
        self.num_instances = Some(num_instances);
        self
    }

    #[must_use]
    pub fn update_trigger(mut self, attribute: impl Into<String>, trigger: PropSet) -> Self {
        self.update_triggers.insert(attribute.into(), trigger);
        self
    }

    #[must_use]
    pub fn coordinate_system(mut self, system: CoordinateSystem, origin: DVec2) -> Self {
        self.coordinate_system = system;
        self.coordinate_origin = origin;
        self
    }

    #[must_use]
    pub fn model_matrix(mut self, matrix: DMat4) -> Self {
        self.model_matrix = Some(matrix);
        self
    }

    #[must_use]
    pub fn data_comparator(
        mut self,
        comparator: impl Fn(&dyn Any, &dyn Any) -> bool + 'static,
    ) -> Self {
        let comparator = Rc::new(comparator);
        let identity = PropValue::stable_identity(comparator.as_ref());
        self.data_comparator = Some(DataComparator::with_identity(comparator, identity));
        self
    }

    #[must_use]
    pub fn buffer(mut self, attribute: impl Into<String>, buffer: Rc<AttributeBuffer>) -> Self {
        self.buffers.insert(attribute.into(), buffer);
        self
    }

    #[must_use]
    pub fn on_click(mut self, handler: impl Fn(&PickInfo) -> bool + 'static) -> Self {
        self.on_click = Some(pick_handler(handler));
        self
    }

    #[must_use]
    pub fn on_hover(mut self, handler: impl Fn(&PickInfo) -> bool + 'static) -> Self {
        self.on_hover = Some(pick_handler(handler));
        self
    }

    /// The comparable subset of these props.
    ///
    /// Callbacks and external buffers are compared by identity.
    pub fn to_prop_set(&self) -> PropSet {
        let mut buffers: Vec<_> = self.buffers.iter().collect();
        buffers.sort_by(|a, b| a.0.cmp(b.0));

        let mut set = PropSet::new()
            .with("id", self.id.as_str())
            .with("visible", self.visible)
            .with("pickable", self.pickable)
            .with("opacity", self.opacity)
            .with("num_instances", self.num_instances)
            .with("coordinate_system", self.coordinate_system.to_string())
            .with("coordinate_origin", self.coordinate_origin.to_array().to_vec())
            .with(
                "model_matrix",
                self.model_matrix.map(|m| m.to_cols_array().to_vec()),
            )
            .with("data_comparator", self.data_comparator.as_ref().map(PropValue::from))
            .with("on_click", self.on_click.as_ref().map(PropValue::from))
            .with("on_hover", self.on_hover.as_ref().map(PropValue::from));
        for (name, buffer) in buffers {
            set.insert(format!("buffers.{name}"), PropValue::identity(buffer.as_ref()));
        }
        set
    }

    /// Uniform builder inputs for these props.
    pub fn uniform_options(&self) -> UniformOptions {
        UniformOptions {
            coordinate_system: self.coordinate_system,
            position_origin: self.coordinate_origin,
            model_matrix: self.model_matrix,
        }
    }
}

impl fmt::Debug for LayerProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerProps")
            .field("id", &self.id)
            .field("visible", &self.visible)
            .field("pickable", &self.pickable)
            .field("opacity", &self.opacity)
            .field("num_instances", &self.num_instances)
            .field("coordinate_system", &self.coordinate_system)
            .finish_non_exhaustive()
    }
}

fn pick_handler(handler: impl Fn(&PickInfo) -> bool + 'static) -> PickHandler {
    let handler = Rc::new(handler);
    let identity = PropValue::stable_identity(handler.as_ref());
    PickHandler::with_identity(handler, identity)
}

/// Shared per-pass context.
#[derive(Debug, Clone, Default)]
pub struct LayerContext {
    pub viewport: Option<Viewport>,
    pub old_viewport: Option<Viewport>,
    /// Set by `set_viewport`, reset after each reconciliation pass.
    pub viewport_changed: bool,
}

/// What changed between two versions of a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    pub props_changed: bool,
    pub data_changed: bool,
    pub viewport_changed: bool,
    pub something_changed: bool,
    /// Human-readable description of the first change found.
    pub reason: Option<String>,
}

impl ChangeFlags {
    /// Flags for a layer seen for the first time.
    pub fn initial(viewport_changed: bool) -> Self {
        Self {
            props_changed: true,
            data_changed: true,
            viewport_changed,
            something_changed: true,
            reason: Some("new layer".to_string()),
        }
    }

    /// Diffs an old and a new layer value.
    pub fn diff(old: &dyn Layer, new: &dyn Layer, context: &LayerContext) -> Self {
        let old_props = old.props().to_prop_set().merged(old.prop_set());
        let new_props = new.props().to_prop_set().merged(new.prop_set());
        let props_reason = compare_props(&old_props, &new_props, IGNORED_PROPS);
        let data_reason = diff_data(old, new);

        let props_changed = props_reason.is_some();
        let data_changed = data_reason.is_some();
        let viewport_changed = context.viewport_changed;
        Self {
            props_changed,
            data_changed,
            viewport_changed,
            something_changed: props_changed || data_changed || viewport_changed,
            reason: data_reason.or(props_reason),
        }
    }
}

trait MergeProps {
    fn merged(self, other: PropSet) -> Self;
}

impl MergeProps for PropSet {
    fn merged(mut self, other: PropSet) -> Self {
        for (key, value) in other.iter() {
            self.insert(key, value.clone());
        }
        self
    }
}

fn data_address(data: &dyn Any) -> *const () {
    std::ptr::from_ref(data).cast::<()>()
}

fn diff_data(old: &dyn Layer, new: &dyn Layer) -> Option<String> {
    match (old.data(), new.data()) {
        (None, None) => None,
        (Some(old_data), Some(new_data)) => {
            if let Some(comparator) = &new.props().data_comparator {
                (!comparator(new_data, old_data))
                    .then(|| "data comparator detected a change".to_string())
            } else {
                (data_address(old_data) != data_address(new_data))
                    .then(|| "a new data container was supplied".to_string())
            }
        }
        _ => Some("data was added or removed".to_string()),
    }
}

/// Invalidates attributes whose update triggers changed.
///
/// Returns true if anything was invalidated.
pub(crate) fn diff_update_triggers(
    old: &LayerProps,
    new: &LayerProps,
    attribute_manager: &mut AttributeManager,
    logger: &Logger,
) -> Result<bool> {
    let empty = PropSet::new();
    let mut change = false;
    for (name, new_triggers) in &new.update_triggers {
        let old_triggers = old.update_triggers.get(name).unwrap_or(&empty);
        let Some(reason) = compare_props(old_triggers, new_triggers, &[]) else {
            continue;
        };
        if name == "all" {
            logger.log(1, &format!("update triggers invalidating all attributes: {reason}"));
            attribute_manager.invalidate_all();
        } else {
            logger.log(1, &format!("update triggers invalidating attribute {name}: {reason}"));
            attribute_manager.invalidate(name)?;
        }
        change = true;
    }
    Ok(change)
}

/// Inputs to the update lifecycle.
pub struct UpdateParams<'a> {
    /// The previous value of this layer; `None` on initialization.
    pub old_layer: Option<&'a dyn Layer>,
    pub context: &'a LayerContext,
    pub change_flags: &'a ChangeFlags,
}

impl UpdateParams<'_> {
    pub fn old_props(&self) -> Option<&LayerProps> {
        self.old_layer.map(|layer| layer.props())
    }
}

/// Computed state of a layer, preserved across frames by id.
pub struct LayerState {
    serial: u64,
    pub attribute_manager: AttributeManager,
    needs_redraw: bool,
    num_instances: Option<usize>,
    selected_picking_color: Option<[u8; 3]>,
    user: Option<Box<dyn Any>>,
}

impl LayerState {
    pub(crate) fn new(serial: u64, id: &str, logger: Rc<Logger>) -> Result<Self> {
        let mut attribute_manager = AttributeManager::new(id, logger);
        // Every layer can render a picking scene from this attribute
        attribute_manager.add([(
            PICKING_COLORS_ATTRIBUTE,
            AttributeDescriptor::new(3)
                .element_type(ElementType::Uint8)
                .instanced(true)
                .update(calculate_instance_picking_colors),
        )])?;
        Ok(Self {
            serial,
            attribute_manager,
            needs_redraw: true,
            num_instances: None,
            selected_picking_color: None,
            user: None,
        })
    }

    /// Unique per state; stays the same while the state moves between layers.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn set_needs_redraw(&mut self, redraw: bool) {
        self.needs_redraw = redraw;
    }

    /// Whether this layer or its attributes need a redraw, optionally clearing.
    pub fn get_needs_redraw(&mut self, clear_redraw_flags: bool) -> bool {
        let redraw = self.needs_redraw;
        self.needs_redraw = redraw && !clear_redraw_flags;
        let attributes = self.attribute_manager.get_needs_redraw(clear_redraw_flags);
        redraw || attributes
    }

    /// Overrides the instance count for this layer.
    pub fn set_num_instances(&mut self, num_instances: Option<usize>) {
        self.num_instances = num_instances;
    }

    /// The color under the pointer from the last hover pick.
    pub fn selected_picking_color(&self) -> Option<[u8; 3]> {
        self.selected_picking_color
    }

    pub(crate) fn set_selected_picking_color(&mut self, color: [u8; 3]) {
        self.selected_picking_color = Some(color);
        self.needs_redraw = true;
    }

    /// Layer-specific state.
    pub fn user_state<T: Any>(&self) -> Option<&T> {
        self.user.as_ref()?.downcast_ref()
    }

    pub fn user_state_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user.as_mut()?.downcast_mut()
    }

    /// Replaces the layer-specific state and requests a redraw.
    pub fn set_user_state<T: Any>(&mut self, state: T) {
        self.user = Some(Box::new(state));
        self.needs_redraw = true;
    }
}

impl fmt::Debug for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerState")
            .field("serial", &self.serial)
            .field("attribute_manager", &self.attribute_manager)
            .field("needs_redraw", &self.needs_redraw)
            .field("num_instances", &self.num_instances)
            .finish_non_exhaustive()
    }
}

fn calculate_instance_picking_colors(
    buffer: &mut AttributeBuffer,
    args: &UpdateArgs<'_, dyn Layer>,
) {
    let Some(values) = buffer.as_u8_mut() else {
        return;
    };
    for i in 0..args.num_instances {
        let color = encode_picking_color(i);
        values[i * args.size..i * args.size + 3].copy_from_slice(&color);
    }
}

/// A drawable, pickable description of data.
///
/// Implementors hold props and data; everything computed from them goes in
/// the [`LayerState`] passed to the lifecycle methods.
pub trait Layer: Any {
    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable reference to self as `Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Returns the type name of this layer (e.g., "`ScatterplotLayer`").
    fn type_name(&self) -> &'static str;

    fn props(&self) -> &LayerProps;

    fn id(&self) -> &str {
        &self.props().id
    }

    /// Layer-specific props, diffed together with the base props.
    fn prop_set(&self) -> PropSet {
        PropSet::new()
    }

    /// The data container, compared by address unless a comparator is set.
    fn data(&self) -> Option<&dyn Any> {
        None
    }

    /// Number of items in the data, if known.
    fn data_len(&self) -> Option<usize> {
        None
    }

    /// Called once when no previous state exists. Register attributes here.
    fn initialize_state(&mut self, state: &mut LayerState, context: &LayerContext) -> Result<()>;

    /// Called when this layer takes over the state of `old_layer`.
    ///
    /// Every matched layer on a level has been given its state before any
    /// of them runs [`Layer::update_state`].
    fn transfer_state(&mut self, _old_layer: &dyn Layer, _state: &mut LayerState) {}

    fn should_update_state(&self, params: &UpdateParams<'_>) -> bool {
        params.change_flags.something_changed
    }

    /// Default: recompute every attribute when data changed.
    fn update_state(&mut self, state: &mut LayerState, params: &UpdateParams<'_>) -> Result<()> {
        if params.change_flags.data_changed {
            state.attribute_manager.invalidate_all();
        }
        Ok(())
    }

    /// Called once when the state is about to be discarded.
    fn finalize_state(&mut self, _state: &mut LayerState) -> Result<()> {
        Ok(())
    }

    /// Produces child layers, matched against the same pool of old layers.
    fn render_layers(&self, _state: &LayerState) -> Option<Vec<Box<dyn Layer>>> {
        None
    }

    fn draw(
        &self,
        state: &LayerState,
        uniforms: &LayerUniforms,
        ctx: &mut dyn RenderContext,
    ) -> Result<()> {
        ctx.draw(&DrawCall {
            layer_id: self.id(),
            type_name: self.type_name(),
            state,
            uniforms,
        })
    }

    /// Renders the picking scene and reads the color under `device_pixel`.
    fn pick(
        &self,
        state: &LayerState,
        uniforms: &LayerUniforms,
        device_pixel: DVec2,
        ctx: &mut dyn RenderContext,
    ) -> Result<[u8; 4]> {
        ctx.pick(
            &DrawCall {
                layer_id: self.id(),
                type_name: self.type_name(),
                state,
                uniforms,
            },
            device_pixel,
        )
    }
}

impl fmt::Display for dyn Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}:'{}'>", self.type_name(), self.id())
    }
}

/// Resolves the instance count: state override, then props, then data.
pub fn num_instances(layer: &dyn Layer, state: &LayerState) -> Result<usize> {
    state
        .num_instances
        .or(layer.props().num_instances)
        .or_else(|| layer.data_len())
        .ok_or_else(|| OverlayError::layer(layer.id(), "could not deduce num_instances"))
}

/// Runs the attribute updaters for a layer against its current props.
pub(crate) fn update_attributes(
    layer: &(dyn Layer + 'static),
    state: &mut LayerState,
) -> Result<()> {
    let num_instances = num_instances(layer, state)?;
    state.attribute_manager.update(&AttributeUpdate {
        num_instances,
        buffers: &layer.props().buffers,
        context: layer,
        ignore_unknown_attributes: true,
    })?;
    // Base uniforms (opacity) are recomputed; request a redraw as they may differ
    state.needs_redraw = true;
    Ok(())
}
