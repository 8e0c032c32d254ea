//! Instanced circles at data positions.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use geoverlay_core::{Callback, PropSet, PropValue, Result};
use glam::DVec3;

use crate::attribute::{AttributeBuffer, AttributeDescriptor, ElementType, UpdateArgs};
use crate::layer::{Layer, LayerContext, LayerProps, LayerState};

/// Radius used when no radius accessor is given.
pub const DEFAULT_RADIUS: f64 = 30.0;
/// Color used when no color accessor is given.
pub const DEFAULT_COLOR: [u8; 4] = [255, 0, 255, 255];

pub const POSITIONS_ATTRIBUTE: &str = "instancePositions";
pub const RADIUS_ATTRIBUTE: &str = "instanceRadius";
pub const COLORS_ATTRIBUTE: &str = "instanceColors";

/// A per-datum accessor.
///
/// Functions and closures that capture nothing keep their identity when a
/// layer is rebuilt. For a capturing closure, build the accessor once and
/// clone it into each rebuilt layer.
pub type Accessor<T, R> = Callback<dyn Fn(&T) -> R>;

/// Wraps a function as an [`Accessor`].
pub fn accessor<T, R>(func: impl Fn(&T) -> R + 'static) -> Accessor<T, R> {
    let func = Rc::new(func);
    let identity = PropValue::stable_identity(func.as_ref());
    let func: Rc<dyn Fn(&T) -> R> = func;
    Accessor::with_identity(func, identity)
}

/// One circle per datum.
///
/// Attributes are recomputed when `data` changes. Swapping an accessor
/// alone does not recompute anything; pair it with an update trigger on the
/// matching attribute name.
pub struct ScatterplotLayer<T> {
    props: LayerProps,
    data: Rc<Vec<T>>,
    get_position: Accessor<T, DVec3>,
    get_radius: Accessor<T, f64>,
    get_color: Accessor<T, [u8; 4]>,
}

impl<T: 'static> ScatterplotLayer<T> {
    pub fn new(
        id: impl Into<String>,
        data: Rc<Vec<T>>,
        get_position: impl Fn(&T) -> DVec3 + 'static,
    ) -> Self {
        Self {
            props: LayerProps::new(id),
            data,
            get_position: accessor(get_position),
            get_radius: accessor(|_: &T| DEFAULT_RADIUS),
            get_color: accessor(|_: &T| DEFAULT_COLOR),
        }
    }

    #[must_use]
    pub fn with_props(mut self, f: impl FnOnce(LayerProps) -> LayerProps) -> Self {
        self.props = f(self.props);
        self
    }

    #[must_use]
    pub fn get_radius(self, get_radius: impl Fn(&T) -> f64 + 'static) -> Self {
        self.radius_accessor(accessor(get_radius))
    }

    #[must_use]
    pub fn get_color(self, get_color: impl Fn(&T) -> [u8; 4] + 'static) -> Self {
        self.color_accessor(accessor(get_color))
    }

    #[must_use]
    pub fn position_accessor(mut self, get_position: Accessor<T, DVec3>) -> Self {
        self.get_position = get_position;
        self
    }

    #[must_use]
    pub fn radius_accessor(mut self, get_radius: Accessor<T, f64>) -> Self {
        self.get_radius = get_radius;
        self
    }

    #[must_use]
    pub fn color_accessor(mut self, get_color: Accessor<T, [u8; 4]>) -> Self {
        self.get_color = get_color;
        self
    }

    pub fn data(&self) -> &Rc<Vec<T>> {
        &self.data
    }
}

impl<T> Clone for ScatterplotLayer<T> {
    fn clone(&self) -> Self {
        Self {
            props: self.props.clone(),
            data: Rc::clone(&self.data),
            get_position: self.get_position.clone(),
            get_radius: self.get_radius.clone(),
            get_color: self.get_color.clone(),
        }
    }
}

impl<T> fmt::Debug for ScatterplotLayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScatterplotLayer")
            .field("props", &self.props)
            .field("data_len", &self.data.len())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn calculate_instance_positions<T: 'static>(
    buffer: &mut AttributeBuffer,
    args: &UpdateArgs<'_, dyn Layer>,
) {
    let (Some(layer), Some(values)) = (args.layer::<ScatterplotLayer<T>>(), buffer.as_f32_mut())
    else {
        return;
    };
    for (datum, value) in layer.data.iter().zip(values.chunks_exact_mut(args.size)) {
        let position = (layer.get_position)(datum);
        for (out, component) in value.iter_mut().zip(position.to_array()) {
            *out = if component.is_nan() { 0.0 } else { component as f32 };
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn calculate_instance_radius<T: 'static>(
    buffer: &mut AttributeBuffer,
    args: &UpdateArgs<'_, dyn Layer>,
) {
    let (Some(layer), Some(values)) = (args.layer::<ScatterplotLayer<T>>(), buffer.as_f32_mut())
    else {
        return;
    };
    for (datum, value) in layer.data.iter().zip(values.chunks_exact_mut(args.size)) {
        let radius = (layer.get_radius)(datum);
        value[0] = if radius.is_nan() { 1.0 } else { radius as f32 };
    }
}

fn calculate_instance_colors<T: 'static>(
    buffer: &mut AttributeBuffer,
    args: &UpdateArgs<'_, dyn Layer>,
) {
    let (Some(layer), Some(values)) = (args.layer::<ScatterplotLayer<T>>(), buffer.as_u8_mut())
    else {
        return;
    };
    for (datum, value) in layer.data.iter().zip(values.chunks_exact_mut(args.size)) {
        value.copy_from_slice(&(layer.get_color)(datum));
    }
}

impl<T: 'static> Layer for ScatterplotLayer<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        "ScatterplotLayer"
    }

    fn props(&self) -> &LayerProps {
        &self.props
    }

    fn prop_set(&self) -> PropSet {
        PropSet::new()
            .with("get_position", &self.get_position)
            .with("get_radius", &self.get_radius)
            .with("get_color", &self.get_color)
    }

    fn data(&self) -> Option<&dyn Any> {
        Some(self.data.as_ref())
    }

    fn data_len(&self) -> Option<usize> {
        Some(self.data.len())
    }

    fn initialize_state(&mut self, state: &mut LayerState, _context: &LayerContext) -> Result<()> {
        state.attribute_manager.add([
            (
                POSITIONS_ATTRIBUTE,
                AttributeDescriptor::new(3)
                    .instanced(true)
                    .update(calculate_instance_positions::<T>),
            ),
            (
                RADIUS_ATTRIBUTE,
                AttributeDescriptor::new(1)
                    .instanced(true)
                    .update(calculate_instance_radius::<T>),
            ),
            (
                COLORS_ATTRIBUTE,
                AttributeDescriptor::new(4)
                    .element_type(ElementType::Uint8)
                    .instanced(true)
                    .update(calculate_instance_colors::<T>),
            ),
        ])
    }
}
