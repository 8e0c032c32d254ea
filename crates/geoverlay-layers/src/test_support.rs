//! Shared fixtures for unit tests.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use geoverlay_core::{OverlayError, Result};
use geoverlay_viewport::{MapState, WebMercatorViewport};
use glam::DVec2;

use crate::attribute::{AttributeBuffer, AttributeDescriptor, UpdateArgs};
use crate::layer::{Layer, LayerContext, LayerProps, LayerState, UpdateParams};
use crate::render::{DrawCall, RenderContext};

pub(crate) type Events = Rc<RefCell<Vec<String>>>;

pub(crate) fn events() -> Events {
    Rc::new(RefCell::new(Vec::new()))
}

pub(crate) fn map_viewport() -> WebMercatorViewport {
    WebMercatorViewport::new(&MapState {
        width: 800.0,
        height: 600.0,
        ..Default::default()
    })
    .unwrap()
}

/// Records its lifecycle calls and can be told to fail.
pub(crate) struct TestLayer {
    pub props: LayerProps,
    pub data: Option<Rc<Vec<f64>>>,
    pub events: Events,
    pub fail_init: bool,
    pub fail_update: bool,
    pub fail_finalize: bool,
    /// Records `transfer {id}` when taking over an old state.
    pub trace_transfer: bool,
    pub children: Vec<String>,
}

impl TestLayer {
    pub fn new(id: &str, events: &Events) -> Self {
        Self {
            props: LayerProps::new(id).num_instances(1),
            data: None,
            events: Rc::clone(events),
            fail_init: false,
            fail_update: false,
            fail_finalize: false,
            trace_transfer: false,
            children: Vec::new(),
        }
    }

    pub fn with_data(id: &str, events: &Events, data: Rc<Vec<f64>>) -> Self {
        let mut layer = Self::new(id, events);
        layer.props.num_instances = None;
        layer.data = Some(data);
        layer
    }

    pub fn boxed(id: &str, events: &Events) -> Box<dyn Layer> {
        Self::new(id, events).into_box()
    }

    pub fn into_box(self) -> Box<dyn Layer> {
        Box::new(self)
    }

    fn record(&self, event: &str) {
        self.events
            .borrow_mut()
            .push(format!("{event} {}", self.props.id));
    }
}

#[allow(clippy::cast_possible_truncation)]
fn compute_values(buffer: &mut AttributeBuffer, args: &UpdateArgs<'_, dyn Layer>) {
    let Some(layer) = args.layer::<TestLayer>() else {
        return;
    };
    layer.record("compute values");
    if let (Some(values), Some(data)) = (buffer.as_f32_mut(), &layer.data) {
        for (value, datum) in values.iter_mut().zip(data.iter()) {
            *value = *datum as f32;
        }
    }
}

impl Layer for TestLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        "TestLayer"
    }

    fn props(&self) -> &LayerProps {
        &self.props
    }

    fn data(&self) -> Option<&dyn Any> {
        self.data.as_deref().map(|d| d as &dyn Any)
    }

    fn data_len(&self) -> Option<usize> {
        self.data.as_ref().map(|d| d.len())
    }

    fn initialize_state(&mut self, state: &mut LayerState, _context: &LayerContext) -> Result<()> {
        self.record("init");
        if self.fail_init {
            return Err(OverlayError::layer(self.id(), "initialization failed"));
        }
        state
            .attribute_manager
            .add([("values", AttributeDescriptor::new(1).update(compute_values))])
    }

    fn transfer_state(&mut self, _old_layer: &dyn Layer, _state: &mut LayerState) {
        if self.trace_transfer {
            self.record("transfer");
        }
    }

    fn update_state(&mut self, state: &mut LayerState, params: &UpdateParams<'_>) -> Result<()> {
        self.record("update");
        if self.fail_update {
            return Err(OverlayError::layer(self.id(), "update failed"));
        }
        if params.change_flags.data_changed {
            state.attribute_manager.invalidate_all();
        }
        Ok(())
    }

    fn finalize_state(&mut self, _state: &mut LayerState) -> Result<()> {
        self.record("finalize");
        if self.fail_finalize {
            return Err(OverlayError::layer(self.id(), "finalization failed"));
        }
        Ok(())
    }

    fn render_layers(&self, _state: &LayerState) -> Option<Vec<Box<dyn Layer>>> {
        if self.children.is_empty() {
            return None;
        }
        Some(
            self.children
                .iter()
                .map(|id| TestLayer::boxed(id, &self.events))
                .collect(),
        )
    }
}

/// Renderer that records calls and answers picks from a color table.
#[derive(Default)]
pub(crate) struct MockRenderer {
    pub height: f64,
    /// `(layer id, layer index, opacity)` per draw.
    pub draws: Vec<(String, usize, f32)>,
    pub picks: Vec<(String, usize, DVec2)>,
    pub colors: HashMap<String, [u8; 4]>,
}

impl RenderContext for MockRenderer {
    fn canvas_height(&self) -> f64 {
        self.height
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        self.draws.push((
            call.layer_id.to_string(),
            call.uniforms.layer_index,
            call.uniforms.opacity,
        ));
        Ok(())
    }

    fn pick(&mut self, call: &DrawCall<'_>, device_pixel: DVec2) -> Result<[u8; 4]> {
        self.picks
            .push((call.layer_id.to_string(), call.uniforms.layer_index, device_pixel));
        Ok(self.colors.get(call.layer_id).copied().unwrap_or_default())
    }
}
