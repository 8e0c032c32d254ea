//! Layer reconciliation.
//!
//! The application hands the manager a fresh list of layers every frame.
//! Layers are matched by id against the previous frame: a matched layer
//! takes over the old layer's [`LayerState`], an unmatched new layer is
//! initialized, and an unmatched old layer is finalized.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use geoverlay_core::{Logger, Options, OverlayError, PickMode, Result};
use geoverlay_viewport::Viewport;
use glam::DVec2;

use crate::draw_and_pick::{self, PickInfo};
use crate::layer::{
    diff_update_triggers, update_attributes, ChangeFlags, Layer, LayerContext, LayerState,
    UpdateParams,
};
use crate::render::RenderContext;

/// A layer value and the state it currently owns.
pub(crate) struct LayerSlot {
    pub(crate) layer: Box<dyn Layer>,
    pub(crate) state: LayerState,
}

/// A new layer after state transfer, before its lifecycle runs.
enum Pending {
    Matched {
        layer: Box<dyn Layer>,
        old_layer: Box<dyn Layer>,
        state: LayerState,
    },
    New {
        layer: Box<dyn Layer>,
    },
}

/// Previous frame's slots, looked up by id.
struct OldLayerPool {
    slots: Vec<Option<LayerSlot>>,
    index: HashMap<String, usize>,
}

impl OldLayerPool {
    fn new(slots: Vec<LayerSlot>, logger: &Logger) -> Self {
        let mut index = HashMap::with_capacity(slots.len());
        for (i, slot) in slots.iter().enumerate() {
            if index.insert(slot.layer.id().to_string(), i).is_some() {
                logger.once(0, &format!("multiple old layers with same id {}", slot.layer));
            }
        }
        Self {
            slots: slots.into_iter().map(Some).collect(),
            index,
        }
    }

    fn take(&mut self, id: &str) -> Option<LayerSlot> {
        let i = self.index.remove(id)?;
        self.slots[i].take()
    }

    fn into_unmatched(self) -> impl Iterator<Item = LayerSlot> {
        self.slots.into_iter().flatten()
    }
}

/// Matches layer lists across frames and drives their lifecycle.
pub struct LayerManager {
    layers: Vec<LayerSlot>,
    context: LayerContext,
    options: Options,
    logger: Rc<Logger>,
    next_serial: u64,
    redraw_needed: bool,
    drew_layers: bool,
}

impl LayerManager {
    pub fn new(options: Options) -> Self {
        let logger = Rc::new(Logger::new(options.log_priority));
        Self::with_logger(options, logger)
    }

    /// Creates a manager that reports through an existing logger.
    pub fn with_logger(options: Options, logger: Rc<Logger>) -> Self {
        Self {
            layers: Vec::new(),
            context: LayerContext::default(),
            options,
            logger,
            next_serial: 0,
            redraw_needed: true,
            drew_layers: false,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn logger(&self) -> &Rc<Logger> {
        &self.logger
    }

    pub fn context(&self) -> &LayerContext {
        &self.context
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.context.viewport.as_ref()
    }

    /// Sets the camera for subsequent passes.
    ///
    /// Counts as a viewport change unless `detect_viewport_changes` is on
    /// and the new viewport equals the current one.
    pub fn set_viewport(&mut self, viewport: impl Into<Viewport>) -> &mut Self {
        let viewport = viewport.into();
        let changed = !self.options.detect_viewport_changes
            || self
                .context
                .viewport
                .as_ref()
                .map_or(true, |old| !old.equals(&viewport));
        if changed {
            log::trace!("viewport set: {viewport:?}");
            self.context.old_viewport = self.context.viewport.replace(viewport);
            self.context.viewport_changed = true;
            self.redraw_needed = true;
        }
        self
    }

    /// Reconciles a new layer list against the current one.
    ///
    /// `None` entries are skipped. A failure in one layer's lifecycle does
    /// not stop the others; the first such error is returned after the
    /// whole pass, with the new layer list already in place.
    pub fn update_layers<I, L>(&mut self, new_layers: I) -> Result<()>
    where
        I: IntoIterator<Item = L>,
        L: Into<Option<Box<dyn Layer>>>,
    {
        if self.context.viewport.is_none() {
            return Err(OverlayError::ViewportNotSet("LayerManager::update_layers"));
        }

        let new_layers: Vec<Box<dyn Layer>> =
            new_layers.into_iter().filter_map(Into::into).collect();
        let old_layers = std::mem::take(&mut self.layers);
        let mut pool = OldLayerPool::new(old_layers, &self.logger);

        let mut pass = Pass {
            generated: Vec::with_capacity(new_layers.len()),
            seen: HashSet::new(),
            first_error: None,
        };
        self.match_sublayers(new_layers, &mut pool, &mut pass);

        for slot in pool.into_unmatched() {
            self.finalize_layer(slot, &mut pass.first_error);
        }

        self.layers = pass.generated;
        self.context.viewport_changed = false;

        match pass.first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Draws visible layers through the render context.
    pub fn draw_layers(&mut self, ctx: &mut dyn RenderContext) -> Result<()> {
        let viewport = self
            .context
            .viewport
            .as_ref()
            .ok_or(OverlayError::ViewportNotSet("LayerManager::draw_layers"))?;
        let drawn = draw_and_pick::draw_layers(&self.layers, viewport, ctx)?;
        if drawn > 0 {
            self.drew_layers = true;
        }
        Ok(())
    }

    /// Picks at a canvas position (top-left origin, CSS pixels).
    ///
    /// Returns the pick infos not handled by an `on_click`/`on_hover` callback.
    pub fn pick_layer(
        &mut self,
        x: f64,
        y: f64,
        mode: PickMode,
        ctx: &mut dyn RenderContext,
    ) -> Result<Vec<PickInfo>> {
        let viewport = self
            .context
            .viewport
            .as_ref()
            .ok_or(OverlayError::ViewportNotSet("LayerManager::pick_layer"))?;
        draw_and_pick::pick_layers(
            &mut self.layers,
            viewport,
            DVec2::new(x, y),
            mode,
            self.options.pixel_ratio,
            ctx,
        )
    }

    /// Whether anything needs to be drawn, optionally clearing the flags.
    ///
    /// An emptied layer list reports true once so the canvas gets cleared.
    pub fn needs_redraw(&mut self, clear_redraw_flags: bool) -> bool {
        if self.context.viewport.is_none() {
            return false;
        }

        let mut redraw = false;
        if self.layers.is_empty() && self.drew_layers {
            redraw = true;
            if clear_redraw_flags {
                self.drew_layers = false;
            }
        }
        if self.redraw_needed {
            redraw = true;
            if clear_redraw_flags {
                self.redraw_needed = false;
            }
        }
        // Every layer is visited so that all flags get cleared
        for slot in &mut self.layers {
            redraw |= slot.state.get_needs_redraw(clear_redraw_flags);
        }
        if !self.layers.is_empty() {
            self.drew_layers = true;
        }
        redraw
    }

    pub fn set_needs_redraw(&mut self) {
        self.redraw_needed = true;
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Current layers in draw order, sublayers after their parent.
    pub fn layers(&self) -> impl Iterator<Item = &dyn Layer> {
        self.layers.iter().map(|slot| slot.layer.as_ref())
    }

    pub fn layer(&self, id: &str) -> Option<&dyn Layer> {
        self.slot(id).map(|slot| slot.layer.as_ref())
    }

    pub fn layer_state(&self, id: &str) -> Option<&LayerState> {
        self.slot(id).map(|slot| &slot.state)
    }

    pub fn layer_state_mut(&mut self, id: &str) -> Option<&mut LayerState> {
        self.layers
            .iter_mut()
            .find(|slot| slot.layer.id() == id)
            .map(|slot| &mut slot.state)
    }

    fn slot(&self, id: &str) -> Option<&LayerSlot> {
        self.layers.iter().find(|slot| slot.layer.id() == id)
    }

    fn match_sublayers(
        &mut self,
        new_layers: Vec<Box<dyn Layer>>,
        pool: &mut OldLayerPool,
        pass: &mut Pass,
    ) {
        // Move every matched state before any lifecycle method runs
        let mut pending = Vec::with_capacity(new_layers.len());
        for mut layer in new_layers {
            let id = layer.id().to_string();
            if !pass.seen.insert(id.clone()) {
                self.logger
                    .once(0, &format!("multiple new layers with same id {layer}"));
            }
            match pool.take(&id) {
                Some(LayerSlot {
                    layer: old_layer,
                    mut state,
                }) => {
                    self.logger.log(3, &format!("matched {layer}"));
                    layer.transfer_state(old_layer.as_ref(), &mut state);
                    pending.push(Pending::Matched {
                        layer,
                        old_layer,
                        state,
                    });
                }
                None => pending.push(Pending::New { layer }),
            }
        }

        for entry in pending {
            let slot = match entry {
                Pending::Matched {
                    mut layer,
                    old_layer,
                    mut state,
                } => {
                    let updated = self.update_layer(layer.as_mut(), old_layer.as_ref(), &mut state);
                    if let Err(err) = updated {
                        self.record_error(&*layer, "update", err, &mut pass.first_error);
                    }
                    LayerSlot { layer, state }
                }
                Pending::New { mut layer } => {
                    let serial = self.next_serial;
                    self.next_serial += 1;
                    let created = LayerState::new(serial, layer.id(), Rc::clone(&self.logger));
                    let mut state = match created {
                        Ok(state) => state,
                        Err(err) => {
                            let first_error = &mut pass.first_error;
                            self.record_error(&*layer, "initialization", err, first_error);
                            continue;
                        }
                    };
                    if let Err(err) = self.initialize_layer(layer.as_mut(), &mut state) {
                        self.record_error(&*layer, "initialization", err, &mut pass.first_error);
                    }
                    LayerSlot { layer, state }
                }
            };

            let sublayers = slot.layer.render_layers(&slot.state);
            pass.generated.push(slot);
            if let Some(sublayers) = sublayers {
                self.match_sublayers(sublayers, pool, pass);
            }
        }
    }

    fn initialize_layer(
        &self,
        layer: &mut (dyn Layer + 'static),
        state: &mut LayerState,
    ) -> Result<()> {
        self.logger.log(1, &format!("initializing {layer}"));
        let change_flags = ChangeFlags::initial(self.context.viewport_changed);
        layer.initialize_state(state, &self.context)?;
        let params = UpdateParams {
            old_layer: None,
            context: &self.context,
            change_flags: &change_flags,
        };
        layer.update_state(state, &params)?;
        update_attributes(layer, state)
    }

    fn update_layer(
        &self,
        layer: &mut (dyn Layer + 'static),
        old_layer: &(dyn Layer + 'static),
        state: &mut LayerState,
    ) -> Result<()> {
        let mut change_flags = ChangeFlags::diff(old_layer, layer, &self.context);
        if change_flags.data_changed {
            self.logger.log(
                1,
                &format!(
                    "data changed for {layer}: {}",
                    change_flags.reason.as_deref().unwrap_or_default()
                ),
            );
        } else if diff_update_triggers(
            old_layer.props(),
            layer.props(),
            &mut state.attribute_manager,
            &self.logger,
        )? {
            change_flags.props_changed = true;
            change_flags.something_changed = true;
            change_flags
                .reason
                .get_or_insert_with(|| "update triggers changed".to_string());
        }

        let params = UpdateParams {
            old_layer: Some(old_layer),
            context: &self.context,
            change_flags: &change_flags,
        };
        if layer.should_update_state(&params) {
            self.logger.log(2, &format!("updating {layer}"));
            layer.update_state(state, &params)?;
            update_attributes(layer, state)?;
        }
        Ok(())
    }

    fn finalize_layer(&self, mut slot: LayerSlot, first_error: &mut Option<OverlayError>) {
        if let Err(err) = slot.layer.finalize_state(&mut slot.state) {
            self.record_error(slot.layer.as_ref(), "finalization", err, first_error);
        }
        self.logger.log(1, &format!("finalizing {}", slot.layer));
    }

    fn record_error(
        &self,
        layer: &(dyn Layer + 'static),
        phase: &str,
        err: OverlayError,
        first_error: &mut Option<OverlayError>,
    ) {
        self.logger
            .once(0, &format!("error during {phase} of {layer}: {err}"));
        first_error.get_or_insert(err);
    }
}

impl Default for LayerManager {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl std::fmt::Debug for LayerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerManager")
            .field("layers", &self.layers.iter().map(|s| s.layer.id()).collect::<Vec<_>>())
            .field("context", &self.context)
            .field("options", &self.options)
            .field("redraw_needed", &self.redraw_needed)
            .finish_non_exhaustive()
    }
}

/// Accumulators for one reconciliation pass.
struct Pass {
    generated: Vec<LayerSlot>,
    seen: HashSet<String>,
    first_error: Option<OverlayError>,
}
