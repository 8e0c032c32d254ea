//! Per-frame driver tying the viewport to the layer manager.

use geoverlay_core::{Options, PickMode, Result};
use geoverlay_layers::{Layer, LayerManager, PickInfo, RenderContext};
use geoverlay_viewport::{MapState, WebMercatorViewport};

/// A map overlay: one layer manager driven by map camera states.
#[derive(Debug, Default)]
pub struct Overlay {
    manager: LayerManager,
}

impl Overlay {
    pub fn new(options: Options) -> Self {
        Self {
            manager: LayerManager::new(options),
        }
    }

    /// Creates an overlay from JSON options.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(Options::from_json(json)?))
    }

    pub fn manager(&self) -> &LayerManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut LayerManager {
        &mut self.manager
    }

    /// Points the overlay camera at a map state.
    pub fn set_map_state(&mut self, map_state: &MapState) -> Result<()> {
        let viewport = WebMercatorViewport::new(map_state)?;
        self.manager.set_viewport(viewport);
        Ok(())
    }

    /// Runs one frame: viewport, reconciliation, redraw check, draw.
    ///
    /// Returns whether anything was drawn. A layer lifecycle error aborts the
    /// frame before drawing; the layer list is still replaced, so the next
    /// frame draws it.
    pub fn frame<I, L>(
        &mut self,
        map_state: &MapState,
        layers: I,
        ctx: &mut dyn RenderContext,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = L>,
        L: Into<Option<Box<dyn Layer>>>,
    {
        self.set_map_state(map_state)?;
        self.manager.update_layers(layers)?;
        if !self.manager.needs_redraw(true) {
            return Ok(false);
        }
        log::trace!("drawing {} layers", self.manager.len());
        self.manager.draw_layers(ctx)?;
        Ok(true)
    }

    /// Picks at a canvas position; see [`LayerManager::pick_layer`].
    pub fn pick(
        &mut self,
        x: f64,
        y: f64,
        mode: PickMode,
        ctx: &mut dyn RenderContext,
    ) -> Result<Vec<PickInfo>> {
        self.manager.pick_layer(x, y, mode, ctx)
    }
}
