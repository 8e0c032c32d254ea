//! Draw and pick passes over the reconciled layer list.

use geoverlay_core::{decode_picking_color, PickMode, Result};
use geoverlay_viewport::{get_uniforms_from_viewport, ProjectOptions, Viewport};
use glam::DVec2;

use crate::layer_manager::LayerSlot;
use crate::render::{LayerUniforms, RenderContext};

/// Result of picking one layer at a pointer position.
#[derive(Debug, Clone, PartialEq)]
pub struct PickInfo {
    pub layer_id: String,
    /// Instance under the pointer, `None` if nothing was hit.
    pub index: Option<usize>,
    pub picked: bool,
    /// Front-to-back rank among hits in this pass.
    pub z_order: Option<usize>,
    pub x: f64,
    pub y: f64,
    /// Pointer position, top-left origin, CSS pixels.
    pub pixel: DVec2,
    /// Pointer position, bottom-left origin, device pixels.
    pub device_pixel: DVec2,
    pub pixel_ratio: f64,
    /// World position under the pointer on the ground plane.
    pub lng_lat: DVec2,
    /// Raw color read from the picking buffer.
    pub color: [u8; 4],
}

/// Draws visible layers in order. Returns how many were drawn.
pub(crate) fn draw_layers(
    slots: &[LayerSlot],
    viewport: &Viewport,
    ctx: &mut dyn RenderContext,
) -> Result<usize> {
    let mut layer_index = 0;
    for slot in slots {
        let props = slot.layer.props();
        if !props.visible {
            continue;
        }
        let viewport_uniforms = get_uniforms_from_viewport(viewport, &props.uniform_options())?;
        let mut uniforms = LayerUniforms::new(viewport_uniforms, layer_index, props.opacity);
        uniforms.selected_picking_color = slot.state.selected_picking_color();
        slot.layer.draw(&slot.state, &uniforms, ctx)?;
        layer_index += 1;
    }
    Ok(layer_index)
}

/// Picks pickable layers back to front and dispatches the pick callbacks.
///
/// Returns the infos whose callback did not report the event as handled.
pub(crate) fn pick_layers(
    slots: &mut [LayerSlot],
    viewport: &Viewport,
    pixel: DVec2,
    mode: PickMode,
    pixel_ratio: f64,
    ctx: &mut dyn RenderContext,
) -> Result<Vec<PickInfo>> {
    // Canvas top-left CSS pixels to GL bottom-left device pixels
    let device_pixel = DVec2::new(
        pixel.x * pixel_ratio,
        ctx.canvas_height() - pixel.y * pixel_ratio,
    );
    let lng_lat = viewport.unproject(pixel, ProjectOptions::TOP_LEFT);

    let mut picked = Vec::new();
    let mut layer_index = 0;
    let mut z_order = 0;

    for (slot_index, slot) in slots.iter_mut().enumerate().rev() {
        let props = slot.layer.props();
        if props.visible {
            layer_index += 1;
        }
        if !(props.visible && props.pickable) {
            continue;
        }

        let viewport_uniforms = get_uniforms_from_viewport(viewport, &props.uniform_options())?;
        let uniforms = LayerUniforms::new(viewport_uniforms, layer_index, props.opacity);
        let color = slot.layer.pick(&slot.state, &uniforms, device_pixel, ctx)?;
        let rgb = [color[0], color[1], color[2]];
        let index = decode_picking_color(rgb);

        if mode == PickMode::Hover {
            slot.state.set_selected_picking_color(rgb);
        }

        let mut info = PickInfo {
            layer_id: props.id.clone(),
            index,
            picked: index.is_some(),
            z_order: None,
            x: pixel.x,
            y: pixel.y,
            pixel,
            device_pixel,
            pixel_ratio,
            lng_lat,
            color,
        };
        if info.picked {
            info.z_order = Some(z_order);
            z_order += 1;
        }
        picked.push((slot_index, info));
    }

    // Callbacks run once every layer has been sampled
    let mut unhandled = Vec::new();
    for (slot_index, info) in picked {
        let props = slots[slot_index].layer.props();
        let handler = match mode {
            PickMode::Click => props.on_click.as_ref(),
            PickMode::Hover => props.on_hover.as_ref(),
        };
        let handled = handler.is_some_and(|handler| handler(&info));
        if !handled {
            unhandled.push(info);
        }
    }
    Ok(unhandled)
}
