//! The seam between layer management and the GPU binding layer.

use geoverlay_core::Result;
use geoverlay_viewport::{ProjectionUniforms, ViewportUniforms};
use glam::DVec2;

use crate::layer::LayerState;

/// Gamma applied to layer opacity so blending looks perceptually linear.
pub const OPACITY_GAMMA: f64 = 2.2;

/// Uniforms for one layer draw.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerUniforms {
    pub viewport: ViewportUniforms,
    /// Position among visible layers in draw order.
    pub layer_index: usize,
    /// Gamma-corrected opacity.
    pub opacity: f32,
    pub selected_picking_color: Option<[u8; 3]>,
}

impl LayerUniforms {
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(viewport: ViewportUniforms, layer_index: usize, opacity: f64) -> Self {
        Self {
            viewport,
            layer_index,
            opacity: opacity.powf(1.0 / OPACITY_GAMMA) as f32,
            selected_picking_color: None,
        }
    }

    /// The projection block ready for upload.
    pub fn projection_block(&self) -> ProjectionUniforms {
        ProjectionUniforms::from(&self.viewport)
    }
}

/// Everything a renderer needs to draw one layer.
#[derive(Debug)]
pub struct DrawCall<'a> {
    pub layer_id: &'a str,
    pub type_name: &'static str,
    /// Attribute buffers live in `state.attribute_manager`.
    pub state: &'a LayerState,
    pub uniforms: &'a LayerUniforms,
}

/// Renderer implemented by the GPU binding layer.
pub trait RenderContext {
    /// Height of the drawing buffer in device pixels.
    fn canvas_height(&self) -> f64;

    /// Draws a layer into the color buffer.
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()>;

    /// Draws a layer into a cleared picking buffer and returns the RGBA
    /// value at `device_pixel` (bottom-left origin).
    fn pick(&mut self, call: &DrawCall<'_>, device_pixel: DVec2) -> Result<[u8; 4]>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opacity_is_gamma_corrected() {
        let viewport = ViewportUniforms {
            projection_mode: geoverlay_viewport::CoordinateSystem::LngLat,
            projection_center: glam::DVec4::ZERO,
            projection_matrix: [0.0; 16],
            projection_matrix_uncentered: [0.0; 16],
            projection_fp64: [0.0; 32],
            projection_pixels_per_unit: [0.0; 3],
            projection_scale: 1.0,
            projection_scale_fp64: [1.0, 0.0],
        };
        let uniforms = LayerUniforms::new(viewport.clone(), 0, 1.0);
        assert_eq!(uniforms.opacity, 1.0);
        let uniforms = LayerUniforms::new(viewport, 2, 0.5);
        assert!((f64::from(uniforms.opacity) - 0.5_f64.powf(1.0 / 2.2)).abs() < 1e-6);
        assert_eq!(uniforms.layer_index, 2);
    }
}
