//! Shader uniforms derived from a viewport.
//!
//! Matrices are composed in f64 on the CPU, then narrowed to f32 for the
//! GPU. The model-view-projection matrix is also sent as hi/lo float pairs
//! for shaders that emulate double precision.

use std::fmt;
use std::str::FromStr;

use geoverlay_core::{fp64ify, fp64ify_matrix4, OverlayError, Result};
use glam::{DMat4, DVec2, DVec4};
use serde::{Deserialize, Serialize};

use crate::viewport::Viewport;

/// Zeroes the w column so a matrix ignores the translation of its input.
const VECTOR_TO_POINT_MATRIX: DMat4 = DMat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 0.0,
]);

/// How a layer's positions are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystem {
    /// Positions are `[lng, lat, z]` and projected on the GPU.
    #[default]
    #[serde(rename = "lnglat")]
    LngLat,
    /// Positions are meter offsets from a `position_origin`.
    MeterOffsets,
}

impl CoordinateSystem {
    /// The numeric mode passed to shaders.
    pub fn code(self) -> u32 {
        match self {
            CoordinateSystem::LngLat => 1,
            CoordinateSystem::MeterOffsets => 2,
        }
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateSystem::LngLat => write!(f, "lnglat"),
            CoordinateSystem::MeterOffsets => write!(f, "meter_offsets"),
        }
    }
}

impl FromStr for CoordinateSystem {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lnglat" => Ok(CoordinateSystem::LngLat),
            "meter_offsets" => Ok(CoordinateSystem::MeterOffsets),
            other => Err(OverlayError::UnknownCoordinateSystem(other.to_string())),
        }
    }
}

impl TryFrom<u32> for CoordinateSystem {
    type Error = OverlayError;

    fn try_from(code: u32) -> Result<Self> {
        match code {
            1 => Ok(CoordinateSystem::LngLat),
            2 => Ok(CoordinateSystem::MeterOffsets),
            other => Err(OverlayError::UnknownCoordinateSystem(other.to_string())),
        }
    }
}

/// Per-layer inputs to [`get_uniforms_from_viewport`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UniformOptions {
    pub coordinate_system: CoordinateSystem,
    /// `[lng, lat]` origin for meter offsets.
    pub position_origin: DVec2,
    pub model_matrix: Option<DMat4>,
}

/// Projection uniforms for one layer draw.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportUniforms {
    pub projection_mode: CoordinateSystem,
    /// Clip-space position of the origin, computed in f64.
    pub projection_center: DVec4,
    /// Model-view-projection matrix, column major.
    pub projection_matrix: [f32; 16],
    /// Same matrix as `projection_matrix`; kept for shaders that bind it by
    /// this name.
    pub projection_matrix_uncentered: [f32; 16],
    /// Model-view-projection as hi/lo pairs at `(row * 4 + col) * 2`.
    pub projection_fp64: [f32; 32],
    pub projection_pixels_per_unit: [f32; 3],
    pub projection_scale: f32,
    pub projection_scale_fp64: [f32; 2],
}

/// Builds the projection uniforms for a viewport and coordinate system.
///
/// Fails if the viewport has no scale or no distance scales (only
/// geographic viewports have pixels-per-unit).
#[allow(clippy::cast_possible_truncation)]
pub fn get_uniforms_from_viewport(
    viewport: &Viewport,
    options: &UniformOptions,
) -> Result<ViewportUniforms> {
    let scale = viewport.scale();
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(OverlayError::MissingScale);
    }
    let pixels_per_unit = viewport
        .distance_scales()
        .ok_or(OverlayError::MissingPixelsPerUnit)?
        .pixels_per_meter;

    let view_projection = viewport.projection_matrix() * viewport.view_matrix();
    let model = options.model_matrix.unwrap_or(DMat4::IDENTITY);

    let (projection_center, model_view_projection) = match options.coordinate_system {
        CoordinateSystem::LngLat => (DVec4::ZERO, view_projection * model),
        CoordinateSystem::MeterOffsets => {
            let origin = viewport.project_flat(options.position_origin);
            let center = view_projection * DVec4::new(origin.x, origin.y, 0.0, 1.0);
            // Offsets are rotated and scaled but not translated; the
            // translation lives in projection_center
            let matrix = viewport.projection_matrix()
                * viewport.view_matrix_uncentered()
                * VECTOR_TO_POINT_MATRIX
                * model;
            (center, matrix)
        }
    };

    let projection_matrix = model_view_projection.to_cols_array().map(|v| v as f32);

    Ok(ViewportUniforms {
        projection_mode: options.coordinate_system,
        projection_center,
        projection_matrix,
        projection_matrix_uncentered: projection_matrix,
        projection_fp64: fp64ify_matrix4(&model_view_projection.to_cols_array()),
        projection_pixels_per_unit: pixels_per_unit.to_array().map(|v| v as f32),
        projection_scale: scale as f32,
        projection_scale_fp64: fp64ify(scale),
    })
}

/// std140-compatible uniform block for upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProjectionUniforms {
    pub projection_matrix: [[f32; 4]; 4],
    pub projection_fp64: [[f32; 4]; 8],
    pub projection_center: [f32; 4],
    pub projection_pixels_per_unit: [f32; 4],
    pub projection_scale: f32,
    pub projection_mode: u32,
    pub projection_scale_fp64: [f32; 2],
}

impl Default for ProjectionUniforms {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl From<&ViewportUniforms> for ProjectionUniforms {
    #[allow(clippy::cast_possible_truncation)]
    fn from(uniforms: &ViewportUniforms) -> Self {
        let ppu = uniforms.projection_pixels_per_unit;
        Self {
            projection_matrix: bytemuck::cast(uniforms.projection_matrix),
            projection_fp64: bytemuck::cast(uniforms.projection_fp64),
            projection_center: uniforms.projection_center.to_array().map(|v| v as f32),
            projection_pixels_per_unit: [ppu[0], ppu[1], ppu[2], 0.0],
            projection_scale: uniforms.projection_scale,
            projection_mode: uniforms.projection_mode.code(),
            projection_scale_fp64: uniforms.projection_scale_fp64,
        }
    }
}

impl ProjectionUniforms {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_state::MapState;
    use crate::perspective::{PerspectiveParams, PerspectiveViewport};
    use crate::web_mercator::WebMercatorViewport;
    use glam::DVec3;

    fn map_viewport() -> Viewport {
        WebMercatorViewport::new(&MapState {
            width: 800.0,
            height: 600.0,
            latitude: 37.75,
            longitude: -122.43,
            zoom: 12.0,
            pitch: 30.0,
            bearing: 20.0,
            ..Default::default()
        })
        .unwrap()
        .into_viewport()
    }

    #[test]
    fn test_lnglat_mode() {
        let viewport = map_viewport();
        let uniforms = get_uniforms_from_viewport(&viewport, &UniformOptions::default()).unwrap();
        assert_eq!(uniforms.projection_mode, CoordinateSystem::LngLat);
        assert_eq!(uniforms.projection_center, DVec4::ZERO);
        let expected = viewport.view_projection_matrix().to_cols_array();
        for (actual, expected) in uniforms.projection_matrix.iter().zip(expected.iter()) {
            assert_eq!(*actual, *expected as f32);
        }
        assert_eq!(uniforms.projection_scale, 4096.0);
        assert_eq!(uniforms.projection_scale_fp64, [4096.0, 0.0]);
    }

    #[test]
    fn test_uncentered_matrix_mirrors_projection_matrix() {
        let viewport = map_viewport();
        for coordinate_system in [CoordinateSystem::LngLat, CoordinateSystem::MeterOffsets] {
            let options = UniformOptions {
                coordinate_system,
                position_origin: DVec2::new(-122.42, 37.76),
                model_matrix: None,
            };
            let uniforms = get_uniforms_from_viewport(&viewport, &options).unwrap();
            assert_eq!(uniforms.projection_matrix_uncentered, uniforms.projection_matrix);
        }
    }

    #[test]
    fn test_fp64_layout_is_row_major_pairs() {
        let viewport = map_viewport();
        let uniforms = get_uniforms_from_viewport(&viewport, &UniformOptions::default()).unwrap();
        let mvp = viewport.view_projection_matrix();
        for row in 0..4 {
            for col in 0..4 {
                let value = mvp.col(col)[row];
                assert_eq!(uniforms.projection_fp64[(row * 4 + col) * 2], value as f32);
            }
        }
    }

    #[test]
    fn test_meter_offsets_match_absolute_projection() {
        let viewport = map_viewport();
        let origin = DVec2::new(-122.42, 37.76);
        let uniforms = get_uniforms_from_viewport(
            &viewport,
            &UniformOptions {
                coordinate_system: CoordinateSystem::MeterOffsets,
                position_origin: origin,
                model_matrix: None,
            },
        )
        .unwrap();

        let flat_origin = viewport.project_flat(origin);
        let expected_center =
            viewport.view_projection_matrix() * DVec4::new(flat_origin.x, flat_origin.y, 0.0, 1.0);
        assert!((uniforms.projection_center - expected_center).abs().max_element() < 1e-9);

        // A world-pixel offset through the offset matrix plus the center
        // lands where the absolute position would
        let offset = DVec3::new(12.5, -7.25, 0.0);
        let m = DMat4::from_cols_array(&uniforms.projection_matrix.map(f64::from));
        let relative = m * offset.extend(1.0) + uniforms.projection_center;
        let absolute = viewport.view_projection_matrix()
            * DVec4::new(flat_origin.x + offset.x, flat_origin.y + offset.y, 0.0, 1.0);
        assert!(
            (relative - absolute).abs().max_element() < 1e-4 * absolute.abs().max_element(),
            "{relative:?} vs {absolute:?}"
        );
    }

    #[test]
    fn test_model_matrix_is_applied() {
        let viewport = map_viewport();
        let model = DMat4::from_scale(DVec3::splat(2.0));
        let uniforms = get_uniforms_from_viewport(
            &viewport,
            &UniformOptions {
                model_matrix: Some(model),
                ..Default::default()
            },
        )
        .unwrap();
        let expected = (viewport.view_projection_matrix() * model).to_cols_array();
        assert_eq!(uniforms.projection_matrix[0], expected[0] as f32);
    }

    #[test]
    fn test_non_geographic_viewport_has_no_pixels_per_unit() {
        let viewport = PerspectiveViewport::new(PerspectiveParams::default()).unwrap();
        assert!(matches!(
            get_uniforms_from_viewport(viewport.viewport(), &UniformOptions::default()),
            Err(OverlayError::MissingPixelsPerUnit)
        ));
    }

    #[test]
    fn test_zero_scale_is_rejected() {
        let mut viewport = map_viewport();
        viewport.set_scale(0.0);
        assert!(matches!(
            get_uniforms_from_viewport(&viewport, &UniformOptions::default()),
            Err(OverlayError::MissingScale)
        ));
    }

    #[test]
    fn test_coordinate_system_parsing() {
        assert_eq!("lnglat".parse::<CoordinateSystem>().unwrap(), CoordinateSystem::LngLat);
        assert_eq!(
            CoordinateSystem::try_from(2).unwrap(),
            CoordinateSystem::MeterOffsets
        );
        assert!(matches!(
            CoordinateSystem::try_from(7),
            Err(OverlayError::UnknownCoordinateSystem(_))
        ));
        assert!("utm".parse::<CoordinateSystem>().is_err());
        let json = serde_json::to_string(&CoordinateSystem::MeterOffsets).unwrap();
        assert_eq!(json, "\"meter_offsets\"");
        assert_eq!(serde_json::to_string(&CoordinateSystem::LngLat).unwrap(), "\"lnglat\"");
    }

    #[test]
    fn test_gpu_block_layout() {
        let viewport = map_viewport();
        let uniforms = get_uniforms_from_viewport(&viewport, &UniformOptions::default()).unwrap();
        let block = ProjectionUniforms::from(&uniforms);
        assert_eq!(block.as_bytes().len(), 240);
        assert_eq!(block.projection_mode, 1);
        assert_eq!(block.projection_matrix[1][2], uniforms.projection_matrix[6]);
    }
}
