//! Base camera: view/projection composition and pixel projection.

use std::fmt;
use std::sync::Arc;

use geoverlay_core::{OverlayError, Result};
use glam::{DMat4, DVec2, DVec3, DVec4};

use crate::web_mercator::DistanceScales;

/// Relative tolerance used when comparing viewport matrices.
pub const MATRIX_EPSILON: f64 = 1e-6;

/// The nonlinear step applied before the 4x4 matrices.
///
/// Implemented by each camera kind; flat (Euclidean) cameras use
/// [`LinearProjection`].
pub trait FlatProjection: fmt::Debug + Send + Sync {
    /// Maps a world coordinate (e.g. `[lng, lat]`) onto the flat plane.
    fn project_flat(&self, xy: DVec2, scale: f64) -> DVec2;

    /// Inverse of [`FlatProjection::project_flat`].
    fn unproject_flat(&self, xy: DVec2, scale: f64) -> DVec2;
}

/// Identity flat projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinearProjection;

impl FlatProjection for LinearProjection {
    fn project_flat(&self, xy: DVec2, _scale: f64) -> DVec2 {
        xy
    }

    fn unproject_flat(&self, xy: DVec2, _scale: f64) -> DVec2 {
        xy
    }
}

/// A 2- or 3-component point accepted by the projection functions.
///
/// Projection output has the same arity as its input.
pub trait ViewPoint: Copy {
    /// Widens to three components (z = 0 for 2D points).
    fn to_xyz(self) -> DVec3;

    /// Narrows back to this point's arity.
    fn from_xyz(xyz: DVec3) -> Self;
}

impl ViewPoint for DVec2 {
    fn to_xyz(self) -> DVec3 {
        self.extend(0.0)
    }

    fn from_xyz(xyz: DVec3) -> Self {
        xyz.truncate()
    }
}

impl ViewPoint for DVec3 {
    fn to_xyz(self) -> DVec3 {
        self
    }

    fn from_xyz(xyz: DVec3) -> Self {
        xyz
    }
}

/// Options for [`Viewport::project`] and [`Viewport::unproject`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectOptions {
    /// Use top-left pixel coordinates (canvas/SVG) instead of bottom-left (GL).
    pub top_left: bool,
}

impl ProjectOptions {
    /// Top-left pixel coordinates.
    pub const TOP_LEFT: Self = Self { top_left: true };
    /// Bottom-left pixel coordinates.
    pub const BOTTOM_LEFT: Self = Self { top_left: false };
}

/// Construction parameters for a [`Viewport`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportDescriptor {
    /// Width in pixels. Zero is coerced to 1.
    pub width: f64,
    /// Height in pixels. Zero is coerced to 1.
    pub height: f64,
    pub view_matrix: DMat4,
    pub projection_matrix: DMat4,
}

impl Default for ViewportDescriptor {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            view_matrix: DMat4::IDENTITY,
            projection_matrix: DMat4::IDENTITY,
        }
    }
}

/// Matrices derived from a viewport, optionally with a model matrix applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMatrices {
    pub model_view_projection: DMat4,
    pub view_projection: DMat4,
    pub view: DMat4,
    pub projection: DMat4,
    pub pixel_projection: DMat4,
    pub pixel_unprojection: DMat4,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

/// A camera with view and projection matrices and a pixel window.
///
/// Immutable once constructed; a parameter change means building a new
/// viewport. Construction fails if the pixel projection matrix is singular.
#[derive(Clone)]
pub struct Viewport {
    width: f64,
    height: f64,
    scale: f64,
    view_matrix: DMat4,
    view_matrix_uncentered: DMat4,
    projection_matrix: DMat4,
    view_projection_matrix: DMat4,
    pixel_projection_matrix: DMat4,
    pixel_unprojection_matrix: DMat4,
    distance_scales: Option<DistanceScales>,
    projection: Arc<dyn FlatProjection>,
}

impl Viewport {
    /// Creates a viewport with the identity flat projection.
    pub fn new(descriptor: ViewportDescriptor) -> Result<Self> {
        Self::with_projection(descriptor, Arc::new(LinearProjection))
    }

    /// Creates a viewport with a custom flat projection.
    pub fn with_projection(
        descriptor: ViewportDescriptor,
        projection: Arc<dyn FlatProjection>,
    ) -> Result<Self> {
        let width = coerce_dimension(descriptor.width);
        let height = coerce_dimension(descriptor.height);

        // Matrices apply right to left: view first, then projection
        let view_projection_matrix = descriptor.projection_matrix * descriptor.view_matrix;

        // Clip space (-1, 1) -> (0, 1) -> bottom-left pixel window
        let pixel_projection_matrix = DMat4::from_scale(DVec3::new(width, height, 1.0))
            * DMat4::from_translation(DVec3::new(0.5, 0.5, 0.0))
            * DMat4::from_scale(DVec3::new(0.5, 0.5, 1.0))
            * view_projection_matrix;

        let pixel_unprojection_matrix = invert(&pixel_projection_matrix)?;

        Ok(Self {
            width,
            height,
            scale: 1.0,
            view_matrix: descriptor.view_matrix,
            view_matrix_uncentered: descriptor.view_matrix,
            projection_matrix: descriptor.projection_matrix,
            view_projection_matrix,
            pixel_projection_matrix,
            pixel_unprojection_matrix,
            distance_scales: None,
            projection,
        })
    }

    pub(crate) fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub(crate) fn set_view_matrix_uncentered(&mut self, matrix: DMat4) {
        self.view_matrix_uncentered = matrix;
    }

    pub(crate) fn set_distance_scales(&mut self, scales: DistanceScales) {
        self.distance_scales = Some(scales);
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// World units per unit of zoom (`2^zoom` for mercator viewports).
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn view_matrix(&self) -> DMat4 {
        self.view_matrix
    }

    /// The view matrix without the final translation to the camera center.
    ///
    /// Equal to [`Viewport::view_matrix`] for cameras that have no center.
    pub fn view_matrix_uncentered(&self) -> DMat4 {
        self.view_matrix_uncentered
    }

    pub fn projection_matrix(&self) -> DMat4 {
        self.projection_matrix
    }

    pub fn view_projection_matrix(&self) -> DMat4 {
        self.view_projection_matrix
    }

    pub fn pixel_projection_matrix(&self) -> DMat4 {
        self.pixel_projection_matrix
    }

    pub fn pixel_unprojection_matrix(&self) -> DMat4 {
        self.pixel_unprojection_matrix
    }

    /// Meter/degree/pixel conversion factors, if this camera is geographic.
    pub fn distance_scales(&self) -> Option<&DistanceScales> {
        self.distance_scales.as_ref()
    }

    /// Applies the nonlinear projection hook at the viewport's scale.
    pub fn project_flat(&self, xy: DVec2) -> DVec2 {
        self.projection.project_flat(xy, self.scale)
    }

    /// Applies the nonlinear projection hook at an explicit scale.
    pub fn project_flat_scaled(&self, xy: DVec2, scale: f64) -> DVec2 {
        self.projection.project_flat(xy, scale)
    }

    /// Inverse of [`Viewport::project_flat`].
    pub fn unproject_flat(&self, xy: DVec2) -> DVec2 {
        self.projection.unproject_flat(xy, self.scale)
    }

    /// Inverse of [`Viewport::project_flat_scaled`].
    pub fn unproject_flat_scaled(&self, xy: DVec2, scale: f64) -> DVec2 {
        self.projection.unproject_flat(xy, scale)
    }

    /// Projects a world point to pixel coordinates.
    ///
    /// Bottom-left coordinates unless `options.top_left` is set.
    pub fn project<P: ViewPoint>(&self, point: P, options: ProjectOptions) -> P {
        let xyz = point.to_xyz();
        let flat = self.project_flat(DVec2::new(xyz.x, xyz.y));
        let v = self.pixel_projection_matrix * DVec4::new(flat.x, flat.y, xyz.z, 1.0);
        let v = v / v.w;
        let y = if options.top_left {
            self.height - v.y
        } else {
            v.y
        };
        P::from_xyz(DVec3::new(v.x, y, v.z))
    }

    /// Unprojects pixel coordinates back to a world point.
    pub fn unproject<P: ViewPoint>(&self, pixel: P, options: ProjectOptions) -> P {
        let xyz = pixel.to_xyz();
        let y = if options.top_left {
            self.height - xyz.y
        } else {
            xyz.y
        };
        let v = self.pixel_unprojection_matrix * DVec4::new(xyz.x, y, xyz.z, 1.0);
        let v = v / v.w;
        let flat = self.unproject_flat(DVec2::new(v.x, v.y));
        P::from_xyz(DVec3::new(flat.x, flat.y, v.z))
    }

    /// Returns the derived matrices, with an optional model matrix applied.
    pub fn matrices(&self, model_matrix: Option<DMat4>) -> Result<ViewportMatrices> {
        let (model_view_projection, pixel_projection, pixel_unprojection) = match model_matrix {
            Some(model) => {
                let pixel_projection = self.pixel_projection_matrix * model;
                (
                    self.view_projection_matrix * model,
                    pixel_projection,
                    invert(&pixel_projection)?,
                )
            }
            None => (
                self.view_projection_matrix,
                self.pixel_projection_matrix,
                self.pixel_unprojection_matrix,
            ),
        };

        Ok(ViewportMatrices {
            model_view_projection,
            view_projection: self.view_projection_matrix,
            view: self.view_matrix,
            projection: self.projection_matrix,
            pixel_projection,
            pixel_unprojection,
            width: self.width,
            height: self.height,
            scale: self.scale,
        })
    }

    /// Two viewports are equal if their sizes are identical and their view
    /// and projection matrices are approximately equal.
    #[allow(clippy::float_cmp)]
    pub fn equals(&self, other: &Viewport) -> bool {
        self.width == other.width
            && self.height == other.height
            && matrices_approx_equal(&self.projection_matrix, &other.projection_matrix)
            && matrices_approx_equal(&self.view_matrix, &other.view_matrix)
    }
}

impl PartialEq for Viewport {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Debug for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Viewport")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("scale", &self.scale)
            .field("projection", &self.projection)
            .finish_non_exhaustive()
    }
}

impl Default for Viewport {
    /// A 1x1 window with identity view and projection.
    fn default() -> Self {
        // Clip space (-1, 1) -> (0, 1) and back
        let pixel_projection_matrix = DMat4::from_translation(DVec3::new(0.5, 0.5, 0.0))
            * DMat4::from_scale(DVec3::new(0.5, 0.5, 1.0));
        let pixel_unprojection_matrix = DMat4::from_scale(DVec3::new(2.0, 2.0, 1.0))
            * DMat4::from_translation(DVec3::new(-0.5, -0.5, 0.0));
        Self {
            width: 1.0,
            height: 1.0,
            scale: 1.0,
            view_matrix: DMat4::IDENTITY,
            view_matrix_uncentered: DMat4::IDENTITY,
            projection_matrix: DMat4::IDENTITY,
            view_projection_matrix: DMat4::IDENTITY,
            pixel_projection_matrix,
            pixel_unprojection_matrix,
            distance_scales: None,
            projection: Arc::new(LinearProjection),
        }
    }
}

/// Elementwise comparison with a tolerance relative to the magnitudes.
pub fn matrices_approx_equal(a: &DMat4, b: &DMat4) -> bool {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .all(|(x, y)| (x - y).abs() <= MATRIX_EPSILON * 1.0_f64.max(x.abs()).max(y.abs()))
}

fn coerce_dimension(value: f64) -> f64 {
    if value > 0.0 && value.is_finite() {
        value
    } else {
        1.0
    }
}

fn invert(matrix: &DMat4) -> Result<DMat4> {
    if !matrix.determinant().is_normal() {
        return Err(OverlayError::NotInvertible);
    }
    let inverse = matrix.inverse();
    if inverse.is_finite() {
        Ok(inverse)
    } else {
        Err(OverlayError::NotInvertible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: DVec3, b: DVec3, eps: f64) -> bool {
        (a - b).abs().max_element() <= eps * 1.0_f64.max(a.abs().max_element())
    }

    #[test]
    fn test_defaults_are_identity_and_unit_size() {
        let viewport = Viewport::default();
        assert_eq!(viewport.width(), 1.0);
        assert_eq!(viewport.height(), 1.0);
        assert_eq!(viewport.scale(), 1.0);
        assert_eq!(viewport.view_projection_matrix(), DMat4::IDENTITY);
        assert!(viewport.distance_scales().is_none());

        let built = Viewport::new(ViewportDescriptor::default()).unwrap();
        assert!(matrices_approx_equal(
            &viewport.pixel_projection_matrix(),
            &built.pixel_projection_matrix()
        ));
        assert!(matrices_approx_equal(
            &viewport.pixel_unprojection_matrix(),
            &built.pixel_unprojection_matrix()
        ));
        assert_eq!(viewport, built);
    }

    #[test]
    fn test_zero_size_is_coerced() {
        let viewport = Viewport::new(ViewportDescriptor {
            width: 0.0,
            height: 0.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(viewport.width(), 1.0);
        assert_eq!(viewport.height(), 1.0);
    }

    #[test]
    fn test_singular_projection_is_rejected() {
        let result = Viewport::new(ViewportDescriptor {
            width: 800.0,
            height: 600.0,
            projection_matrix: DMat4::ZERO,
            ..Default::default()
        });
        assert!(matches!(result, Err(OverlayError::NotInvertible)));
    }

    #[test]
    fn test_clip_space_maps_to_pixel_window() {
        let viewport = Viewport::new(ViewportDescriptor {
            width: 800.0,
            height: 600.0,
            ..Default::default()
        })
        .unwrap();
        let corner = viewport.project(DVec2::new(1.0, 1.0), ProjectOptions::BOTTOM_LEFT);
        assert!((corner - DVec2::new(800.0, 600.0)).length() < 1e-9);
        let corner = viewport.project(DVec2::new(-1.0, 1.0), ProjectOptions::TOP_LEFT);
        assert!((corner - DVec2::new(0.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn test_equality_is_approximate() {
        let a = Viewport::new(ViewportDescriptor {
            width: 10.0,
            height: 10.0,
            view_matrix: DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0)),
            ..Default::default()
        })
        .unwrap();
        let b = Viewport::new(ViewportDescriptor {
            width: 10.0,
            height: 10.0,
            view_matrix: DMat4::from_translation(DVec3::new(1.0 + 1e-9, 2.0, 3.0)),
            ..Default::default()
        })
        .unwrap();
        let c = Viewport::new(ViewportDescriptor {
            width: 11.0,
            height: 10.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_matrices_with_model() {
        let viewport = Viewport::new(ViewportDescriptor {
            width: 100.0,
            height: 100.0,
            ..Default::default()
        })
        .unwrap();
        let model = DMat4::from_scale(DVec3::splat(2.0));
        let matrices = viewport.matrices(Some(model)).unwrap();
        assert_eq!(matrices.model_view_projection, model);
        assert!(matrices_approx_equal(
            &(matrices.pixel_projection * matrices.pixel_unprojection),
            &DMat4::IDENTITY
        ));
        assert!(viewport.matrices(Some(DMat4::ZERO)).is_err());
    }

    fn perspective_viewport(eye_z: f64) -> Viewport {
        Viewport::new(ViewportDescriptor {
            width: 640.0,
            height: 480.0,
            view_matrix: DMat4::look_at_rh(DVec3::new(0.3, 0.2, eye_z), DVec3::ZERO, DVec3::Y),
            projection_matrix: DMat4::perspective_rh_gl(1.0, 640.0 / 480.0, 0.1, 100.0),
        })
        .unwrap()
    }

    proptest! {
        #[test]
        fn prop_project_unproject_3d(
            x in -5.0..5.0_f64,
            y in -5.0..5.0_f64,
            z in -5.0..5.0_f64,
            eye_z in 20.0..40.0_f64,
            top_left in any::<bool>(),
        ) {
            let viewport = perspective_viewport(eye_z);
            let options = ProjectOptions { top_left };
            let p = DVec3::new(x, y, z);
            let back = viewport.unproject(viewport.project(p, options), options);
            prop_assert!(approx(back, p, 1e-6), "{p:?} -> {back:?}");
        }

        #[test]
        fn prop_project_unproject_2d(
            x in -1000.0..1000.0_f64,
            y in -1000.0..1000.0_f64,
            sx in 0.01..10.0_f64,
            sy in 0.01..10.0_f64,
            tx in -50.0..50.0_f64,
            top_left in any::<bool>(),
        ) {
            let viewport = Viewport::new(ViewportDescriptor {
                width: 300.0,
                height: 200.0,
                view_matrix: DMat4::from_translation(DVec3::new(tx, -tx, 0.0)),
                projection_matrix: DMat4::from_scale(DVec3::new(sx / 1000.0, sy / 1000.0, 1.0)),
            })
            .unwrap();
            let options = ProjectOptions { top_left };
            let p = DVec2::new(x, y);
            let back = viewport.unproject(viewport.project(p, options), options);
            prop_assert!(approx(back.extend(0.0), p.extend(0.0), 1e-9), "{p:?} -> {back:?}");
        }
    }
}
