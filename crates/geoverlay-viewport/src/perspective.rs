//! Free 3D camera with a perspective projection.

use geoverlay_core::Result;
use glam::{DMat4, DVec3};

use crate::viewport::{Viewport, ViewportDescriptor};

/// Parameters of a [`PerspectiveViewport`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveParams {
    pub width: f64,
    pub height: f64,
    pub eye: DVec3,
    pub look_at: DVec3,
    pub up: DVec3,
    /// Vertical field of view in degrees.
    pub fovy: f64,
    pub near: f64,
    pub far: f64,
    /// Defaults to `width / height`.
    pub aspect: Option<f64>,
}

impl Default for PerspectiveParams {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            eye: DVec3::new(0.0, 0.0, 1.0),
            look_at: DVec3::ZERO,
            up: DVec3::Y,
            fovy: 75.0,
            near: 1.0,
            far: 100.0,
            aspect: None,
        }
    }
}

/// A look-at camera with a perspective frustum.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveViewport {
    viewport: Viewport,
    params: PerspectiveParams,
}

impl PerspectiveViewport {
    pub fn new(params: PerspectiveParams) -> Result<Self> {
        let aspect = params.aspect.unwrap_or(params.width / params.height);
        let viewport = Viewport::new(ViewportDescriptor {
            width: params.width,
            height: params.height,
            view_matrix: DMat4::look_at_rh(params.eye, params.look_at, params.up),
            projection_matrix: DMat4::perspective_rh_gl(
                params.fovy.to_radians(),
                aspect,
                params.near,
                params.far,
            ),
        })?;
        Ok(Self { viewport, params })
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn params(&self) -> &PerspectiveParams {
        &self.params
    }
}

impl AsRef<Viewport> for PerspectiveViewport {
    fn as_ref(&self) -> &Viewport {
        &self.viewport
    }
}

impl From<PerspectiveViewport> for Viewport {
    fn from(viewport: PerspectiveViewport) -> Self {
        viewport.viewport
    }
}
