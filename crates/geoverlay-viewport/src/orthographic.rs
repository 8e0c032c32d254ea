//! Free 3D camera with an orthographic projection.

use geoverlay_core::Result;
use glam::{DMat4, DVec3};

use crate::viewport::{Viewport, ViewportDescriptor};

/// Parameters of an [`OrthographicViewport`].
///
/// `right` and `bottom` default to `left + width` and `top + height`, so the
/// default frustum maps world units to pixels with y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthographicParams {
    pub width: f64,
    pub height: f64,
    pub eye: DVec3,
    pub look_at: DVec3,
    pub up: DVec3,
    pub left: f64,
    pub top: f64,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
    pub near: f64,
    pub far: f64,
}

impl Default for OrthographicParams {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            eye: DVec3::new(0.0, 0.0, 1.0),
            look_at: DVec3::ZERO,
            up: DVec3::Y,
            left: 0.0,
            top: 0.0,
            right: None,
            bottom: None,
            near: 1.0,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrthographicViewport {
    viewport: Viewport,
    params: OrthographicParams,
}

impl OrthographicViewport {
    pub fn new(params: OrthographicParams) -> Result<Self> {
        let right = params.right.unwrap_or(params.left + params.width);
        let bottom = params.bottom.unwrap_or(params.top + params.height);
        let viewport = Viewport::new(ViewportDescriptor {
            width: params.width,
            height: params.height,
            view_matrix: DMat4::look_at_rh(params.eye, params.look_at, params.up),
            projection_matrix: DMat4::orthographic_rh_gl(
                params.left,
                right,
                bottom,
                params.top,
                params.near,
                params.far,
            ),
        })?;
        Ok(Self { viewport, params })
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn params(&self) -> &OrthographicParams {
        &self.params
    }
}

impl AsRef<Viewport> for OrthographicViewport {
    fn as_ref(&self) -> &Viewport {
        &self.viewport
    }
}

impl From<OrthographicViewport> for Viewport {
    fn from(viewport: OrthographicViewport) -> Self {
        viewport.viewport
    }
}
