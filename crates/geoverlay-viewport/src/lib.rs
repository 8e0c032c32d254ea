//! Viewport projection math for geoverlay-rs.
//!
//! A [`Viewport`] composes view and projection matrices, maps world points to
//! pixels and back, and carries a [`FlatProjection`] hook for the nonlinear
//! step. [`WebMercatorViewport`] builds a map camera from a [`MapState`];
//! [`get_uniforms_from_viewport`] turns any viewport into shader uniforms.

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Projection math uses short names like x, y, s
#![allow(clippy::many_single_char_names)]
#![allow(clippy::similar_names)]

pub mod map_state;
pub mod orthographic;
pub mod perspective;
pub mod uniforms;
pub mod viewport;
pub mod web_mercator;

pub use map_state::MapState;
pub use orthographic::{OrthographicParams, OrthographicViewport};
pub use perspective::{PerspectiveParams, PerspectiveViewport};
pub use uniforms::{
    get_uniforms_from_viewport, CoordinateSystem, ProjectionUniforms, UniformOptions,
    ViewportUniforms,
};
pub use viewport::{
    matrices_approx_equal, FlatProjection, LinearProjection, ProjectOptions, ViewPoint, Viewport,
    ViewportDescriptor, ViewportMatrices,
};
pub use web_mercator::{
    lng_lat_to_world, world_to_lng_lat, DistanceScales, WebMercatorProjection,
    WebMercatorViewport, TILE_SIZE, WORLD_SCALE,
};
