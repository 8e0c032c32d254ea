//! Web Mercator map camera.
//!
//! Longitude/latitude are projected onto a 512x512 world tile scaled by
//! `2^zoom`. The camera looks straight down from `altitude` screen heights,
//! tilted by `pitch` and rotated by `bearing`.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::sync::Arc;

use geoverlay_core::Result;
use glam::{DMat4, DVec2, DVec3, DVec4};
use serde::{Deserialize, Serialize};

use crate::map_state::MapState;
use crate::viewport::{FlatProjection, ProjectOptions, ViewPoint, Viewport, ViewportDescriptor};

/// Size of the world tile at zoom 0, in pixels.
pub const TILE_SIZE: f64 = 512.0;

/// World pixels per radian at zoom 0.
pub const WORLD_SCALE: f64 = TILE_SIZE / (2.0 * PI);

/// Lowest usable camera altitude, in screen heights.
pub const MIN_ALTITUDE: f64 = 0.75;

/// Approximate meters per degree of latitude.
const METERS_PER_DEGREE_AT_EQUATOR: f64 = 111_000.0;

/// Earth circumference used for altitude scaling, in meters.
const EARTH_CIRCUMFERENCE: f64 = 40_000_000.0;

/// Projects `[lng, lat]` in degrees to world pixels at the given scale.
///
/// The world y axis grows southwards.
pub fn lng_lat_to_world(lng_lat: DVec2, scale: f64) -> DVec2 {
    let lambda = lng_lat.x.to_radians();
    let phi = lng_lat.y.to_radians();
    let s = scale * WORLD_SCALE;
    DVec2::new(
        s * (lambda + PI),
        s * (PI - (FRAC_PI_4 + phi * 0.5).tan().ln()),
    )
}

/// Inverse of [`lng_lat_to_world`].
pub fn world_to_lng_lat(xy: DVec2, scale: f64) -> DVec2 {
    let s = scale * WORLD_SCALE;
    let lambda = xy.x / s - PI;
    let phi = 2.0 * ((PI - xy.y / s).exp().atan() - FRAC_PI_4);
    DVec2::new(lambda.to_degrees(), phi.to_degrees())
}

/// The spherical mercator flat projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebMercatorProjection;

impl FlatProjection for WebMercatorProjection {
    fn project_flat(&self, xy: DVec2, scale: f64) -> DVec2 {
        lng_lat_to_world(xy, scale)
    }

    fn unproject_flat(&self, xy: DVec2, scale: f64) -> DVec2 {
        world_to_lng_lat(xy, scale)
    }
}

/// Local conversion factors between meters, degrees and pixels.
///
/// Valid near the point they were computed for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceScales {
    pub pixels_per_meter: DVec3,
    pub meters_per_pixel: DVec3,
    pub pixels_per_degree: DVec3,
    pub degrees_per_pixel: DVec3,
}

impl DistanceScales {
    /// Computes the scales at `[lng, lat]` for the given world scale.
    ///
    /// Pixels per degree are measured by finite difference over one degree.
    pub fn at(lng_lat: DVec2, scale: f64) -> Self {
        let west = lng_lat_to_world(DVec2::new(lng_lat.x - 0.5, lng_lat.y), scale);
        let east = lng_lat_to_world(DVec2::new(lng_lat.x + 0.5, lng_lat.y), scale);
        let north = lng_lat_to_world(DVec2::new(lng_lat.x, lng_lat.y + 0.5), scale);
        let south = lng_lat_to_world(DVec2::new(lng_lat.x, lng_lat.y - 0.5), scale);

        let pixels_per_degree_x = (east.x - west.x).abs();
        let pixels_per_degree_y = (south.y - north.y).abs();

        let cos_lat = lng_lat.y.to_radians().cos();
        let meters_per_degree = METERS_PER_DEGREE_AT_EQUATOR * cos_lat;
        let altitude_pixels_per_meter = TILE_SIZE * scale / (EARTH_CIRCUMFERENCE * cos_lat);

        let pixels_per_meter_z = (pixels_per_degree_x / meters_per_degree
            + pixels_per_degree_y / meters_per_degree)
            / 2.0;

        Self {
            pixels_per_meter: DVec3::splat(altitude_pixels_per_meter),
            meters_per_pixel: DVec3::new(
                1.0 / altitude_pixels_per_meter,
                1.0 / altitude_pixels_per_meter,
                1.0 / pixels_per_meter_z,
            ),
            pixels_per_degree: DVec3::new(
                pixels_per_degree_x,
                pixels_per_degree_y,
                pixels_per_meter_z,
            ),
            degrees_per_pixel: DVec3::new(
                1.0 / pixels_per_degree_x,
                1.0 / pixels_per_degree_y,
                1.0 / pixels_per_meter_z,
            ),
        }
    }
}

/// A map camera positioned by longitude, latitude and zoom.
#[derive(Debug, Clone, PartialEq)]
pub struct WebMercatorViewport {
    viewport: Viewport,
    state: MapState,
    view_center: DVec4,
}

impl WebMercatorViewport {
    /// Builds the camera for a map state.
    ///
    /// Altitude is clamped to [`MIN_ALTITUDE`].
    pub fn new(state: &MapState) -> Result<Self> {
        let mut state = state.clone();
        state.altitude = state.altitude.max(MIN_ALTITUDE);
        let width = if state.width > 0.0 { state.width } else { 1.0 };
        let height = if state.height > 0.0 { state.height } else { 1.0 };
        let scale = state.zoom.exp2();

        let projection_matrix =
            make_projection_matrix(width, height, state.pitch, state.altitude);

        let view_matrix_uncentered = DMat4::from_translation(DVec3::new(0.0, 0.0, -state.altitude))
            * DMat4::from_scale(DVec3::new(1.0, -1.0, 1.0 / height))
            * DMat4::from_rotation_x(state.pitch.to_radians())
            * DMat4::from_rotation_z(-state.bearing.to_radians());

        let center = lng_lat_to_world(DVec2::new(state.longitude, state.latitude), scale);
        let view_center = view_matrix_uncentered * DVec4::new(-center.x, -center.y, 0.0, 1.0);
        let view_matrix =
            view_matrix_uncentered * DMat4::from_translation(DVec3::new(-center.x, -center.y, 0.0));

        let mut viewport = Viewport::with_projection(
            ViewportDescriptor {
                width,
                height,
                view_matrix,
                projection_matrix,
            },
            Arc::new(WebMercatorProjection),
        )?;
        viewport.set_scale(scale);
        viewport.set_view_matrix_uncentered(view_matrix_uncentered);
        viewport.set_distance_scales(DistanceScales::at(
            DVec2::new(state.longitude, state.latitude),
            scale,
        ));

        log::trace!(
            "mercator viewport at ({}, {}) zoom {} pitch {} bearing {}",
            state.longitude,
            state.latitude,
            state.zoom,
            state.pitch,
            state.bearing
        );

        Ok(Self {
            viewport,
            state,
            view_center,
        })
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn into_viewport(self) -> Viewport {
        self.viewport
    }

    /// The map state this camera was built from, with altitude clamped.
    pub fn state(&self) -> &MapState {
        &self.state
    }

    pub fn latitude(&self) -> f64 {
        self.state.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.state.longitude
    }

    pub fn zoom(&self) -> f64 {
        self.state.zoom
    }

    pub fn pitch(&self) -> f64 {
        self.state.pitch
    }

    pub fn bearing(&self) -> f64 {
        self.state.bearing
    }

    pub fn altitude(&self) -> f64 {
        self.state.altitude
    }

    pub fn scale(&self) -> f64 {
        self.viewport.scale()
    }

    /// The map center transformed by the uncentered view matrix.
    pub fn view_center(&self) -> DVec4 {
        self.view_center
    }

    pub fn distance_scales(&self) -> DistanceScales {
        self.viewport
            .distance_scales()
            .copied()
            .unwrap_or_else(|| {
                DistanceScales::at(DVec2::new(self.longitude(), self.latitude()), self.scale())
            })
    }

    pub fn project<P: ViewPoint>(&self, point: P, options: ProjectOptions) -> P {
        self.viewport.project(point, options)
    }

    pub fn unproject<P: ViewPoint>(&self, pixel: P, options: ProjectOptions) -> P {
        self.viewport.unproject(pixel, options)
    }

    pub fn project_flat(&self, lng_lat: DVec2) -> DVec2 {
        self.viewport.project_flat(lng_lat)
    }

    pub fn unproject_flat(&self, xy: DVec2) -> DVec2 {
        self.viewport.unproject_flat(xy)
    }

    /// Converts a meter offset to a `[dLng, dLat]` delta near the map center.
    ///
    /// The z component, if any, passes through unchanged.
    pub fn meters_to_lng_lat_delta<P: ViewPoint>(&self, meters: P) -> P {
        let m = meters.to_xyz();
        let scales = self.distance_scales();
        P::from_xyz(DVec3::new(
            m.x * scales.pixels_per_meter.x * scales.degrees_per_pixel.x,
            m.y * scales.pixels_per_meter.y * scales.degrees_per_pixel.y,
            m.z,
        ))
    }

    /// Converts a `[dLng, dLat]` delta to meters near the map center.
    pub fn lng_lat_delta_to_meters<P: ViewPoint>(&self, delta: P) -> P {
        let d = delta.to_xyz();
        let scales = self.distance_scales();
        P::from_xyz(DVec3::new(
            d.x * scales.pixels_per_degree.x * scales.meters_per_pixel.x,
            d.y * scales.pixels_per_degree.y * scales.meters_per_pixel.y,
            d.z,
        ))
    }

    /// Offsets a `[lng, lat(, z)]` position by a meter offset.
    pub fn add_meters_to_lng_lat<P: ViewPoint, Q: ViewPoint>(&self, lng_lat_z: P, meters: Q) -> P {
        let base = lng_lat_z.to_xyz();
        let delta = self.meters_to_lng_lat_delta(meters.to_xyz());
        P::from_xyz(base + delta)
    }
}

impl AsRef<Viewport> for WebMercatorViewport {
    fn as_ref(&self) -> &Viewport {
        &self.viewport
    }
}

impl From<WebMercatorViewport> for Viewport {
    fn from(viewport: WebMercatorViewport) -> Self {
        viewport.viewport
    }
}

fn make_projection_matrix(width: f64, height: f64, pitch: f64, altitude: f64) -> DMat4 {
    let pitch_radians = pitch.to_radians();
    let half_fov = (0.5 / altitude).atan();
    let top_half_surface_distance =
        half_fov.sin() * altitude / (FRAC_PI_2 - pitch_radians - half_fov).sin();
    // Far plane sits just beyond the farthest visible ground point
    let far_z = (FRAC_PI_2 - pitch_radians).cos() * top_half_surface_distance + altitude;

    DMat4::perspective_rh_gl(
        2.0 * ((height / 2.0) / altitude).atan(),
        width / height,
        0.1,
        far_z * 10.0,
    )
}
