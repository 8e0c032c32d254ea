//! Viewport integration tests: map cameras, projection round trips and
//! uniforms as seen through the public facade.

use geoverlay::*;
use proptest::prelude::*;

fn map(state: MapState) -> WebMercatorViewport {
    WebMercatorViewport::new(&state).unwrap()
}

#[test]
fn test_map_center_projects_to_screen_center() {
    let viewport = map(MapState {
        width: 800.0,
        height: 600.0,
        pitch: 30.0,
        bearing: 45.0,
        ..Default::default()
    });
    let pixel = viewport.project(DVec2::new(-122.0, 37.0), ProjectOptions::TOP_LEFT);
    assert!((pixel - DVec2::new(400.0, 300.0)).length() < 1e-6, "{pixel}");
}

#[test]
fn test_viewport_equality_ignores_construction_path() {
    let state = MapState {
        width: 640.0,
        height: 480.0,
        zoom: 4.0,
        ..Default::default()
    };
    let a: Viewport = map(state.clone()).into();
    let b: Viewport = map(state).into();
    assert_eq!(a, b);

    let moved: Viewport = map(MapState {
        width: 640.0,
        height: 480.0,
        zoom: 4.5,
        ..Default::default()
    })
    .into();
    assert_ne!(a, moved);
}

#[test]
fn test_non_geographic_viewport_cannot_draw() {
    let perspective = PerspectiveViewport::new(PerspectiveParams {
        width: 100.0,
        height: 100.0,
        ..Default::default()
    })
    .unwrap();
    let result = get_uniforms_from_viewport(perspective.viewport(), &UniformOptions::default());
    assert!(matches!(result, Err(OverlayError::MissingPixelsPerUnit)));
}

#[test]
fn test_meter_offset_uniforms_center_on_origin() {
    let viewport = map(MapState {
        width: 800.0,
        height: 600.0,
        ..Default::default()
    });
    let uniforms = get_uniforms_from_viewport(
        viewport.viewport(),
        &UniformOptions {
            coordinate_system: CoordinateSystem::MeterOffsets,
            position_origin: DVec2::new(-122.0, 37.0),
            model_matrix: None,
        },
    )
    .unwrap();
    // The origin is the camera target, so it sits at the clip-space center
    let center = uniforms.projection_center;
    assert!((center.x / center.w).abs() < 1e-9);
    assert!((center.y / center.w).abs() < 1e-9);
}

#[test]
fn test_fp64_split_recovers_double() {
    let [hi, lo] = fp64ify(std::f64::consts::PI);
    let joined = f64::from(hi) + f64::from(lo);
    assert!((joined - std::f64::consts::PI).abs() < 1e-13);
}

proptest! {
    #[test]
    fn prop_map_pixels_round_trip(
        lng in -170.0f64..170.0,
        lat in -60.0f64..60.0,
        zoom in 2.0f64..18.0,
        pitch in 0.0f64..45.0,
        bearing in -180.0f64..180.0,
        px in 0.0f64..800.0,
        py in 0.0f64..600.0,
    ) {
        let viewport = map(MapState {
            width: 800.0,
            height: 600.0,
            longitude: lng,
            latitude: lat,
            zoom,
            pitch,
            bearing,
            ..Default::default()
        });
        let pixel = DVec2::new(px, py);
        let lng_lat = viewport.unproject(pixel, ProjectOptions::TOP_LEFT);
        let back = viewport.project(lng_lat, ProjectOptions::TOP_LEFT);
        prop_assert!((back - pixel).length() < 1e-4, "{pixel} -> {lng_lat} -> {back}");
    }
}
