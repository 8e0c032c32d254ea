//! Serializable map camera state.

use geoverlay_core::Result;
use serde::{Deserialize, Serialize};

/// Parameters of a [`crate::WebMercatorViewport`].
///
/// Angles are in degrees; altitude is in screen heights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapState {
    pub width: f64,
    pub height: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
    pub altitude: f64,
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            latitude: 37.0,
            longitude: -122.0,
            zoom: 11.0,
            pitch: 0.0,
            bearing: 0.0,
            altitude: 1.5,
        }
    }
}

impl MapState {
    /// Parses a map state from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
