//! Configuration options for the layer manager.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Global configuration options for an overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Device pixels per CSS pixel, used to convert pick coordinates.
    pub pixel_ratio: f64,

    /// Whether an equal viewport passed to `set_viewport` still counts as a change.
    ///
    /// When false every `set_viewport` call marks the viewport as changed.
    pub detect_viewport_changes: bool,

    /// Priority threshold for the overlay's logger (0 = warnings only).
    pub log_priority: u8,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pixel_ratio: 1.0,
            detect_viewport_changes: false,
            log_priority: 0,
        }
    }
}

impl Options {
    /// Parses options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes options to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
