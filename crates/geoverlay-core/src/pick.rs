//! Picking color codec.
//!
//! During the picking pass every instance is drawn with a unique RGB color.
//! The instance index is stored offset by one, least significant byte first,
//! so that the cleared color buffer (all zeros) decodes to "nothing picked".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OverlayError;

/// Largest instance index that fits in a picking color.
pub const MAX_PICKING_INDEX: usize = 0xFF_FFFF - 1;

/// Encodes an instance index as a picking color.
///
/// Returns [R, G, B] where:
/// - R contains bits 0-7 of `index + 1`
/// - G contains bits 8-15
/// - B contains bits 16-23
///
/// Indices above [`MAX_PICKING_INDEX`] wrap around.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_picking_color(index: usize) -> [u8; 3] {
    let value = index.wrapping_add(1);
    [
        (value & 0xFF) as u8,
        ((value >> 8) & 0xFF) as u8,
        ((value >> 16) & 0xFF) as u8,
    ]
}

/// Decodes a picking color back to an instance index.
///
/// Returns `None` for the background color (all zeros).
#[must_use]
pub fn decode_picking_color(color: [u8; 3]) -> Option<usize> {
    let value =
        usize::from(color[0]) | (usize::from(color[1]) << 8) | (usize::from(color[2]) << 16);
    value.checked_sub(1)
}

/// The color drawn for geometry that belongs to no pickable instance.
#[must_use]
pub fn null_picking_color() -> [u8; 3] {
    [0, 0, 0]
}

/// Which pointer interaction a pick pass serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickMode {
    /// Dispatch to `on_click` handlers.
    Click,
    /// Dispatch to `on_hover` handlers and remember the hovered color.
    Hover,
}

impl fmt::Display for PickMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickMode::Click => write!(f, "click"),
            PickMode::Hover => write!(f, "hover"),
        }
    }
}

impl FromStr for PickMode {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(PickMode::Click),
            "hover" => Ok(PickMode::Hover),
            other => Err(OverlayError::UnknownPickMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_specific_colors() {
        assert_eq!(encode_picking_color(0), [1, 0, 0]);
        assert_eq!(encode_picking_color(254), [255, 0, 0]);
        assert_eq!(encode_picking_color(255), [0, 1, 0]);
        assert_eq!(encode_picking_color(MAX_PICKING_INDEX), [255, 255, 255]);
    }

    #[test]
    fn test_background_decodes_to_none() {
        assert_eq!(decode_picking_color(null_picking_color()), None);
        assert_eq!(decode_picking_color([1, 0, 0]), Some(0));
    }

    #[test]
    fn test_near_ceiling_roundtrip() {
        let index = 16_777_214;
        assert_eq!(decode_picking_color(encode_picking_color(index)), Some(index));
    }

    #[test]
    fn test_pick_mode_parse() {
        assert_eq!("click".parse::<PickMode>().unwrap(), PickMode::Click);
        assert_eq!("hover".parse::<PickMode>().unwrap(), PickMode::Hover);
        assert!(matches!(
            "drag".parse::<PickMode>(),
            Err(OverlayError::UnknownPickMode(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_color_roundtrip(index in 0usize..=MAX_PICKING_INDEX) {
            prop_assert_eq!(decode_picking_color(encode_picking_color(index)), Some(index));
        }
    }
}
