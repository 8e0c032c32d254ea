//! Core abstractions for geoverlay-rs.
//!
//! This crate provides the small building blocks shared by the viewport and
//! layer crates:
//! - [`OverlayError`] and the crate-wide [`Result`] alias
//! - [`Logger`], an injectable priority logger with its own dedup cache
//! - [`fp64ify`] for splitting doubles into shader-friendly float pairs
//! - [`PropSet`] and [`compare_props`] for diffing declared layer inputs
//! - The picking color codec and [`PickMode`]
//! - [`Options`] for overlay configuration

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod fp64;
pub mod logger;
pub mod options;
pub mod pick;
pub mod props;

pub use error::{OverlayError, Result};
pub use fp64::{fp64_join, fp64ify, fp64ify_matrix4};
pub use logger::Logger;
pub use options::Options;
pub use pick::{
    decode_picking_color, encode_picking_color, null_picking_color, PickMode, MAX_PICKING_INDEX,
};
pub use props::{compare_props, Callback, PropSet, PropValue};
