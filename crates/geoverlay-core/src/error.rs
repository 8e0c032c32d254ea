//! Error types for geoverlay-rs.

use thiserror::Error;

/// The main error type for geoverlay-rs operations.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// The pixel projection matrix of a viewport has no inverse.
    #[error("pixel project matrix not invertible")]
    NotInvertible,

    /// A coordinate system mode could not be recognized.
    #[error("unknown coordinate system '{0}'")]
    UnknownCoordinateSystem(String),

    /// The viewport carries no usable scale.
    #[error("viewport scale missing")]
    MissingScale,

    /// The viewport carries no distance scales (pixels per meter).
    #[error("viewport missing pixels per unit")]
    MissingPixelsPerUnit,

    /// An attribute was registered without a component count.
    #[error("attribute definition for '{0}' missing size")]
    MissingAttributeSize(String),

    /// An attribute was registered with neither an updater nor `no_alloc`.
    #[error("attribute updater for '{0}' missing update method")]
    MissingAttributeUpdate(String),

    /// An attribute name is not registered with the manager.
    #[error("invalidating non-existent attribute '{name}' for {manager}; valid attributes: {valid}")]
    UnknownAttribute {
        name: String,
        manager: String,
        valid: String,
    },

    /// An external buffer was supplied for an unregistered attribute.
    #[error("unknown attribute prop '{0}'")]
    UnknownExternalBuffer(String),

    /// An external buffer does not hold the attribute's element type.
    #[error("attribute '{name}' expects {expected} buffer, got {actual}")]
    ExternalBufferType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// An external buffer is shorter than `num_instances * size`.
    #[error("attribute '{name}' buffer too small: expected at least {expected}, got {actual}")]
    ExternalBufferTooSmall {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// `num_instances * size` does not fit in memory.
    #[error("attribute '{name}' of size {size} cannot hold {num_instances} instances")]
    AttributeTooLarge {
        name: String,
        size: usize,
        num_instances: usize,
    },

    /// No viewport was set before a layer pass.
    #[error("{0}: viewport not set")]
    ViewportNotSet(&'static str),

    /// A pick mode could not be recognized.
    #[error("unknown pick type '{0}'")]
    UnknownPickMode(String),

    /// A layer lifecycle method failed.
    #[error("layer '{id}': {message}")]
    Layer { id: String, message: String },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl OverlayError {
    /// Creates a layer lifecycle error.
    pub fn layer(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Layer {
            id: id.into(),
            message: message.into(),
        }
    }
}

/// A specialized Result type for geoverlay-rs operations.
pub type Result<T> = std::result::Result<T, OverlayError>;
