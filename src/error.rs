//! Error types for the form scoring pipeline.

use thiserror::Error;

/// Result type alias for formcheck operations.
pub type Result<T> = std::result::Result<T, FormError>;

/// Crate-wide error taxonomy.
///
/// Per-frame failures (`Detection`, `Decode`, `NoBaseline`) are recovered at
/// the frame boundary and reported as data in the frame's reply; only
/// configuration and transport failures surface synchronously to the caller.
#[derive(Error, Debug)]
pub enum FormError {
    /// No usable landmarks in a frame. The session continues.
    #[error("no pose detected")]
    Detection,

    /// A comparison was requested with no baseline loaded.
    #[error("no baseline loaded")]
    NoBaseline,

    /// A threshold value was out of its valid range. The previous
    /// configuration is left unchanged.
    #[error("invalid configuration: {field}: {message}")]
    Configuration { field: &'static str, message: String },

    /// Channel interruption or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Baseline collection could not produce a posture.
    #[error("baseline collection failed: {0}")]
    Baseline(String),

    /// An inbound image payload could not be decoded.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// Pose estimator failure (model load or inference).
    #[error("estimator error: {0}")]
    Estimator(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for FormError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

impl From<image::ImageError> for FormError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode(err.to_string())
    }
}
