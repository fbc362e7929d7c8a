//! Model loading errors

use std::path::PathBuf;

use thiserror::Error;

use prosthex_core::error::ProcessingError;

/// Errors raised while reading a trained model from disk.
///
/// None of these are fatal to the host: a controller that fails to load
/// stays disabled and reports the message to the operator.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A required model file does not exist
    #[error("Resource file missing: {}", path.display())]
    MissingResource {
        /// Path that was expected to exist
        path: PathBuf,
    },

    /// A model file exists but could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A model file is not valid JSON or lacks a required field
    #[error("Malformed model document: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but its content is structurally wrong
    #[error("Invalid model document: {0}")]
    Format(String),

    /// The document is well-formed but its dimensions are inconsistent
    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl ModelError {
    /// Shorthand for [`ModelError::Format`]
    pub fn format(reason: impl Into<String>) -> Self {
        Self::Format(reason.into())
    }
}

/// Result type for model loading
pub type ModelResult<T> = Result<T, ModelError>;
