//! Decoder error types

use thiserror::Error;

use prosthex_core::error::ProcessingError;

/// Errors raised by the streaming decode step
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecoderError {
    /// A frame arrived before the controller was configured
    #[error("Controller '{controller}' is not configured")]
    NotConfigured {
        /// Controller display name
        controller: &'static str,
    },

    /// An earlier decode step failed and the pipeline stopped
    #[error("Decode pipeline halted after: {cause}")]
    Halted {
        /// Error that halted the pipeline
        cause: ProcessingError,
    },

    /// Another thread panicked while holding the decoder
    #[error("Decoder state lock poisoned")]
    Poisoned,

    /// The event ingestion task is no longer running
    #[error("Event ingestion stopped")]
    IngestionStopped,

    /// A processing stage failed on this frame
    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

/// Result type for decode steps
pub type DecoderResult<T> = Result<T, DecoderError>;
