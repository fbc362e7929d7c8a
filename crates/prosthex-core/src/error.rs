//! Error types for the Prosthex decoding pipeline
//!
//! [`ProcessingError`] covers every failure that can arise while building or
//! running the pure computational stages (sparse algebra, windowing,
//! filtering, feature extraction and inference). File and document errors
//! live in the native crate and wrap this type.

use thiserror::Error;

// ============================================================================
// Processing Errors
// ============================================================================

/// Errors raised by model construction and the steady-state decode step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    /// A row or column index lies outside the declared matrix shape
    #[error("{axis} index {index} is out of range for a matrix with {bound} {axis}s")]
    IndexOutOfBounds {
        /// Which axis was violated ("row" or "column")
        axis: &'static str,
        /// The offending index (0-based)
        index: usize,
        /// The declared length of that axis
        bound: usize,
    },

    /// Two shapes that must agree do not
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Which relation was violated
        context: &'static str,
        /// The size required by the receiving side
        expected: usize,
        /// The size actually supplied
        got: usize,
    },

    /// A frame did not carry the configured number of channels
    #[error("expected {expected} channels but got a frame with {got} channels")]
    ChannelCountMismatch {
        /// Configured channel count
        expected: usize,
        /// Channel count of the rejected frame
        got: usize,
    },

    /// `store` was called on a full window buffer
    #[error("window buffer is full ({capacity} frames); retrieve the window before storing")]
    BufferOverflow {
        /// Buffer capacity in frames
        capacity: usize,
    },

    /// A configuration value is outside its admissible range
    #[error("invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        /// Parameter name
        parameter: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// A feature would require the logarithm of a non-positive variance
    #[error("degenerate signal on channel {channel}: variance {variance} has no finite logarithm")]
    NumericDegeneracy {
        /// Channel whose window was degenerate
        channel: usize,
        /// The variance that was computed
        variance: f64,
    },
}

impl ProcessingError {
    /// Shorthand for an [`ProcessingError::InvalidParameter`].
    pub fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { parameter, reason: reason.into() }
    }

    /// Shorthand for a [`ProcessingError::DimensionMismatch`].
    pub const fn mismatch(context: &'static str, expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { context, expected, got }
    }
}

/// Result type for processing operations
pub type ProcessingResult<T> = Result<T, ProcessingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_dimensions() {
        let err = ProcessingError::mismatch("sparse apply", 4, 3);
        assert_eq!(err.to_string(), "dimension mismatch in sparse apply: expected 4, got 3");

        let err = ProcessingError::IndexOutOfBounds { axis: "row", index: 7, bound: 5 };
        assert!(err.to_string().contains("row index 7"));
    }

    #[test]
    fn test_invalid_shorthand() {
        let err = ProcessingError::invalid("dt", "must lie in [0, 1]");
        assert!(matches!(err, ProcessingError::InvalidParameter { parameter: "dt", .. }));
    }
}
