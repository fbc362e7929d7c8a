//! Frame-to-feature decode pipeline
//!
//! ```text
//! frame ─► StreamingWindowBuffer ─► CombFilter ─► FeatureExtractor ─► features
//! ```
//!
//! One feature vector is produced per completed window. Any failure other
//! than a degenerate window halts the pipeline until it is reset.

use tracing::{debug, error, warn};

use prosthex_core::error::{ProcessingError, ProcessingResult};

use super::config::DecoderConfig;
use super::error::{DecoderError, DecoderResult};
use crate::ml::features::FeatureExtractor;
use crate::processing::buffer::StreamingWindowBuffer;
use crate::processing::filters::CombFilter;

/// Stateful decode pipeline for one EMG stream
#[derive(Clone, Debug)]
pub struct DecodePipeline {
    config: DecoderConfig,
    buffer: StreamingWindowBuffer,
    filter: CombFilter,
    extractor: FeatureExtractor,
    halted: Option<ProcessingError>,
    windows: u64,
    skipped: u64,
}

impl DecodePipeline {
    /// Build the stages described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] for an unusable window
    /// shape, filter frequency or empty feature list.
    pub fn new(config: DecoderConfig) -> ProcessingResult<Self> {
        let buffer = StreamingWindowBuffer::new(config.packet_size, config.overlap, config.channels)?;
        let filter = CombFilter::new(config.sampling_hz, config.interference_hz, config.comb_alpha, config.channels)?;
        let extractor = FeatureExtractor::new(config.features.clone())?;
        let names: Vec<&str> = extractor.kinds().iter().map(|k| k.name()).collect();
        debug!(
            "Decode pipeline: {} frames per window, comb delay {}, {} features ({})",
            buffer.capacity(),
            filter.delay(),
            config.feature_count(),
            names.join(", ")
        );
        Ok(Self { config, buffer, filter, extractor, halted: None, windows: 0, skipped: 0 })
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Length of the emitted feature vectors
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.extractor.feature_count(self.config.channels)
    }

    /// Error that halted the pipeline, if any
    #[must_use]
    pub const fn halt_cause(&self) -> Option<&ProcessingError> {
        self.halted.as_ref()
    }

    /// True once a decode step failed
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Windows decoded so far
    #[must_use]
    pub const fn windows_completed(&self) -> u64 {
        self.windows
    }

    /// Windows dropped because a channel was degenerate
    #[must_use]
    pub const fn windows_skipped(&self) -> u64 {
        self.skipped
    }

    /// Feed one frame. Returns the feature vector when the frame completed a
    /// window.
    ///
    /// A window with a degenerate channel is dropped with a warning.
    ///
    /// # Errors
    ///
    /// - [`DecoderError::Halted`] if an earlier step failed
    /// - [`DecoderError::Processing`] for the failure that halts the pipeline
    pub fn push(&mut self, frame: &[f64]) -> DecoderResult<Option<Vec<f64>>> {
        if let Some(cause) = &self.halted {
            return Err(DecoderError::Halted { cause: cause.clone() });
        }
        match self.step(frame) {
            Ok(Some(features)) => {
                self.windows += 1;
                Ok(Some(features))
            }
            Ok(None) => Ok(None),
            Err(ProcessingError::NumericDegeneracy { channel, variance }) => {
                self.skipped += 1;
                warn!("Dropping window: channel {channel} is degenerate (variance {variance})");
                Ok(None)
            }
            Err(e) => Err(self.halt(e)),
        }
    }

    /// Stop decoding because a later stage failed on the last feature vector.
    /// Every push fails with [`DecoderError::Halted`] until [`reset`](Self::reset).
    pub fn halt(&mut self, cause: ProcessingError) -> DecoderError {
        error!("Decode pipeline halted: {cause}");
        self.halted = Some(cause.clone());
        cause.into()
    }

    fn step(&mut self, frame: &[f64]) -> ProcessingResult<Option<Vec<f64>>> {
        if !self.buffer.store(frame)? {
            return Ok(None);
        }
        let Some(window) = self.buffer.retrieve() else {
            return Ok(None);
        };
        let filtered = self.filter.filter(&window)?;
        self.extractor.extract(&filtered).map(Some)
    }

    /// Start a fresh stream: empty buffer, zeroed filter memory, halt cleared
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.filter.reset();
        self.halted = None;
        self.windows = 0;
        self.skipped = 0;
    }
}
