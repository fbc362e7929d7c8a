//! Feature extraction for EMG decoding
//!
//! Reduces a window of raw frames to one or more scalar features per channel.
//! The standard feature is the log-variance of each channel; the plain
//! variance is available as well. With `F` features per channel and `C`
//! channels the feature vector has `F × C` entries, feature `f` of channel
//! `c` at index `f + c·F`.

use serde::{Deserialize, Serialize};

use prosthex_core::error::{ProcessingError, ProcessingResult};
use prosthex_core::types::Window;

/// Per-channel feature
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Natural logarithm of the unbiased sample variance
    #[default]
    LogVariance,
    /// Unbiased sample variance
    Variance,
}

impl FeatureKind {
    /// Short name used in logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LogVariance => "tlogvar",
            Self::Variance => "tvar",
        }
    }
}

/// Feature extractor for windowed EMG data
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    kinds: Vec<FeatureKind>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self { kinds: vec![FeatureKind::LogVariance] }
    }
}

impl FeatureExtractor {
    /// Create an extractor computing `kinds` for every channel.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] if `kinds` is empty.
    pub fn new(kinds: Vec<FeatureKind>) -> ProcessingResult<Self> {
        if kinds.is_empty() {
            return Err(ProcessingError::invalid("features", "at least one feature per channel is required"));
        }
        Ok(Self { kinds })
    }

    /// Features computed per channel
    #[must_use]
    pub fn kinds(&self) -> &[FeatureKind] {
        &self.kinds
    }

    /// Length of the feature vector for `channels` channels
    #[must_use]
    pub fn feature_count(&self, channels: usize) -> usize {
        self.kinds.len() * channels
    }

    /// Feature vector of a whole window.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::NumericDegeneracy`] if a channel has fewer
    /// than two frames, a non-finite variance, or (for log-variance) a
    /// variance that is not strictly positive.
    pub fn extract(&self, window: &Window) -> ProcessingResult<Vec<f64>> {
        let mut x = vec![0.0; self.feature_count(window.channels())];
        self.extract_into(window, 0, window.frames(), &mut x)?;
        Ok(x)
    }

    /// One feature vector per step of `step` frames across a longer
    /// recording, each computed over `[i - overlap, i + step + overlap)`
    /// clipped to the recording.
    ///
    /// # Errors
    ///
    /// - [`ProcessingError::InvalidParameter`] if `step` is zero
    /// - [`ProcessingError::NumericDegeneracy`] as for [`extract`](Self::extract)
    pub fn extract_batched(&self, data: &Window, step: usize, overlap: usize) -> ProcessingResult<Vec<Vec<f64>>> {
        if step == 0 {
            return Err(ProcessingError::invalid("step", "window step must be at least one frame"));
        }
        let n = data.frames();
        let mut features = Vec::with_capacity(n.div_ceil(step));
        let mut i = 0;
        while i < n {
            let lo = i.saturating_sub(overlap);
            let hi = n.min(i + step + overlap);
            let mut x = vec![0.0; self.feature_count(data.channels())];
            self.extract_into(data, lo, hi, &mut x)?;
            features.push(x);
            i += step;
        }
        Ok(features)
    }

    fn extract_into(&self, data: &Window, lo: usize, hi: usize, x: &mut [f64]) -> ProcessingResult<()> {
        let f_count = self.kinds.len();
        for c in 0..data.channels() {
            let variance = channel_variance(data, c, lo, hi)?;
            for (f, kind) in self.kinds.iter().enumerate() {
                x[f + c * f_count] = match kind {
                    FeatureKind::Variance => variance,
                    FeatureKind::LogVariance => {
                        if variance <= 0.0 {
                            return Err(ProcessingError::NumericDegeneracy { channel: c, variance });
                        }
                        variance.ln()
                    }
                };
            }
        }
        Ok(())
    }
}

/// Unbiased sample variance (divisor `N - 1`) of channel `c` over frames
/// `[lo, hi)`.
///
/// # Errors
///
/// Returns [`ProcessingError::NumericDegeneracy`] for fewer than two frames or
/// a non-finite result.
pub fn channel_variance(data: &Window, c: usize, lo: usize, hi: usize) -> ProcessingResult<f64> {
    let n = hi.saturating_sub(lo);
    if n < 2 {
        return Err(ProcessingError::NumericDegeneracy { channel: c, variance: f64::NAN });
    }
    #[allow(clippy::cast_precision_loss)]
    let n = n as f64;

    let mean = data.column_range(c, lo, hi).sum::<f64>() / n;
    let ss: f64 = data.column_range(c, lo, hi).map(|v| (v - mean) * (v - mean)).sum();
    let variance = ss / (n - 1.0);

    if !variance.is_finite() {
        return Err(ProcessingError::NumericDegeneracy { channel: c, variance });
    }
    Ok(variance)
}
