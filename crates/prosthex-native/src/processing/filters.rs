//! Digital filters for EMG preprocessing
//!
//! - [`CombFilter`]: removes periodic interference (mains hum) from batches
//!   of frames, carrying history across batch boundaries
//! - [`RmsFilter`] / [`ChannelEnvelope`]: sliding RMS activation envelope

use prosthex_core::error::{ProcessingError, ProcessingResult};
use prosthex_core::types::{Window, ARMBAND_SAMPLING_HZ};

/// Mains frequency removed by the armband decoders (Hz)
pub const MAINS_HZ: f64 = 50.0;

/// Default comb feedback coefficient
pub const DEFAULT_COMB_ALPHA: f64 = 0.75;

// ============================================================================
// Comb Filter
// ============================================================================

/// Stateful comb filter with delay `round(fs / f0)`:
///
/// `y[t] = x[t] - x[t - delay] + α · y[t - delay]`
///
/// The last `delay` raw and filtered frames of every batch are remembered, so
/// a stream split into batches filters exactly like the concatenated stream.
/// Input windows are never modified.
#[derive(Clone, Debug)]
pub struct CombFilter {
    sampling_hz: f64,
    interference_hz: f64,
    alpha: f64,
    delay: usize,
    channels: usize,
    /// Last `delay` raw frames, row-major `delay × channels`
    raw_memory: Vec<f64>,
    /// Last `delay` filtered frames, row-major `delay × channels`
    filtered_memory: Vec<f64>,
}

impl CombFilter {
    /// Create a filter for `channels` channels.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] if the interference
    /// frequency is not positive, if `sampling_hz <= 2 · interference_hz`
    /// (the target lies at or above Nyquist), if the delay in frames cannot
    /// be represented, or if `channels` is zero.
    pub fn new(sampling_hz: f64, interference_hz: f64, alpha: f64, channels: usize) -> ProcessingResult<Self> {
        if interference_hz.is_nan() || interference_hz <= 0.0 {
            return Err(ProcessingError::invalid(
                "interference_hz",
                format!("{interference_hz} Hz is not a positive frequency"),
            ));
        }
        if sampling_hz.is_nan() || sampling_hz <= 2.0 * interference_hz {
            return Err(ProcessingError::invalid(
                "interference_hz",
                format!("{interference_hz} Hz exceeds half the sampling frequency of {sampling_hz} Hz"),
            ));
        }
        if channels == 0 {
            return Err(ProcessingError::invalid("channels", "must be at least one channel"));
        }

        let ratio = (sampling_hz / interference_hz).round();
        if !ratio.is_finite() {
            return Err(ProcessingError::invalid(
                "sampling_hz",
                format!("{sampling_hz} Hz gives no finite delay at {interference_hz} Hz"),
            ));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = ratio as usize;
        let memory = delay.checked_mul(channels).ok_or_else(|| {
            ProcessingError::invalid("sampling_hz", format!("a delay of {delay} frames over {channels} channels"))
        })?;

        Ok(Self {
            sampling_hz,
            interference_hz,
            alpha,
            delay,
            channels,
            raw_memory: vec![0.0; memory],
            filtered_memory: vec![0.0; memory],
        })
    }

    /// Mains filter for the armband: 200 Hz sampling, 50 Hz hum, α = 0.75.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] if `channels` is zero.
    pub fn mains(channels: usize) -> ProcessingResult<Self> {
        Self::new(ARMBAND_SAMPLING_HZ, MAINS_HZ, DEFAULT_COMB_ALPHA, channels)
    }

    /// Delay in frames
    #[inline]
    #[must_use]
    pub const fn delay(&self) -> usize {
        self.delay
    }

    /// Feedback coefficient α
    #[inline]
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Sampling frequency in Hz
    #[inline]
    #[must_use]
    pub const fn sampling_hz(&self) -> f64 {
        self.sampling_hz
    }

    /// Rejected interference frequency in Hz
    #[inline]
    #[must_use]
    pub const fn interference_hz(&self) -> f64 {
        self.interference_hz
    }

    /// Filter a batch of frames, returning a freshly allocated window.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::ChannelCountMismatch`] if the batch width
    /// differs from the configured channel count.
    pub fn filter(&mut self, data: &Window) -> ProcessingResult<Window> {
        if data.channels() != self.channels {
            return Err(ProcessingError::ChannelCountMismatch { expected: self.channels, got: data.channels() });
        }
        let (frames, channels, delay) = (data.frames(), self.channels, self.delay);
        let mut filtered = Window::zeros(frames, channels);

        for t in 0..frames {
            for c in 0..channels {
                let (prev_raw, prev_filtered) = if t >= delay {
                    (data.get(t - delay, c), filtered.get(t - delay, c))
                } else {
                    (self.raw_memory[t * channels + c], self.filtered_memory[t * channels + c])
                };
                filtered.set(t, c, data.get(t, c) - prev_raw + self.alpha * prev_filtered);
            }
        }

        self.remember(data, &filtered);
        Ok(filtered)
    }

    /// Zero both memories to start a fresh stream
    pub fn reset(&mut self) {
        self.raw_memory.iter_mut().for_each(|v| *v = 0.0);
        self.filtered_memory.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Shift the last `delay` frames of the stream into memory.
    ///
    /// Batches shorter than `delay` keep the older part of the memory.
    fn remember(&mut self, data: &Window, filtered: &Window) {
        let (frames, channels, delay) = (data.frames(), self.channels, self.delay);
        if frames >= delay {
            let start = (frames - delay) * channels;
            self.raw_memory.copy_from_slice(&data.as_slice()[start..]);
            self.filtered_memory.copy_from_slice(&filtered.as_slice()[start..]);
        } else {
            let keep = (delay - frames) * channels;
            self.raw_memory.copy_within(frames * channels.., 0);
            self.filtered_memory.copy_within(frames * channels.., 0);
            self.raw_memory[keep..].copy_from_slice(data.as_slice());
            self.filtered_memory[keep..].copy_from_slice(filtered.as_slice());
        }
    }
}

// ============================================================================
// RMS Envelope
// ============================================================================

/// Sliding root-mean-square deviation over the last `size` values.
///
/// The ring starts zero-filled.
#[derive(Clone, Debug)]
pub struct RmsFilter {
    ring: Vec<f64>,
    next: usize,
}

impl RmsFilter {
    /// Create a filter over `size` values (at least one)
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { ring: vec![0.0; size.max(1)], next: 0 }
    }

    /// Push a value, evicting the oldest
    pub fn push(&mut self, value: f64) {
        self.ring[self.next] = value;
        self.next = (self.next + 1) % self.ring.len();
    }

    /// Population standard deviation of the ring contents
    #[must_use]
    pub fn get(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n = self.ring.len() as f64;
        let mean = self.ring.iter().sum::<f64>() / n;
        let ss: f64 = self.ring.iter().map(|v| (v - mean) * (v - mean)).sum();
        (ss / n).sqrt()
    }
}

/// One [`RmsFilter`] per channel.
#[derive(Clone, Debug)]
pub struct ChannelEnvelope {
    filters: Vec<RmsFilter>,
}

impl ChannelEnvelope {
    /// Create an envelope over `size` frames for `channels` channels
    #[must_use]
    pub fn new(channels: usize, size: usize) -> Self {
        Self { filters: (0..channels).map(|_| RmsFilter::new(size)).collect() }
    }

    /// Push one frame
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::ChannelCountMismatch`] if the frame width
    /// differs from the channel count.
    pub fn push_frame(&mut self, frame: &[f64]) -> ProcessingResult<()> {
        if frame.len() != self.filters.len() {
            return Err(ProcessingError::ChannelCountMismatch { expected: self.filters.len(), got: frame.len() });
        }
        for (filter, &v) in self.filters.iter_mut().zip(frame) {
            filter.push(v);
        }
        Ok(())
    }

    /// Current activation per channel
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.filters.iter().map(RmsFilter::get).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: usize, phase: usize) -> Window {
        let rows: Vec<Vec<f64>> = (0..frames)
            .map(|t| {
                (0..channels)
                    .map(|c| (((t + phase) as f64) * 0.7 + c as f64).sin() * 10.0 + ((t + phase) % 4) as f64)
                    .collect()
            })
            .collect();
        Window::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_delay_and_nyquist() {
        let filter = CombFilter::mains(8).unwrap();
        assert_eq!(filter.delay(), 4);

        let err = CombFilter::new(100.0, 50.0, 0.75, 8).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidParameter { parameter: "interference_hz", .. }));
        assert!(CombFilter::new(200.0, 0.0, 0.75, 8).is_err());
    }

    #[test]
    fn test_unrepresentable_delay_is_rejected() {
        let err = CombFilter::new(1e300, 50.0, 0.75, 8).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidParameter { parameter: "sampling_hz", .. }));

        let err = CombFilter::new(f64::INFINITY, 50.0, 0.75, 8).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidParameter { parameter: "sampling_hz", .. }));
    }

    #[test]
    fn test_first_batch_against_zero_memory() {
        let mut filter = CombFilter::new(200.0, 50.0, 0.5, 1).unwrap();
        let data = Window::from_rows(&[[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]]).unwrap();
        let y = filter.filter(&data).unwrap();
        // First `delay` frames see zero history
        assert_eq!(&y.as_slice()[..4], &[1.0, 2.0, 3.0, 4.0]);
        // y[4] = 5 - 1 + 0.5 * 1, y[5] = 6 - 2 + 0.5 * 2
        assert!((y.get(4, 0) - 4.5).abs() < 1e-12);
        assert!((y.get(5, 0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_batches_continue_the_stream() {
        let a = ramp(12, 3, 0);
        let b = ramp(9, 3, 12);

        let mut split = CombFilter::mains(3).unwrap();
        let ya = split.filter(&a).unwrap();
        let yb = split.filter(&b).unwrap();

        let mut whole = CombFilter::mains(3).unwrap();
        let yab = whole.filter(&a.concat(&b).unwrap()).unwrap();

        let joined = ya.concat(&yb).unwrap();
        for (x, y) in joined.as_slice().iter().zip(yab.as_slice()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_short_batches_continue_the_stream() {
        let stream = ramp(10, 2, 3);
        let mut split = CombFilter::mains(2).unwrap();
        let mut pieces = Vec::new();
        for (lo, hi) in [(0, 2), (2, 3), (3, 7), (7, 10)] {
            pieces.push(split.filter(&stream.slice_frames(lo, hi)).unwrap());
        }
        let mut whole = CombFilter::mains(2).unwrap();
        let expected = whole.filter(&stream).unwrap();

        let mut joined = pieces[0].clone();
        for piece in &pieces[1..] {
            joined = joined.concat(piece).unwrap();
        }
        for (x, y) in joined.as_slice().iter().zip(expected.as_slice()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reset_starts_a_fresh_stream() {
        let data = ramp(8, 2, 0);
        let mut filter = CombFilter::mains(2).unwrap();
        let first = filter.filter(&data).unwrap();
        let continued = filter.filter(&data).unwrap();
        assert_ne!(first, continued);

        filter.reset();
        assert_eq!(filter.filter(&data).unwrap(), first);
    }

    #[test]
    fn test_input_is_left_untouched() {
        let data = ramp(8, 2, 0);
        let copy = data.clone();
        let mut filter = CombFilter::mains(2).unwrap();
        let _ = filter.filter(&data).unwrap();
        assert_eq!(data, copy);
    }

    #[test]
    fn test_channel_mismatch() {
        let mut filter = CombFilter::mains(8).unwrap();
        let err = filter.filter(&Window::zeros(10, 4)).unwrap_err();
        assert_eq!(err, ProcessingError::ChannelCountMismatch { expected: 8, got: 4 });
    }

    #[test]
    fn test_removes_mains_tone_in_steady_state() {
        // A 50 Hz tone sampled at 200 Hz repeats every 4 frames, so
        // x[t] - x[t - 4] cancels it and the feedback decays geometrically.
        let tone: Vec<[f64; 1]> = (0..400)
            .map(|t| [(2.0 * std::f64::consts::PI * 50.0 * t as f64 / 200.0 + 0.3).sin()])
            .collect();
        let mut filter = CombFilter::mains(1).unwrap();
        let y = filter.filter(&Window::from_rows(&tone).unwrap()).unwrap();
        assert!(y.get(399, 0).abs() < 1e-6);
    }

    #[test]
    fn test_rms_filter() {
        let mut rms = RmsFilter::new(4);
        assert_eq!(rms.get(), 0.0);
        for v in [1.0, -1.0, 1.0, -1.0] {
            rms.push(v);
        }
        assert!((rms.get() - 1.0).abs() < 1e-12);
        // Ring wraps around
        for _ in 0..4 {
            rms.push(3.0);
        }
        assert!(rms.get().abs() < 1e-12);
    }

    #[test]
    fn test_channel_envelope() {
        let mut env = ChannelEnvelope::new(2, 2);
        env.push_frame(&[0.0, 5.0]).unwrap();
        env.push_frame(&[2.0, 5.0]).unwrap();
        let values = env.values();
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert!(values[1].abs() < 1e-12);
        assert!(env.push_frame(&[1.0]).is_err());
    }
}
