//! Streaming window buffer
//!
//! Accumulates raw frames into fixed-size windows of
//! `packet_size + 2 × overlap` frames. After a window is retrieved, its last
//! `overlap` frames are carried over as the first frames of the next window,
//! so consecutive windows share context at their edges.

use prosthex_core::error::{ProcessingError, ProcessingResult};
use prosthex_core::types::Window;

/// Frame accumulator with sliding-window continuity.
///
/// The buffer is either *filling* (`len() < capacity()`) or *full*. Storing
/// into a full buffer is a scheduling bug upstream and is rejected.
#[derive(Clone, Debug)]
pub struct StreamingWindowBuffer {
    packet_size: usize,
    overlap: usize,
    channels: usize,
    /// Row-major `capacity × channels`
    data: Vec<f64>,
    /// Number of frames currently stored
    filled: usize,
}

impl StreamingWindowBuffer {
    /// Create an empty buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] if `packet_size` or
    /// `channels` is zero, or if the window size overflows.
    pub fn new(packet_size: usize, overlap: usize, channels: usize) -> ProcessingResult<Self> {
        if packet_size == 0 {
            return Err(ProcessingError::invalid("packet_size", "must be at least one frame"));
        }
        if channels == 0 {
            return Err(ProcessingError::invalid("channels", "must be at least one channel"));
        }
        let len = overlap
            .checked_mul(2)
            .and_then(|context| context.checked_add(packet_size))
            .and_then(|capacity| capacity.checked_mul(channels))
            .ok_or_else(|| {
                ProcessingError::invalid("overlap", format!("{packet_size} + 2 x {overlap} frames cannot be stored"))
            })?;
        Ok(Self { packet_size, overlap, channels, data: vec![0.0; len], filled: 0 })
    }

    /// Buffer used by the armband decoders: 8 new frames, 8 frames of context
    /// on each side, 8 channels.
    #[must_use]
    pub fn armband() -> Self {
        Self {
            packet_size: 8,
            overlap: 8,
            channels: 8,
            data: vec![0.0; 24 * 8],
            filled: 0,
        }
    }

    /// Frames per retrieved window
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.packet_size + 2 * self.overlap
    }

    /// Frames of context shared between consecutive windows
    #[inline]
    #[must_use]
    pub const fn overlap(&self) -> usize {
        self.overlap
    }

    /// Configured packet size
    #[inline]
    #[must_use]
    pub const fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Configured channel count
    #[inline]
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Frames currently stored
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.filled
    }

    /// True when no frame is stored
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// True when a window is ready to be retrieved
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.filled == self.capacity()
    }

    /// Append a frame. Returns `true` when the buffer became full.
    ///
    /// # Errors
    ///
    /// - [`ProcessingError::BufferOverflow`] if the buffer is already full
    /// - [`ProcessingError::ChannelCountMismatch`] if the frame width differs
    ///   from the configured channel count
    pub fn store(&mut self, frame: &[f64]) -> ProcessingResult<bool> {
        if self.is_full() {
            return Err(ProcessingError::BufferOverflow { capacity: self.capacity() });
        }
        if frame.len() != self.channels {
            return Err(ProcessingError::ChannelCountMismatch { expected: self.channels, got: frame.len() });
        }
        let start = self.filled * self.channels;
        self.data[start..start + self.channels].copy_from_slice(frame);
        self.filled += 1;
        Ok(self.is_full())
    }

    /// Take the completed window, or `None` while the buffer is still filling.
    ///
    /// The returned window is a copy. The buffer restarts with its trailing
    /// `overlap` frames seeded at the front.
    pub fn retrieve(&mut self) -> Option<Window> {
        if !self.is_full() {
            return None;
        }
        let window = Window::from_flat(self.capacity(), self.channels, self.data.clone()).ok()?;

        let tail_start = (self.capacity() - self.overlap) * self.channels;
        self.data.copy_within(tail_start.., 0);
        self.filled = self.overlap;

        Some(window)
    }

    /// Drop all stored frames, including carried-over context
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
        self.filled = 0;
    }
}
