//! Core data types for EMG prosthesis control
//!
//! This module defines:
//! - [`Frame`]: one sampling tick of raw channel readings
//! - [`Window`]: a frames × channels block handed to filtering and features
//! - [`Pose`]: discrete gestures reported by the armband firmware
//! - [`Orientation`]: armband orientation as Euler angles

use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, ProcessingResult};

/// Number of EMG channels on the standard eight-electrode armband
pub const ARMBAND_CHANNELS: usize = 8;

/// Sampling rate of the armband EMG stream in Hz
pub const ARMBAND_SAMPLING_HZ: f64 = 200.0;

// ============================================================================
// Frame
// ============================================================================

/// A single sampling tick: one reading per channel.
///
/// Frames are immutable once captured. Raw armband readings arrive as
/// signed bytes and are widened to `f64` on capture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame {
    values: Vec<f64>,
}

impl Frame {
    /// Capture a frame from channel values
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Capture a frame from raw 8-bit armband readings
    #[must_use]
    pub fn from_raw(raw: &[i8]) -> Self {
        Self { values: raw.iter().map(|&v| f64::from(v)).collect() }
    }

    /// Number of channels in this frame
    #[inline]
    #[must_use]
    pub fn channels(&self) -> usize {
        self.values.len()
    }

    /// Channel values in channel order
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

impl From<Vec<f64>> for Frame {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl AsRef<[f64]> for Frame {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

// ============================================================================
// Window
// ============================================================================

/// A block of `frames × channels` samples stored row-major.
///
/// Row `t` holds the `channels` readings of frame `t`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WindowParts")]
pub struct Window {
    frames: usize,
    channels: usize,
    data: Vec<f64>,
}

/// Unchecked serialized form of a [`Window`]
#[derive(Deserialize)]
struct WindowParts {
    frames: usize,
    channels: usize,
    data: Vec<f64>,
}

impl TryFrom<WindowParts> for Window {
    type Error = ProcessingError;

    fn try_from(parts: WindowParts) -> ProcessingResult<Self> {
        Self::from_flat(parts.frames, parts.channels, parts.data)
    }
}

impl Window {
    /// Create a zero-filled window
    #[must_use]
    pub fn zeros(frames: usize, channels: usize) -> Self {
        Self { frames, channels, data: vec![0.0; frames * channels] }
    }

    /// Create a window from row-major data
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::DimensionMismatch`] if `data.len()` is not
    /// `frames * channels`, or [`ProcessingError::InvalidParameter`] if that
    /// product overflows.
    pub fn from_flat(frames: usize, channels: usize, data: Vec<f64>) -> ProcessingResult<Self> {
        let expected = frames
            .checked_mul(channels)
            .ok_or_else(|| ProcessingError::invalid("frames", format!("{frames} x {channels} samples")))?;
        if data.len() != expected {
            return Err(ProcessingError::mismatch("window data length", expected, data.len()));
        }
        Ok(Self { frames, channels, data })
    }

    /// Create a window from a list of equally long rows
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::ChannelCountMismatch`] if any row differs in
    /// length from the first.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> ProcessingResult<Self> {
        let channels = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * channels);
        for row in rows {
            let row = row.as_ref();
            if row.len() != channels {
                return Err(ProcessingError::ChannelCountMismatch { expected: channels, got: row.len() });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { frames: rows.len(), channels, data })
    }

    /// Number of frames (rows)
    #[inline]
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// Number of channels (columns)
    #[inline]
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// True when the window holds no frames
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Sample of channel `c` at frame `t`
    ///
    /// # Panics
    ///
    /// Panics if `t` or `c` is out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, t: usize, c: usize) -> f64 {
        assert!(c < self.channels, "channel {c} out of range");
        self.data[t * self.channels + c]
    }

    /// Overwrite the sample of channel `c` at frame `t`
    ///
    /// # Panics
    ///
    /// Panics if `t` or `c` is out of range.
    #[inline]
    pub fn set(&mut self, t: usize, c: usize, value: f64) {
        assert!(c < self.channels, "channel {c} out of range");
        self.data[t * self.channels + c] = value;
    }

    /// Readings of frame `t`
    #[inline]
    #[must_use]
    pub fn row(&self, t: usize) -> &[f64] {
        &self.data[t * self.channels..(t + 1) * self.channels]
    }

    /// Iterate over the frames of this window
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.frames).map(move |t| self.row(t))
    }

    /// Iterate over one channel across all frames in `[lo, hi)`
    pub fn column_range(&self, c: usize, lo: usize, hi: usize) -> impl Iterator<Item = f64> + '_ {
        (lo..hi).map(move |t| self.data[t * self.channels + c])
    }

    /// Copy frames `[lo, hi)` into a new window
    #[must_use]
    pub fn slice_frames(&self, lo: usize, hi: usize) -> Self {
        Self {
            frames: hi - lo,
            channels: self.channels,
            data: self.data[lo * self.channels..hi * self.channels].to_vec(),
        }
    }

    /// Append the frames of `other` below this window
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::ChannelCountMismatch`] if the channel counts
    /// differ.
    pub fn concat(&self, other: &Self) -> ProcessingResult<Self> {
        if self.channels != other.channels {
            return Err(ProcessingError::ChannelCountMismatch { expected: self.channels, got: other.channels });
        }
        let mut data = Vec::with_capacity(self.data.len() + other.data.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);
        Ok(Self { frames: self.frames + other.frames, channels: self.channels, data })
    }

    /// Row-major view of the underlying samples
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

// ============================================================================
// Armband Gestures and Orientation
// ============================================================================

/// Discrete gesture recognized by the armband firmware.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pose {
    /// Relaxed hand
    #[default]
    Rest,
    /// Closed fist
    Fist,
    /// Wrist flexed towards the body
    WaveIn,
    /// Wrist extended away from the body
    WaveOut,
    /// Fingers spread open
    FingersSpread,
    /// Two quick taps of thumb and middle finger
    DoubleTap,
    /// Firmware could not classify the gesture
    Unknown,
}

/// Armband orientation as Euler angles in degrees.
///
/// `pitch` rotates about the lateral axis (up/down), `yaw` about the vertical
/// axis (left/right) and `roll` about the forearm axis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Rotation about the lateral axis in degrees
    pub pitch: f64,
    /// Rotation about the vertical axis in degrees
    pub yaw: f64,
    /// Rotation about the forearm axis in degrees
    pub roll: f64,
}

impl Orientation {
    /// Create an orientation from Euler angles in degrees
    #[must_use]
    pub const fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Component-wise difference `self - reference`
    #[must_use]
    pub fn relative_to(&self, reference: &Self) -> Self {
        Self {
            pitch: self.pitch - reference.pitch,
            yaw: self.yaw - reference.yaw,
            roll: self.roll - reference.roll,
        }
    }
}

/// Wrap an arbitrary angle in degrees into `[-180, 180]`.
#[must_use]
pub fn crop_angle(angle: f64) -> f64 {
    let angle = angle % 360.0;
    if angle > 180.0 {
        angle - 360.0
    } else if angle < -180.0 {
        angle + 360.0
    } else {
        angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_raw() {
        let frame = Frame::from_raw(&[-128, 0, 5, 127]);
        assert_eq!(frame.channels(), 4);
        assert_eq!(frame.as_slice(), &[-128.0, 0.0, 5.0, 127.0]);
    }

    #[test]
    fn test_window_rows_and_columns() {
        let window = Window::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(window.frames(), 3);
        assert_eq!(window.channels(), 2);
        assert_eq!(window.row(1), &[3.0, 4.0]);
        assert_eq!(window.get(2, 1), 6.0);
        let col: Vec<f64> = window.column_range(0, 1, 3).collect();
        assert_eq!(col, vec![3.0, 5.0]);
    }

    #[test]
    fn test_window_rejects_ragged_rows() {
        let result = Window::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(ProcessingError::ChannelCountMismatch { expected: 2, got: 1 })));
    }

    #[test]
    fn test_window_concat_and_slice() {
        let a = Window::from_rows(&[vec![1.0], vec![2.0]]).unwrap();
        let b = Window::from_rows(&[vec![3.0]]).unwrap();
        let ab = a.concat(&b).unwrap();
        assert_eq!(ab.as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(ab.slice_frames(1, 3).as_slice(), &[2.0, 3.0]);
    }

    #[test]
    fn test_window_deserialization_checks_shape() {
        let json = r#"{"frames": 2, "channels": 2, "data": [1.0, 2.0, 3.0, 4.0]}"#;
        let window: Window = serde_json::from_str(json).unwrap();
        assert_eq!(window.row(1), &[3.0, 4.0]);

        let short = serde_json::from_str::<Window>(r#"{"frames": 3, "channels": 2, "data": [1.0, 2.0]}"#);
        assert!(short.unwrap_err().to_string().contains("window data length"));
    }

    #[test]
    fn test_crop_angle() {
        assert!((crop_angle(350.0) - (-10.0)).abs() < 1e-12);
        assert!((crop_angle(-190.0) - 170.0).abs() < 1e-12);
        assert!((crop_angle(45.0) - 45.0).abs() < 1e-12);
        assert!((crop_angle(720.0 + 30.0) - 30.0).abs() < 1e-12);
    }
}
