//! Streaming signal processing
//!
//! This module provides the stages applied to raw EMG frames before
//! inference:
//! - [`buffer`]: windowing with overlap between consecutive windows
//! - [`filters`]: comb filtering of mains interference and RMS envelopes

pub mod buffer;
pub mod filters;

pub use buffer::StreamingWindowBuffer;
pub use filters::{ChannelEnvelope, CombFilter, RmsFilter};
