//! Streaming EMG decoding and prosthesis control
//!
//! - [`pipeline`]: frames to feature vectors (window buffer, comb filter,
//!   feature extraction)
//! - [`controller`]: the closed set of controllers producing velocities and
//!   a position
//! - [`ingest`]: polled or event-driven delivery of armband events
//! - [`config`]: pipeline tuning and the persisted settings document

pub mod config;
pub mod controller;
pub mod error;
pub mod ingest;
pub mod orientation;
pub mod pipeline;

#[cfg(test)]
mod tests;

pub use config::{DecoderConfig, GmlvqControlConfig, KeyboardConfig, OrientationConfig, Settings};
pub use controller::{
    ConfigResult, Controller, ControllerKind, EchoStateController, GmlvqController, KeyState, KeyboardController,
    PoseRuleController,
};
pub use error::{DecoderError, DecoderResult};
pub use ingest::{shared, ArmbandEvent, ControlSignal, IngestStats, Ingestion, IngestionMode, SharedDecoder};
pub use orientation::OrientationTracker;
pub use pipeline::DecodePipeline;
