//! Prosthex Native - Host EMG decoding for prosthesis control
//!
//! This crate turns a stream of armband EMG frames into control signals:
//! - Windowing with carried context and periodic-interference removal
//! - Per-channel variance features
//! - Echo state network and GMLVQ inference
//! - Model document loading
//! - Controller variants and runtime-selectable ingestion
//!
//! # Modules
//!
//! - [`processing`]: Window buffer and filters
//! - [`ml`]: Feature extraction and model inference
//! - [`model`]: Loading trained models from JSON documents
//! - [`decoder`]: Decode pipeline, controllers and ingestion

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod decoder;
pub mod ml;
pub mod model;
pub mod processing;

// Re-export key types
pub use decoder::{Controller, ControllerKind, DecodePipeline, DecoderConfig, DecoderError, Ingestion, Settings};
pub use ml::{FeatureExtractor, PrototypeClassifier, ReservoirNetwork};
pub use model::{load_gmlvq, load_reservoir, ModelError};
pub use processing::{CombFilter, StreamingWindowBuffer};
