//! Trained model documents and loading
//!
//! - [`document`]: serde mirrors of the JSON model files
//! - [`loader`]: directory conventions and model assembly
//! - [`error`]: loading errors

pub mod document;
pub mod error;
pub mod loader;

pub use error::{ModelError, ModelResult};
pub use loader::{load_gmlvq, load_reservoir, load_transfer, GmlvqModels};
