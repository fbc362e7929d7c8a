//! Prosthex Core - shared types and primitives for EMG prosthesis decoding
//!
//! This crate provides the foundational types, the error taxonomy and the
//! sparse linear algebra used by the Prosthex decoding pipeline. It performs
//! no I/O; model loading and the streaming stages live in `prosthex-native`.
//!
//! # Modules
//!
//! - [`types`]: Frames, windows, armband poses and orientation
//! - [`error`]: Error types for construction and inference
//! - [`math`]: Compressed sparse row weight matrices
//!
//! # Example
//!
//! ```rust
//! use prosthex_core::math::{SparseEntry, SparseWeightMatrix};
//!
//! let w = SparseWeightMatrix::new(vec![SparseEntry::new(0, 1, 0.5)], 2, 2).unwrap();
//! assert_eq!(w.apply(&[0.0, 4.0]).unwrap(), vec![2.0, 0.0]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod math;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ProcessingError, ProcessingResult};
pub use math::{SparseEntry, SparseWeightMatrix};
pub use types::{crop_angle, Frame, Orientation, Pose, Window, ARMBAND_CHANNELS, ARMBAND_SAMPLING_HZ};
