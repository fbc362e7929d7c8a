//! Inference for EMG intent decoding
//!
//! Feature extraction followed by one of two pre-trained decision engines:
//! an echo state network ([`esn`]) producing continuous outputs, or a
//! prototype classifier ([`gmlvq`]) producing discrete labels. Training
//! happens offline; models are loaded through [`crate::model`].

pub mod esn;
pub mod features;
pub mod gmlvq;

pub use esn::{ReservoirNetwork, Scaling};
pub use features::{FeatureExtractor, FeatureKind};
pub use gmlvq::PrototypeClassifier;
