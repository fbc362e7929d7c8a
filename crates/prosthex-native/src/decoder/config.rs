//! Decoder configuration
//!
//! Pipeline parameters, controller tuning and the persisted settings
//! document that selects the active controller.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use prosthex_core::types::{ARMBAND_CHANNELS, ARMBAND_SAMPLING_HZ};

use crate::ml::features::FeatureKind;
use crate::model::error::ModelResult;
use crate::model::loader::read_document;
use crate::processing::filters::{DEFAULT_COMB_ALPHA, MAINS_HZ};

/// Streaming pipeline configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// EMG channels per frame
    pub channels: usize,
    /// New frames per window
    pub packet_size: usize,
    /// Context frames on each side of a window
    pub overlap: usize,
    /// Frame rate (Hz)
    pub sampling_hz: f64,
    /// Interference frequency removed by the comb filter (Hz)
    pub interference_hz: f64,
    /// Comb filter feedback coefficient
    pub comb_alpha: f64,
    /// Per-channel features, in vector order
    pub features: Vec<FeatureKind>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            channels: ARMBAND_CHANNELS,
            packet_size: 8,
            overlap: 8,
            sampling_hz: ARMBAND_SAMPLING_HZ,
            interference_hz: MAINS_HZ,
            comb_alpha: DEFAULT_COMB_ALPHA,
            features: vec![FeatureKind::LogVariance],
        }
    }
}

impl DecoderConfig {
    /// Frames per window
    #[must_use]
    pub const fn window_frames(&self) -> usize {
        self.packet_size + 2 * self.overlap
    }

    /// Length of the feature vector produced per window
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len() * self.channels
    }
}

/// Velocity smoothing for the GMLVQ controller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmlvqControlConfig {
    /// Weight of the newest label in the exponential smoothing
    pub dt: f64,
    /// Velocity reached by a sustained label of ±1
    pub gain: f64,
    /// Rotation is suppressed while opening unless its confidence reaches this
    pub rotation_confidence_threshold: f64,
}

impl Default for GmlvqControlConfig {
    fn default() -> Self {
        Self { dt: 0.45, gain: 0.8, rotation_confidence_threshold: 0.5 }
    }
}

/// Mapping from armband orientation to a position on the play area
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Yaw reaching either horizontal edge (degrees)
    pub max_horizontal_deg: f64,
    /// Upward pitch reaching the top edge (degrees)
    pub max_up_deg: f64,
    /// Downward pitch reaching the bottom edge (degrees)
    pub max_down_deg: f64,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self { max_horizontal_deg: 45.0, max_up_deg: 55.0, max_down_deg: 5.0 }
    }
}

/// Manual control speed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Position change per second while an arrow key is held
    pub velocity: f64,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self { velocity: 0.5 }
    }
}

// ============================================================================
// Settings document
// ============================================================================

/// Configuration path stored for one controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsEntry {
    /// Display name of the controller
    pub controller_name: String,
    /// Model directory handed to the controller
    pub configuration: String,
}

/// Persisted controller selection
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Name of the active controller
    pub current_controller: String,
    /// Per-controller configuration
    #[serde(default)]
    pub settings: Vec<SettingsEntry>,
    /// Pipeline overrides
    #[serde(default)]
    pub decoder: DecoderConfig,
    /// GMLVQ smoothing overrides
    #[serde(default)]
    pub gmlvq: GmlvqControlConfig,
    /// Orientation mapping overrides
    #[serde(default)]
    pub orientation: OrientationConfig,
    /// Manual control overrides
    #[serde(default)]
    pub keyboard: KeyboardConfig,
}

impl Settings {
    /// Read a settings file.
    ///
    /// # Errors
    ///
    /// Same as [`read_document`].
    pub fn load(path: &Path) -> ModelResult<Self> {
        read_document(path)
    }

    /// Entry for `controller_name`, if any
    #[must_use]
    pub fn find(&self, controller_name: &str) -> Option<&SettingsEntry> {
        self.settings.iter().find(|s| s.controller_name == controller_name)
    }

    /// Configuration path stored for `controller_name`
    #[must_use]
    pub fn configuration_for(&self, controller_name: &str) -> Option<PathBuf> {
        self.find(controller_name).map(|s| PathBuf::from(&s.configuration))
    }

    /// Store `configuration` for `controller_name`, replacing an existing entry
    pub fn set_configuration(&mut self, controller_name: &str, configuration: impl Into<String>) {
        let configuration = configuration.into();
        match self.settings.iter_mut().find(|s| s.controller_name == controller_name) {
            Some(entry) => entry.configuration = configuration,
            None => self
                .settings
                .push(SettingsEntry { controller_name: controller_name.to_string(), configuration }),
        }
    }
}
