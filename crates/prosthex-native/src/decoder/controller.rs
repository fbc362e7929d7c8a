//! Prosthesis controllers
//!
//! A controller turns operator input into three control signals:
//!
//! - opening velocity in `[-1, 1]` (1 opens at full speed, -1 closes)
//! - rotation velocity in `[-1, 1]` (1 turns clockwise, -1 counter-clockwise)
//! - a position in `[0, 1]²` on the play area
//!
//! The set of controllers is closed: two model-backed EMG decoders, a rule
//! based mapping of armband gestures, and manual keyboard control.

use std::fmt;
use std::path::{Path, PathBuf};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use prosthex_core::types::{Orientation, Pose};

use super::config::{DecoderConfig, GmlvqControlConfig, KeyboardConfig, OrientationConfig, Settings};
use super::error::{DecoderError, DecoderResult};
use super::orientation::OrientationTracker;
use super::pipeline::DecodePipeline;
use crate::ml::esn::ReservoirNetwork;
use crate::model::error::{ModelError, ModelResult};
use crate::model::loader::{load_gmlvq, load_reservoir, GmlvqModels};

/// Outcome of [`Controller::set_configuration`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigResult {
    /// Configuration loaded; the controller is enabled
    Ok,
    /// Configuration rejected; the controller stays disabled
    Error(String),
}

impl ConfigResult {
    /// True for a rejected configuration
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Error message, empty on success
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Ok => "",
            Self::Error(msg) => msg,
        }
    }
}

impl From<ModelResult<()>> for ConfigResult {
    fn from(result: ModelResult<()>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(e) => Self::Error(e.to_string()),
        }
    }
}

impl fmt::Display for ConfigResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Controller selection
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    /// Echo state network over EMG features
    EchoState,
    /// Two GMLVQ models over EMG features
    Gmlvq,
    /// Armband gesture rules
    PoseRule,
    /// Manual keyboard control
    Keyboard,
}

impl ControllerKind {
    /// All kinds in menu order
    pub const ALL: [Self; 4] = [Self::EchoState, Self::Gmlvq, Self::PoseRule, Self::Keyboard];

    /// Display name, also the key in the settings document
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::EchoState => "Echo State Network",
            Self::Gmlvq => "GMLVQ Model",
            Self::PoseRule => "Default Pose",
            Self::Keyboard => "Keyboard",
        }
    }

    /// Kind with display name `name`
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// Keys relevant to manual control, sampled once per tick
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    /// Open
    pub w: bool,
    /// Close
    pub s: bool,
    /// Rotate clockwise
    pub a: bool,
    /// Rotate counter-clockwise
    pub d: bool,
    /// Move left
    pub left: bool,
    /// Move right
    pub right: bool,
    /// Move up
    pub up: bool,
    /// Move down
    pub down: bool,
}

// ============================================================================
// Variants
// ============================================================================

/// EMG decoding with an echo state network.
///
/// Velocities are the first two normalized network outputs after the most
/// recent window.
#[derive(Clone, Debug)]
pub struct EchoStateController {
    pipeline: DecodePipeline,
    esn: Option<ReservoirNetwork>,
    orientation: OrientationTracker,
    opening: f64,
    rotation: f64,
}

impl EchoStateController {
    fn configure(&mut self, dir: &Path) -> ModelResult<()> {
        let esn = load_reservoir(dir)?;
        let features = self.pipeline.feature_count();
        if esn.num_inputs() != features {
            return Err(ModelError::format(format!(
                "network expects {} inputs but the decoder produces {features} features",
                esn.num_inputs()
            )));
        }
        if esn.num_outputs() < 2 {
            return Err(ModelError::format(format!(
                "network has {} outputs, opening and rotation need 2",
                esn.num_outputs()
            )));
        }
        self.esn = Some(esn);
        self.pipeline.reset();
        (self.opening, self.rotation) = (0.0, 0.0);
        Ok(())
    }

    fn on_emg(&mut self, frame: &[f64]) -> DecoderResult<bool> {
        let Some(esn) = self.esn.as_mut() else {
            return Err(DecoderError::NotConfigured { controller: ControllerKind::EchoState.name() });
        };
        let Some(features) = self.pipeline.push(frame)? else {
            return Ok(false);
        };
        if let Err(e) = esn.update(&features) {
            return Err(self.pipeline.halt(e));
        }
        let output = esn.normalized_output();
        self.opening = output[0];
        self.rotation = output[1];
        Ok(true)
    }

    /// Loaded network
    #[must_use]
    pub const fn network(&self) -> Option<&ReservoirNetwork> {
        self.esn.as_ref()
    }
}

/// EMG decoding with one GMLVQ model for opening and one for rotation.
///
/// Labels in `{-1, 0, 1}` are smoothed into velocities. While the hand
/// opens or closes, an uncertain rotation label is suppressed.
#[derive(Clone, Debug)]
pub struct GmlvqController {
    pipeline: DecodePipeline,
    models: Option<GmlvqModels>,
    control: GmlvqControlConfig,
    orientation: OrientationTracker,
    opening: f64,
    rotation: f64,
}

impl GmlvqController {
    fn configure(&mut self, dir: &Path) -> ModelResult<()> {
        let models = load_gmlvq(dir)?;
        if models.models.len() != 2 {
            return Err(ModelError::format(format!("expected two GMLVQ models, found {}", models.models.len())));
        }
        let features = self.pipeline.feature_count();
        if models.input_dimension() != Some(features) {
            return Err(ModelError::format(format!(
                "models expect {} features but the decoder produces {features}",
                models.input_dimension().unwrap_or_default()
            )));
        }
        if models.models[0].dimension() != models.models[1].dimension() {
            return Err(ModelError::format("opening and rotation models differ in dimension"));
        }
        self.models = Some(models);
        self.pipeline.reset();
        (self.opening, self.rotation) = (0.0, 0.0);
        Ok(())
    }

    fn on_emg(&mut self, frame: &[f64]) -> DecoderResult<bool> {
        let Some(models) = self.models.as_ref() else {
            return Err(DecoderError::NotConfigured { controller: ControllerKind::Gmlvq.name() });
        };
        let Some(mut features) = self.pipeline.push(frame)? else {
            return Ok(false);
        };
        if let Some(t) = &models.transfer {
            let mapped = t * DVector::from_vec(features);
            features = mapped.iter().copied().collect();
        }

        let labels = models.models[0]
            .confidence(&features)
            .and_then(|open| Ok((open, models.models[1].confidence(&features)?)));
        let ((open_label, _), (mut rotation_label, rotation_confidence)) = match labels {
            Ok(labels) => labels,
            Err(e) => return Err(self.pipeline.halt(e)),
        };
        if open_label != 0 && rotation_confidence < self.control.rotation_confidence_threshold {
            rotation_label = 0;
        }

        let GmlvqControlConfig { dt, gain, .. } = self.control;
        self.opening = dt * gain * f64::from(open_label) + (1.0 - dt) * self.opening;
        self.rotation = dt * gain * f64::from(rotation_label) + (1.0 - dt) * self.rotation;
        Ok(true)
    }

    /// Loaded models
    #[must_use]
    pub const fn models(&self) -> Option<&GmlvqModels> {
        self.models.as_ref()
    }
}

/// Fixed mapping from armband gestures to velocities
#[derive(Clone, Debug, Default)]
pub struct PoseRuleController {
    pose: Pose,
    orientation: OrientationTracker,
}

impl PoseRuleController {
    const fn opening(&self) -> f64 {
        match self.pose {
            Pose::FingersSpread => 1.0,
            Pose::Fist => -1.0,
            _ => 0.0,
        }
    }

    const fn rotation(&self) -> f64 {
        match self.pose {
            Pose::WaveOut => 1.0,
            Pose::WaveIn => -1.0,
            _ => 0.0,
        }
    }
}

/// Manual control
#[derive(Clone, Debug)]
pub struct KeyboardController {
    config: KeyboardConfig,
    keys: KeyState,
    position: (f64, f64),
}

impl KeyboardController {
    fn on_keys(&mut self, keys: KeyState, elapsed_secs: f64) {
        self.keys = keys;
        let step = self.config.velocity * elapsed_secs;
        if keys.left {
            self.position.0 -= step;
        } else if keys.right {
            self.position.0 += step;
        }
        if keys.down {
            self.position.1 -= step;
        } else if keys.up {
            self.position.1 += step;
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// The active prosthesis controller
#[derive(Clone, Debug)]
pub enum Controller {
    /// Echo state network decoder
    EchoState(EchoStateController),
    /// GMLVQ decoder
    Gmlvq(GmlvqController),
    /// Gesture rules
    PoseRule(PoseRuleController),
    /// Keyboard
    Keyboard(KeyboardController),
}

impl Controller {
    /// Create an unconfigured controller of `kind`, tuned by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::Processing`] if the decoder configuration is
    /// unusable.
    pub fn new(kind: ControllerKind, settings: &Settings) -> DecoderResult<Self> {
        Self::with_config(kind, &settings.decoder, &settings.gmlvq, &settings.orientation, &settings.keyboard)
    }

    /// Create an unconfigured controller from explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::Processing`] if the decoder configuration is
    /// unusable.
    pub fn with_config(
        kind: ControllerKind,
        decoder: &DecoderConfig,
        gmlvq: &GmlvqControlConfig,
        orientation: &OrientationConfig,
        keyboard: &KeyboardConfig,
    ) -> DecoderResult<Self> {
        let tracker = OrientationTracker::new(orientation.clone());
        let controller = match kind {
            ControllerKind::EchoState => Self::EchoState(EchoStateController {
                pipeline: DecodePipeline::new(decoder.clone())?,
                esn: None,
                orientation: tracker,
                opening: 0.0,
                rotation: 0.0,
            }),
            ControllerKind::Gmlvq => Self::Gmlvq(GmlvqController {
                pipeline: DecodePipeline::new(decoder.clone())?,
                models: None,
                control: gmlvq.clone(),
                orientation: tracker,
                opening: 0.0,
                rotation: 0.0,
            }),
            ControllerKind::PoseRule => Self::PoseRule(PoseRuleController { pose: Pose::Rest, orientation: tracker }),
            ControllerKind::Keyboard => Self::Keyboard(KeyboardController {
                config: keyboard.clone(),
                keys: KeyState::default(),
                position: (0.5, 0.5),
            }),
        };
        Ok(controller)
    }

    /// Which variant this is
    #[must_use]
    pub const fn kind(&self) -> ControllerKind {
        match self {
            Self::EchoState(_) => ControllerKind::EchoState,
            Self::Gmlvq(_) => ControllerKind::Gmlvq,
            Self::PoseRule(_) => ControllerKind::PoseRule,
            Self::Keyboard(_) => ControllerKind::Keyboard,
        }
    }

    /// Display name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// True for variants that load a model before use
    #[must_use]
    pub const fn needs_configuration(&self) -> bool {
        matches!(self, Self::EchoState(_) | Self::Gmlvq(_))
    }

    /// Conventional model directory under `data_dir`
    #[must_use]
    pub fn default_config_path(&self, data_dir: &Path) -> Option<PathBuf> {
        match self {
            Self::EchoState(_) => Some(data_dir.join("EchoStateNetwork")),
            Self::Gmlvq(_) => Some(data_dir.join("gmlvq")),
            Self::PoseRule(_) | Self::Keyboard(_) => None,
        }
    }

    /// True once the controller can produce signals
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        match self {
            Self::EchoState(c) => c.esn.is_some(),
            Self::Gmlvq(c) => c.models.is_some(),
            Self::PoseRule(_) | Self::Keyboard(_) => true,
        }
    }

    /// Load the model in `path`. On failure the controller keeps its
    /// previous model, or stays disabled if it had none.
    pub fn set_configuration(&mut self, path: &Path) -> ConfigResult {
        let result = match self {
            Self::EchoState(c) => c.configure(path),
            Self::Gmlvq(c) => c.configure(path),
            Self::PoseRule(_) | Self::Keyboard(_) => Ok(()),
        };
        match &result {
            Ok(()) => info!("{} configured from {}", self.name(), path.display()),
            Err(e) => warn!("{} configuration failed: {e}", self.name()),
        }
        result.into()
    }

    /// Feed one EMG frame. Returns `true` when the velocities changed.
    ///
    /// Controllers that do not decode EMG ignore the frame.
    ///
    /// # Errors
    ///
    /// - [`DecoderError::NotConfigured`] if no model is loaded
    /// - [`DecoderError::Processing`] or [`DecoderError::Halted`] if the
    ///   decode pipeline failed
    pub fn on_emg(&mut self, frame: &[f64]) -> DecoderResult<bool> {
        match self {
            Self::EchoState(c) => c.on_emg(frame),
            Self::Gmlvq(c) => c.on_emg(frame),
            Self::PoseRule(_) | Self::Keyboard(_) => Ok(false),
        }
    }

    /// Record the gesture reported by the armband
    pub fn on_pose(&mut self, pose: Pose) {
        if let Self::PoseRule(c) = self {
            c.pose = pose;
        }
    }

    /// Record the armband orientation
    pub fn on_orientation(&mut self, orientation: Orientation) {
        if let Some(tracker) = self.orientation_mut() {
            tracker.update(orientation);
        }
    }

    /// Take the current armband orientation as neutral
    pub fn calibrate(&mut self) {
        if let Some(tracker) = self.orientation_mut() {
            tracker.calibrate();
        }
    }

    /// Record the key state after `elapsed_secs` seconds
    pub fn on_keys(&mut self, keys: KeyState, elapsed_secs: f64) {
        if let Self::Keyboard(c) = self {
            c.on_keys(keys, elapsed_secs);
        }
    }

    fn orientation_mut(&mut self) -> Option<&mut OrientationTracker> {
        match self {
            Self::EchoState(c) => Some(&mut c.orientation),
            Self::Gmlvq(c) => Some(&mut c.orientation),
            Self::PoseRule(c) => Some(&mut c.orientation),
            Self::Keyboard(_) => None,
        }
    }

    /// Opening velocity in `[-1, 1]`
    #[must_use]
    pub fn opening_velocity(&self) -> f64 {
        match self {
            Self::EchoState(c) => c.opening,
            Self::Gmlvq(c) => c.opening,
            Self::PoseRule(c) => c.opening(),
            Self::Keyboard(c) => match (c.keys.w, c.keys.s) {
                (true, _) => 1.0,
                (false, true) => -1.0,
                _ => 0.0,
            },
        }
    }

    /// Rotation velocity in `[-1, 1]`
    #[must_use]
    pub fn rotation_velocity(&self) -> f64 {
        match self {
            Self::EchoState(c) => c.rotation,
            Self::Gmlvq(c) => c.rotation,
            Self::PoseRule(c) => c.rotation(),
            Self::Keyboard(c) => match (c.keys.d, c.keys.a) {
                (true, _) => -1.0,
                (false, true) => 1.0,
                _ => 0.0,
            },
        }
    }

    /// Position on the play area
    #[must_use]
    pub fn position(&self) -> (f64, f64) {
        match self {
            Self::EchoState(c) => c.orientation.position(),
            Self::Gmlvq(c) => c.orientation.position(),
            Self::PoseRule(c) => c.orientation.position(),
            Self::Keyboard(c) => c.position,
        }
    }

    /// Decode pipeline of the EMG variants
    #[must_use]
    pub const fn pipeline(&self) -> Option<&DecodePipeline> {
        match self {
            Self::EchoState(c) => Some(&c.pipeline),
            Self::Gmlvq(c) => Some(&c.pipeline),
            Self::PoseRule(_) | Self::Keyboard(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::loader::tests::{scratch_dir, write};
    use crate::model::loader::GMLVQ_FILE;
    use serde_json::json;

    fn controller(kind: ControllerKind) -> Controller {
        Controller::new(kind, &Settings::default()).unwrap()
    }

    #[test]
    fn test_names_round_trip() {
        for kind in ControllerKind::ALL {
            assert_eq!(ControllerKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ControllerKind::from_name("Joystick"), None);
    }

    #[test]
    fn test_pose_rules() {
        let mut c = controller(ControllerKind::PoseRule);
        assert!(!c.needs_configuration());
        let cases = [
            (Pose::WaveOut, 0.0, 1.0),
            (Pose::WaveIn, 0.0, -1.0),
            (Pose::FingersSpread, 1.0, 0.0),
            (Pose::Fist, -1.0, 0.0),
            (Pose::DoubleTap, 0.0, 0.0),
        ];
        for (pose, opening, rotation) in cases {
            c.on_pose(pose);
            assert_eq!((c.opening_velocity(), c.rotation_velocity()), (opening, rotation));
        }
    }

    #[test]
    fn test_keyboard() {
        let mut c = controller(ControllerKind::Keyboard);
        assert_eq!(c.position(), (0.5, 0.5));

        c.on_keys(KeyState { w: true, a: true, right: true, up: true, ..KeyState::default() }, 0.2);
        assert_eq!(c.opening_velocity(), 1.0);
        assert_eq!(c.rotation_velocity(), 1.0);
        let (x, y) = c.position();
        assert!((x - 0.6).abs() < 1e-12);
        assert!((y - 0.6).abs() < 1e-12);

        c.on_keys(KeyState { s: true, d: true, ..KeyState::default() }, 0.2);
        assert_eq!((c.opening_velocity(), c.rotation_velocity()), (-1.0, -1.0));
    }

    #[test]
    fn test_unconfigured_decoder_is_disabled() {
        let mut c = controller(ControllerKind::EchoState);
        assert!(c.needs_configuration());
        assert!(!c.is_enabled());
        assert_eq!(c.opening_velocity(), 0.0);
        let err = c.on_emg(&[0.0; 8]).unwrap_err();
        assert_eq!(err, DecoderError::NotConfigured { controller: "Echo State Network" });
    }

    #[test]
    fn test_missing_model_reports_error() {
        let dir = scratch_dir("controller-missing");
        let mut c = controller(ControllerKind::Gmlvq);
        let result = c.set_configuration(&dir);
        assert!(result.is_error());
        assert!(result.message().starts_with("Resource file missing"));
        assert!(!c.is_enabled());
    }

    #[test]
    fn test_gmlvq_requires_two_models() {
        let dir = scratch_dir("controller-one-model");
        let prototypes = vec![vec![0.0; 8]];
        let model = json!({"w": prototypes, "c_w": [0], "omega": identity(8)});
        write(&dir, GMLVQ_FILE, &json!({"gmlvq": [[model]]}));
        let mut c = controller(ControllerKind::Gmlvq);
        assert!(c.set_configuration(&dir).is_error());
    }

    #[test]
    fn test_model_failure_halts_decoding() {
        use crate::ml::gmlvq::PrototypeClassifier;
        use nalgebra::DMatrix;
        use prosthex_core::error::ProcessingError;

        let mut c = controller(ControllerKind::Gmlvq);
        let Controller::Gmlvq(inner) = &mut c else { unreachable!() };
        // Models expect three features while the pipeline emits eight
        let model = PrototypeClassifier::new(DMatrix::zeros(1, 3), vec![1], DMatrix::identity(3, 3)).unwrap();
        inner.models = Some(GmlvqModels { models: vec![model.clone(), model], transfer: None });

        let frame = |t: usize| -> Vec<f64> { (0..8).map(|ch| ((t * (ch + 1)) as f64 * 0.37).sin()).collect() };
        let mut failure = None;
        for t in 0..24 {
            if let Err(e) = c.on_emg(&frame(t)) {
                failure = Some((t, e));
                break;
            }
        }
        let (t, err) = failure.unwrap();
        assert_eq!(t, 23);
        assert!(matches!(
            err,
            DecoderError::Processing(ProcessingError::DimensionMismatch { expected: 3, got: 8, .. })
        ));
        assert!(matches!(c.on_emg(&frame(24)), Err(DecoderError::Halted { .. })));
    }

    #[test]
    fn test_default_config_paths() {
        let data = Path::new("/data");
        assert_eq!(controller(ControllerKind::Gmlvq).default_config_path(data), Some(PathBuf::from("/data/gmlvq")));
        assert_eq!(controller(ControllerKind::Keyboard).default_config_path(data), None);
    }

    fn identity(n: usize) -> serde_json::Value {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect()).collect();
        json!(rows)
    }
}
