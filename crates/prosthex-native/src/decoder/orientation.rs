//! Armband orientation to play-area position

use prosthex_core::types::{crop_angle, Orientation};

use super::config::OrientationConfig;

/// Tracks the armband orientation relative to a calibration pose.
#[derive(Clone, Debug, Default)]
pub struct OrientationTracker {
    config: OrientationConfig,
    calibration: Orientation,
    current: Orientation,
}

impl OrientationTracker {
    /// Create a tracker calibrated at the zero orientation
    #[must_use]
    pub fn new(config: OrientationConfig) -> Self {
        Self { config, calibration: Orientation::default(), current: Orientation::default() }
    }

    /// Record the latest orientation
    pub fn update(&mut self, orientation: Orientation) {
        self.current = orientation;
    }

    /// Use the latest orientation as the neutral pose
    pub fn calibrate(&mut self) {
        self.calibration = self.current;
    }

    /// Current calibration pose
    #[must_use]
    pub const fn calibration(&self) -> Orientation {
        self.calibration
    }

    /// Position in `[0, 1]²`; `(0.5, y)` is straight ahead, `y = 0` the
    /// lowest allowed pitch.
    #[must_use]
    pub fn position(&self) -> (f64, f64) {
        let OrientationConfig { max_horizontal_deg: max_h, max_up_deg: max_up, max_down_deg: max_down } = self.config;
        let rotation = self.current.relative_to(&self.calibration);
        let pitch = crop_angle(rotation.pitch);
        let yaw = crop_angle(rotation.yaw);

        let vertical = (-pitch).max(-max_down).min(max_up);
        let horizontal = yaw.max(-max_h).min(max_h);

        let x = if max_h > 0.0 { (horizontal + max_h) / (2.0 * max_h) } else { 0.5 };
        let y = if max_up + max_down > 0.0 { (vertical + max_down) / (max_up + max_down) } else { 0.5 };
        (x, y)
    }
}
