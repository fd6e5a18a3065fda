//! Complementary-filter orientation estimator
//!
//! # Mounting convention
//!
//! Body axes of the calibrated (remapped) sensor frame:
//!
//! - X runs along the stick towards the tip
//! - Y points to the stick's left
//! - Z points up out of the top of the stick
//!
//! At rest and level the accelerometer reads `(0, 0, 1)` g. Tilt angles come
//! from the accelerometer as
//!
//! - `roll  = atan2(ay, az)`
//! - `pitch = atan2(−ax, sqrt(ay² + az²))`
//!
//! and the gyroscope rate used for each angle is the rate about the same axis:
//! `gx` for roll, `gy` for pitch, `gz` for yaw.

use core::time::Duration;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::{RAD_TO_DEG, TILT_EPSILON, Vector3Ext, wrap_degrees};
use crate::types::Orientation;

/// Smallest accepted gyroscope weight
pub const MIN_ALPHA: f32 = 0.95;
/// Largest accepted gyroscope weight
pub const MAX_ALPHA: f32 = 0.99;

/// Complementary filter settings
///
/// # Example
/// ```
/// use fusion_drumstick::{FilterSettings, OrientationEstimator};
///
/// let settings = FilterSettings { alpha: 0.96 };
/// let estimator = OrientationEstimator::with_settings(settings);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Gyroscope weight in the blend, within [0.95, 0.99]
    ///
    /// Higher values follow fast motion more closely; lower values pull
    /// towards the accelerometer tilt faster and drift less.
    pub alpha: f32,
}

impl FilterSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_ALPHA..=MAX_ALPHA).contains(&self.alpha) {
            return Err(ConfigError::invalid(
                "filter.alpha",
                format!("must be within [{MIN_ALPHA}, {MAX_ALPHA}], got {}", self.alpha),
            ));
        }
        Ok(())
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self { alpha: 0.98 }
    }
}

/// Tilt derived from a single accelerometer reading, in degrees.
///
/// Returns `(roll, pitch)`. Roll is `None` when gravity lies along the stick
/// (the Y-Z component vanishes) and roll is undefined.
pub fn accel_tilt(accel: Vector3<f32>) -> (Option<f32>, f32) {
    let lateral = (accel.y * accel.y + accel.z * accel.z).sqrt();
    let pitch = (-accel.x).atan2(lateral.max(TILT_EPSILON)) * RAD_TO_DEG;
    let roll = if lateral > TILT_EPSILON {
        Some(accel.y.atan2(accel.z) * RAD_TO_DEG)
    } else {
        None
    };
    (roll, pitch)
}

/// Orientation estimator for one stick.
///
/// Fuses gyroscope integration with accelerometer tilt:
///
/// `angle = α · (previous + rate · dt) + (1 − α) · accel_angle`
///
/// Yaw has no accelerometer reference and is pure gyro integration, wrapped
/// into (−180°, 180°] after every update.
#[derive(Debug, Clone)]
pub struct OrientationEstimator {
    settings: FilterSettings,
    orientation: Orientation,
    /// Timestamp of the previous timed update
    last_timestamp: Option<Duration>,
    /// Accelerometer tilt seen on the last update
    accel_roll: Option<f32>,
    accel_pitch: f32,
    updates: u64,
}

impl OrientationEstimator {
    /// Create an estimator with default settings
    pub fn new() -> Self {
        Self::with_settings(FilterSettings::default())
    }

    pub fn with_settings(settings: FilterSettings) -> Self {
        Self {
            settings,
            orientation: Orientation::default(),
            last_timestamp: None,
            accel_roll: None,
            accel_pitch: 0.0,
            updates: 0,
        }
    }

    /// Zero the orientation and forget the previous timestamp.
    ///
    /// Only called on explicit recalibration.
    pub fn reset(&mut self) {
        self.orientation = Orientation::default();
        self.last_timestamp = None;
        self.accel_roll = None;
        self.accel_pitch = 0.0;
        self.updates = 0;
    }

    pub fn settings(&self) -> FilterSettings {
        self.settings
    }

    /// Current orientation
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Accelerometer-only tilt `(roll, pitch)` from the last update
    pub fn accel_tilt(&self) -> (Option<f32>, f32) {
        (self.accel_roll, self.accel_pitch)
    }

    /// Number of updates that advanced the filter
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Advance the filter using the elapsed time since the previous sample.
    ///
    /// The first call only records the timestamp and returns the zero
    /// orientation. Out-of-order timestamps are treated as `dt = 0`.
    pub fn update_at(
        &mut self,
        accel: Vector3<f32>,
        gyro: Vector3<f32>,
        timestamp: Duration,
    ) -> Orientation {
        let dt = match self.last_timestamp {
            Some(previous) => timestamp.saturating_sub(previous).as_secs_f32(),
            None => 0.0,
        };
        if self.last_timestamp.is_none_or(|previous| timestamp > previous) {
            self.last_timestamp = Some(timestamp);
        }
        self.update(accel, gyro, dt)
    }

    /// Advance the filter by `dt` seconds.
    ///
    /// # Arguments
    /// * `accel` - Calibrated accelerometer reading in g
    /// * `gyro` - Calibrated gyroscope reading in degrees per second
    /// * `dt` - Time step in seconds; zero, negative or non-finite values
    ///   leave the orientation unchanged
    pub fn update(&mut self, accel: Vector3<f32>, gyro: Vector3<f32>, dt: f32) -> Orientation {
        if !(dt.is_finite() && dt > 0.0) || !accel.all_finite() || !gyro.all_finite() {
            return self.orientation;
        }

        let alpha = self.settings.alpha;
        let (accel_roll, accel_pitch) = accel_tilt(accel);

        let gyro_roll = self.orientation.roll + gyro.x * dt;
        let gyro_pitch = self.orientation.pitch + gyro.y * dt;
        let gyro_yaw = self.orientation.yaw + gyro.z * dt;

        // Blend on the wrapped difference so the ±180° seam is continuous.
        // Roll is undefined with the stick vertical; keep integrating the gyro
        let roll = match accel_roll {
            Some(accel_roll) => {
                gyro_roll + (1.0 - alpha) * wrap_degrees(accel_roll - gyro_roll)
            }
            None => gyro_roll,
        };
        let pitch = alpha * gyro_pitch + (1.0 - alpha) * accel_pitch;

        self.orientation = Orientation {
            roll: wrap_degrees(roll),
            pitch,
            yaw: wrap_degrees(gyro_yaw),
        };
        self.accel_roll = accel_roll;
        self.accel_pitch = accel_pitch;
        self.updates += 1;
        self.orientation
    }
}

impl Default for OrientationEstimator {
    fn default() -> Self {
        Self::new()
    }
}
