//! Per-stick sensor calibration
//!
//! Raw readings pass through the same four steps for both sensors, in order:
//! subtract offset, multiply by scale, remap and invert axes, then zero every
//! component whose magnitude falls inside the dead zone.
//!
//! [`correct`] runs the first three steps only. The stick pipeline uses it so
//! the stationary gyro bias is removed before the dead zone is applied.

use std::path::Path;

use log::{info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::axes::{AxisInversion, AxisMapping, remap};
use crate::error::ConfigError;

/// Calibration parameters for one stick.
///
/// Loaded once and immutable for the rest of the session.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use fusion_drumstick::calibration::{apply, CalibrationProfile};
///
/// let profile = CalibrationProfile {
///     accel_offset: Vector3::new(0.06, -0.04, 0.0),
///     ..CalibrationProfile::identity()
/// };
/// let (accel, gyro) = apply(Vector3::new(0.06, -0.04, 1.0), Vector3::zeros(), Some(&profile));
/// assert!((accel - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-6);
/// assert_eq!(gyro, Vector3::zeros());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationProfile {
    pub accel_offset: Vector3<f32>,
    pub gyro_offset: Vector3<f32>,
    /// Per-axis accelerometer scale; no component may be zero
    pub accel_scale: Vector3<f32>,
    /// Per-axis gyroscope scale; no component may be zero
    pub gyro_scale: Vector3<f32>,
    pub mapping: AxisMapping,
    pub invert: AxisInversion,
    /// Components with magnitude below this are reported as zero
    pub dead_zone: f32,
}

impl CalibrationProfile {
    /// Offset 0, scale 1, identity mapping, no inversion, no dead zone.
    pub fn identity() -> Self {
        Self {
            accel_offset: Vector3::zeros(),
            gyro_offset: Vector3::zeros(),
            accel_scale: Vector3::repeat(1.0),
            gyro_scale: Vector3::repeat(1.0),
            mapping: AxisMapping::IDENTITY,
            invert: AxisInversion::default(),
            dead_zone: 0.0,
        }
    }

    /// Check the profile invariants. `field` prefixes error messages.
    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        for (name, v) in [
            ("accel_offset", &self.accel_offset),
            ("gyro_offset", &self.gyro_offset),
        ] {
            if v.iter().any(|c| !c.is_finite()) {
                return Err(ConfigError::invalid(format!("{field}.{name}"), "must be finite"));
            }
        }
        for (name, v) in [("accel_scale", &self.accel_scale), ("gyro_scale", &self.gyro_scale)] {
            if v.iter().any(|c| !c.is_finite() || *c == 0.0) {
                return Err(ConfigError::invalid(
                    format!("{field}.{name}"),
                    "must be finite and non-zero",
                ));
            }
        }
        if !self.mapping.is_bijection() {
            return Err(ConfigError::invalid(
                format!("{field}.mapping"),
                "must use each of x, y and z exactly once",
            ));
        }
        if !self.dead_zone.is_finite() || self.dead_zone < 0.0 {
            return Err(ConfigError::invalid(
                format!("{field}.dead_zone"),
                "must be a non-negative number",
            ));
        }
        Ok(())
    }

    /// Load a standalone profile file, substituting the identity profile
    /// when the file is missing or invalid.
    ///
    /// A bad profile degrades tracking quality but never stops a stick, so
    /// the failure is reported through [`ProfileSource`] instead of an error.
    pub fn load_or_identity(path: impl AsRef<Path>) -> (Self, ProfileSource) {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(profile) => {
                info!("Loaded calibration profile {}", path.display());
                (profile, ProfileSource::Loaded)
            }
            Err(err) => {
                warn!(
                    "Calibration profile {} unusable ({err}), using identity profile",
                    path.display()
                );
                (
                    Self::identity(),
                    ProfileSource::Identity {
                        reason: err.to_string(),
                    },
                )
            }
        }
    }

    fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let profile: Self = serde_json::from_str(&contents)?;
        profile.validate("profile")?;
        Ok(profile)
    }
}

impl CalibrationProfile {
    /// Zero every component whose magnitude is below the dead zone.
    pub fn apply_dead_zone(&self, v: Vector3<f32>) -> Vector3<f32> {
        v.map(|c| if c.abs() < self.dead_zone { 0.0 } else { c })
    }
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self::identity()
    }
}

/// Where a stick's calibration profile came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ProfileSource {
    Loaded,
    /// No usable profile; identity defaults are in effect
    Identity { reason: String },
}

impl ProfileSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ProfileSource::Identity { .. })
    }
}

/// Offset, scale and remap one sensor vector.
fn correct_vector(
    raw: Vector3<f32>,
    offset: Vector3<f32>,
    scale: Vector3<f32>,
    profile: &CalibrationProfile,
) -> Vector3<f32> {
    let scaled = (raw - offset).component_mul(&scale);
    remap(scaled, profile.mapping, profile.invert)
}

/// Offset, scale and axis correction without the dead zone.
pub fn correct(
    raw_accel: Vector3<f32>,
    raw_gyro: Vector3<f32>,
    profile: &CalibrationProfile,
) -> (Vector3<f32>, Vector3<f32>) {
    (
        correct_vector(raw_accel, profile.accel_offset, profile.accel_scale, profile),
        correct_vector(raw_gyro, profile.gyro_offset, profile.gyro_scale, profile),
    )
}

/// Apply a calibration profile to a raw accelerometer/gyroscope pair.
///
/// Pure: the same inputs always give the same outputs. Without a profile the
/// identity profile is used.
///
/// # Returns
/// Calibrated `(accel, gyro)` in the stick's body frame
pub fn apply(
    raw_accel: Vector3<f32>,
    raw_gyro: Vector3<f32>,
    profile: Option<&CalibrationProfile>,
) -> (Vector3<f32>, Vector3<f32>) {
    let identity = CalibrationProfile::identity();
    let profile = profile.unwrap_or(&identity);
    let (accel, gyro) = correct(raw_accel, raw_gyro, profile);
    (profile.apply_dead_zone(accel), profile.apply_dead_zone(gyro))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axes::Axis;

    fn swapped_profile() -> CalibrationProfile {
        CalibrationProfile {
            accel_offset: Vector3::new(0.1, 0.2, 0.3),
            gyro_offset: Vector3::new(-4.0, -1.0, 0.5),
            accel_scale: Vector3::new(0.5, 0.5, 0.5),
            gyro_scale: Vector3::new(2.0, 1.0, 1.0),
            mapping: AxisMapping::new(Axis::Y, Axis::X, Axis::Z),
            invert: AxisInversion {
                x: false,
                y: false,
                z: true,
            },
            dead_zone: 0.2,
        }
    }

    #[test]
    fn test_identity_fallback() {
        let raw_accel = Vector3::new(0.01, -0.5, 1.0);
        let raw_gyro = Vector3::new(3.0, 0.0, -7.5);
        let (accel, gyro) = apply(raw_accel, raw_gyro, None);
        assert_eq!(accel, raw_accel);
        assert_eq!(gyro, raw_gyro);
    }

    #[test]
    fn test_step_order() {
        let profile = swapped_profile();
        let (accel, gyro) = apply(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(-3.0, 9.0, 0.5),
            Some(&profile),
        );

        // (raw - offset) * scale = (0.45, 0.9, 1.35), swap x/y, negate z
        assert!((accel - Vector3::new(0.9, 0.45, -1.35)).norm() < 1e-6);

        // (1.0, 10.0, 0.0) * (2, 1, 1) = (2, 10, 0), swap x/y, negate z
        assert!((gyro - Vector3::new(10.0, 2.0, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn test_dead_zone_after_remap() {
        let profile = swapped_profile();
        // accel y: (0.5 - 0.2) * 0.5 = 0.15 lands on body x, inside the dead zone
        let (accel, _) = apply(Vector3::new(1.1, 0.5, 0.3), Vector3::zeros(), Some(&profile));
        assert_eq!(accel.x, 0.0);
        assert!((accel.y - 0.5).abs() < 1e-6);
        assert_eq!(accel.z, 0.0);
    }

    #[test]
    fn test_correct_skips_dead_zone() {
        let profile = swapped_profile();
        let raw_accel = Vector3::new(1.1, 0.5, 0.3);
        let (corrected, _) = correct(raw_accel, Vector3::zeros(), &profile);
        assert!((corrected - Vector3::new(0.15, 0.5, 0.0)).norm() < 1e-6);

        let (applied, _) = apply(raw_accel, Vector3::zeros(), Some(&profile));
        assert_eq!(applied, profile.apply_dead_zone(corrected));
    }

    #[test]
    fn test_apply_is_pure() {
        let profile = swapped_profile();
        let raw_accel = Vector3::new(0.3, -1.2, 0.8);
        let raw_gyro = Vector3::new(120.0, -40.0, 3.0);
        let first = apply(raw_accel, raw_gyro, Some(&profile));
        for _ in 0..10 {
            assert_eq!(apply(raw_accel, raw_gyro, Some(&profile)), first);
        }
    }

    #[test]
    fn test_validation() {
        assert!(CalibrationProfile::identity().validate("right").is_ok());

        let zero_scale = CalibrationProfile {
            gyro_scale: Vector3::new(1.0, 0.0, 1.0),
            ..CalibrationProfile::identity()
        };
        assert!(matches!(
            zero_scale.validate("right"),
            Err(ConfigError::InvalidValue { field, .. }) if field == "right.gyro_scale"
        ));

        let not_bijective = CalibrationProfile {
            mapping: AxisMapping::new(Axis::X, Axis::X, Axis::Y),
            ..CalibrationProfile::identity()
        };
        assert!(not_bijective.validate("left").is_err());

        let negative_dead_zone = CalibrationProfile {
            dead_zone: -0.1,
            ..CalibrationProfile::identity()
        };
        assert!(negative_dead_zone.validate("left").is_err());
    }

    #[test]
    fn test_missing_profile_falls_back() {
        let (profile, source) =
            CalibrationProfile::load_or_identity("/nonexistent/fusion-drumstick/profile.json");
        assert_eq!(profile, CalibrationProfile::identity());
        assert!(source.is_fallback());
    }

    #[test]
    fn test_partial_profile_deserializes() {
        let profile: CalibrationProfile =
            serde_json::from_str(r#"{"gyro_offset":[-4.29,-1.29,0.22],"dead_zone":0.1}"#).unwrap();
        assert_eq!(profile.accel_scale, Vector3::repeat(1.0));
        assert!((profile.gyro_offset.x + 4.29).abs() < 1e-6);
        assert!(profile.validate("right").is_ok());
    }
}
