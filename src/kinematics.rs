//! Rigid-link stick model
//!
//! Converts a stick's pitch and yaw into the 3D position of its tip in kit
//! space. Kit space is right-handed with Y up and Z pointing from the player
//! into the kit; X runs to the player's left.
//!
//! The hand (grip) is placed first, then the stick is rotated about the grip:
//! pitch swings the tip down (positive pitch lowers the tip) and yaw swings it
//! sideways.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::DEG_TO_RAD;
use crate::types::Hand;

/// Grip placement parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripSettings {
    /// Lateral grip position of the right hand at the reference yaw
    pub right_base_x: f32,
    /// Lateral grip position of the left hand at the reference yaw
    pub left_base_x: f32,
    /// Yaw (degrees) at which the grip sits at its base X
    pub yaw_reference: f32,
    /// Lateral grip travel per degree of yaw deflection
    pub yaw_travel: f32,
    pub x_min: f32,
    pub x_max: f32,
    /// Fixed grip height
    pub base_y: f32,
    /// Grip depth with the stick level
    pub base_z: f32,
    /// Pitch (degrees) above which the grip reaches forward for raised zones
    pub reach_pitch: f32,
    /// Depth gained per degree of pitch above `reach_pitch`
    pub reach_factor: f32,
    /// Upper bound on the reach contribution
    pub reach_max: f32,
    /// Depth gained per degree of |pitch| at or below `reach_pitch`
    pub flat_factor: f32,
    /// Depth gained per g of lateral acceleration
    pub accel_factor: f32,
    /// Upper bound on the acceleration contribution
    pub accel_max: f32,
    pub z_min: f32,
    pub z_max: f32,
}

impl Default for GripSettings {
    fn default() -> Self {
        Self {
            right_base_x: 1.0,
            left_base_x: -1.0,
            yaw_reference: 45.0,
            yaw_travel: 3.0 / 90.0,
            x_min: -3.0,
            x_max: 3.0,
            base_y: 1.5,
            base_z: -0.5,
            reach_pitch: 5.0,
            reach_factor: 0.03,
            reach_max: 0.8,
            flat_factor: 0.003,
            accel_factor: 0.01,
            accel_max: 0.15,
            z_min: -2.2,
            z_max: 0.5,
        }
    }
}

/// Static stick geometry, read-only after load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickGeometry {
    /// Distance from grip to tip
    pub stick_length: f32,
    pub grip: GripSettings,
    /// Swing rotation per degree of pitch (dimensionless, rad per rad)
    pub swing_gain: f32,
    /// Pitch clamp applied before the swing mapping, degrees
    pub pitch_min: f32,
    pub pitch_max: f32,
    /// Lateral rotation per degree of yaw (dimensionless)
    pub yaw_gain: f32,
    /// Yaw clamp applied before the lateral mapping, degrees
    pub yaw_min: f32,
    pub yaw_max: f32,
    /// Smallest forward (Z) reach of the tip relative to the grip
    pub min_forward: f32,
}

impl Default for StickGeometry {
    fn default() -> Self {
        Self {
            stick_length: 2.0,
            grip: GripSettings::default(),
            // 45 degrees of pitch swings the stick through 60 degrees
            swing_gain: 60.0 / 45.0,
            pitch_min: -60.0,
            pitch_max: 60.0,
            // 45 degrees of yaw turns the stick through 30 degrees
            yaw_gain: 30.0 / 45.0,
            yaw_min: -90.0,
            yaw_max: 90.0,
            min_forward: 0.05,
        }
    }
}

impl StickGeometry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn finite(field: &str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::invalid(format!("geometry.{field}"), "must be finite"))
            }
        }
        fn positive(field: &str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::invalid(
                    format!("geometry.{field}"),
                    format!("must be a positive number, got {value}"),
                ))
            }
        }
        fn ordered(field: &str, min: f32, max: f32) -> Result<(), ConfigError> {
            if min <= max {
                Ok(())
            } else {
                Err(ConfigError::invalid(
                    format!("geometry.{field}"),
                    format!("minimum {min} exceeds maximum {max}"),
                ))
            }
        }

        let g = &self.grip;
        for (field, value) in [
            ("grip.right_base_x", g.right_base_x),
            ("grip.left_base_x", g.left_base_x),
            ("grip.yaw_reference", g.yaw_reference),
            ("grip.yaw_travel", g.yaw_travel),
            ("grip.x_min", g.x_min),
            ("grip.x_max", g.x_max),
            ("grip.base_y", g.base_y),
            ("grip.base_z", g.base_z),
            ("grip.reach_pitch", g.reach_pitch),
            ("grip.z_min", g.z_min),
            ("grip.z_max", g.z_max),
            ("pitch_min", self.pitch_min),
            ("pitch_max", self.pitch_max),
            ("yaw_min", self.yaw_min),
            ("yaw_max", self.yaw_max),
            ("yaw_gain", self.yaw_gain),
        ] {
            finite(field, value)?;
        }
        for (field, value) in [
            ("grip.reach_factor", g.reach_factor),
            ("grip.reach_max", g.reach_max),
            ("grip.flat_factor", g.flat_factor),
            ("grip.accel_factor", g.accel_factor),
            ("grip.accel_max", g.accel_max),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(
                    format!("geometry.{field}"),
                    "must be a non-negative number",
                ));
            }
        }
        positive("stick_length", self.stick_length)?;
        positive("swing_gain", self.swing_gain)?;
        positive("min_forward", self.min_forward)?;
        ordered("grip.x_min", g.x_min, g.x_max)?;
        ordered("grip.z_min", g.z_min, g.z_max)?;
        ordered("pitch_min", self.pitch_min, self.pitch_max)?;
        ordered("yaw_min", self.yaw_min, self.yaw_max)
    }

    /// Swing rotation in radians for a pitch in degrees, after clamping.
    pub fn swing_rotation(&self, pitch: f32) -> f32 {
        pitch.clamp(self.pitch_min, self.pitch_max) * self.swing_gain * DEG_TO_RAD
    }

    /// Inverse of [`swing_rotation`](Self::swing_rotation) (no clamping).
    pub fn pitch_for_swing(&self, swing_rotation: f32) -> f32 {
        swing_rotation / (self.swing_gain * DEG_TO_RAD)
    }

    /// Lateral rotation in radians for a yaw in degrees, after clamping.
    pub fn yaw_rotation(&self, yaw: f32) -> f32 {
        yaw.clamp(self.yaw_min, self.yaw_max) * self.yaw_gain * DEG_TO_RAD
    }

    /// Grip (hand) position.
    ///
    /// # Arguments
    /// * `pitch`, `yaw` - Stick orientation in degrees
    /// * `hand` - Selects the base lateral offset
    /// * `lateral_accel` - Calibrated X acceleration in g; a hard sideways
    ///   swing pushes the hand slightly deeper into the kit
    pub fn grip_position(&self, pitch: f32, yaw: f32, hand: Hand, lateral_accel: f32) -> Vector3<f32> {
        let g = &self.grip;
        let base_x = match hand {
            Hand::Right => g.right_base_x,
            Hand::Left => g.left_base_x,
        };
        let x = (base_x + (yaw - g.yaw_reference) * g.yaw_travel).clamp(g.x_min, g.x_max);

        let pitch = pitch.clamp(self.pitch_min, self.pitch_max);
        let reach = if pitch > g.reach_pitch {
            ((pitch - g.reach_pitch) * g.reach_factor).min(g.reach_max)
        } else {
            pitch.abs() * g.flat_factor
        };
        let accel = if lateral_accel.is_finite() {
            (lateral_accel.abs() * g.accel_factor).min(g.accel_max)
        } else {
            0.0
        };
        let z = (g.base_z + reach + accel).clamp(g.z_min, g.z_max);

        Vector3::new(x, g.base_y, z)
    }

    /// Tip offset from the grip for the given orientation.
    pub fn tip_offset(&self, pitch: f32, yaw: f32) -> Vector3<f32> {
        let length = self.stick_length;
        let swing = self.swing_rotation(pitch);
        let lateral = self.yaw_rotation(yaw);

        let dx = length * lateral.sin() * swing.cos();
        let dy = -length * swing.sin();
        let dz = (length * lateral.cos() * swing.cos()).max(self.min_forward);
        Vector3::new(dx, dy, dz)
    }

    /// Tip position with no lateral acceleration contribution.
    pub fn compute_tip(&self, pitch: f32, yaw: f32, hand: Hand) -> Vector3<f32> {
        self.compute_tip_with_accel(pitch, yaw, hand, 0.0)
    }

    pub fn compute_tip_with_accel(
        &self,
        pitch: f32,
        yaw: f32,
        hand: Hand,
        lateral_accel: f32,
    ) -> Vector3<f32> {
        self.grip_position(pitch, yaw, hand, lateral_accel) + self.tip_offset(pitch, yaw)
    }
}
