//! Mathematical utilities and nalgebra extensions

use nalgebra::Vector3;

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Floor applied to the denominator of accelerometer tilt formulas.
///
/// Near-vertical orientations drive `sqrt(ay² + az²)` towards zero; clamping
/// keeps `atan2` finite.
pub const TILT_EPSILON: f32 = 1e-6;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Distance to `other` in the horizontal (X-Z) plane, ignoring height
    fn planar_distance(&self, other: &Vector3<f32>) -> f32;

    /// True when every component is finite
    fn all_finite(&self) -> bool;
}

impl Vector3Ext for Vector3<f32> {
    fn planar_distance(&self, other: &Vector3<f32>) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    fn all_finite(&self) -> bool {
        self.iter().all(|c| c.is_finite())
    }
}

/// Wrap an angle in degrees into (−180°, 180°].
///
/// Non-finite input is returned as zero so a corrupt sample can never poison
/// an integrated heading.
pub fn wrap_degrees(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }

    let mut wrapped = angle % 360.0;
    if wrapped > 180.0 {
        wrapped -= 360.0;
    } else if wrapped <= -180.0 {
        wrapped += 360.0;
    }
    wrapped
}
