//! Sensor axes remapping for different mounting orientations
//!
//! The sensor inside a stick is rarely mounted with its axes matching the
//! stick's body frame. An [`AxisMapping`] names, for every body axis, the
//! sensor axis it reads from, and an [`AxisInversion`] flips individual body
//! axes afterwards.
//!
//! # Example
//! ```
//! use nalgebra::Vector3;
//! use fusion_drumstick::axes::{remap, Axis, AxisInversion, AxisMapping};
//!
//! let sensor = Vector3::new(1.0, 2.0, 3.0);
//!
//! // Sensor mounted with X and Y swapped, body Y pointing the other way
//! let mapping = AxisMapping::new(Axis::Y, Axis::X, Axis::Z);
//! let inversion = AxisInversion { x: false, y: true, z: false };
//! let body = remap(sensor, mapping, inversion);
//!
//! assert_eq!(body, Vector3::new(2.0, -1.0, 3.0));
//! ```

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A sensor axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Source sensor axis for each body axis.
///
/// Valid only when it is a bijection over {x, y, z}; see
/// [`AxisMapping::is_bijection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub x: Axis,
    pub y: Axis,
    pub z: Axis,
}

impl AxisMapping {
    pub const IDENTITY: AxisMapping = AxisMapping {
        x: Axis::X,
        y: Axis::Y,
        z: Axis::Z,
    };

    pub fn new(x: Axis, y: Axis, z: Axis) -> Self {
        Self { x, y, z }
    }

    /// True when every sensor axis is used exactly once.
    pub fn is_bijection(&self) -> bool {
        let mut seen = [false; 3];
        for axis in [self.x, self.y, self.z] {
            seen[axis.index()] = true;
        }
        seen.iter().all(|&s| s)
    }
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Per body axis sign inversion, applied after remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisInversion {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

/// Remap a sensor-frame vector into the body frame.
#[inline]
pub fn remap(sensor: Vector3<f32>, mapping: AxisMapping, inversion: AxisInversion) -> Vector3<f32> {
    let sign = |inverted: bool| if inverted { -1.0 } else { 1.0 };
    Vector3::new(
        sensor[mapping.x.index()] * sign(inversion.x),
        sensor[mapping.y.index()] * sign(inversion.y),
        sensor[mapping.z.index()] * sign(inversion.z),
    )
}
