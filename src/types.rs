//! Core types shared by every stage of the stick pipeline

use core::fmt;
use core::time::Duration;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One reading from a stick's inertial sensor.
///
/// Produced by the driver and never mutated afterwards.
///
/// # Example
/// ```
/// use core::time::Duration;
/// use nalgebra::Vector3;
/// use fusion_drumstick::SensorSample;
///
/// let sample = SensorSample::new(
///     Vector3::new(0.0, 0.0, 1.0),  // g
///     Vector3::new(0.0, 12.5, 0.0), // deg/s
///     Duration::from_millis(10),
/// );
/// assert_eq!(sample.accel.z, 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Accelerometer reading in g
    pub accel: Vector3<f32>,
    /// Gyroscope reading in degrees per second
    pub gyro: Vector3<f32>,
    /// Monotonic time of the read, measured from the start of the stream
    pub timestamp: Duration,
}

impl SensorSample {
    pub fn new(accel: Vector3<f32>, gyro: Vector3<f32>, timestamp: Duration) -> Self {
        Self {
            accel,
            gyro,
            timestamp,
        }
    }
}

/// Stick orientation in degrees.
///
/// - **roll**: rotation about the stick's longitudinal axis
/// - **pitch**: rotation about the lateral axis (the swing)
/// - **yaw**: rotation about the vertical axis, always within (−180°, 180°]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Orientation {
    pub fn new(roll: f32, pitch: f32, yaw: f32) -> Self {
        Self { roll, pitch, yaw }
    }
}

/// Which hand holds the stick.
///
/// Selects the grip offset used by the kinematic model and the calibration
/// profile used by the calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    #[default]
    Right,
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hand::Left => write!(f, "left"),
            Hand::Right => write!(f, "right"),
        }
    }
}
