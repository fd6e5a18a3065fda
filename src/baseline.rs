//! Stationary baseline collection
//!
//! Before a stick starts producing orientation it is held still for a short
//! period. The samples gathered during that phase give the gyroscope bias and
//! the gravity vector as seen by that particular stick.

use log::info;
use nalgebra::Vector3;

use crate::types::SensorSample;

/// Default number of samples collected (3 s at 100 Hz).
pub const DEFAULT_BASELINE_SAMPLES: usize = 300;

/// Immutable result of the calibration phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorBaseline {
    /// Mean gyroscope reading while stationary, in degrees per second
    pub gyro_bias: Vector3<f32>,
    /// Mean accelerometer reading while stationary, in g
    pub gravity: Vector3<f32>,
    /// Number of samples averaged
    pub samples: usize,
}

impl SensorBaseline {
    /// Baseline for a perfectly level, bias-free sensor.
    pub fn neutral() -> Self {
        Self {
            gyro_bias: Vector3::zeros(),
            gravity: Vector3::new(0.0, 0.0, 1.0),
            samples: 0,
        }
    }

    /// Magnitude of the gravity reading in g
    pub fn gravity_magnitude(&self) -> f32 {
        self.gravity.norm()
    }
}

impl Default for SensorBaseline {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Accumulates stationary samples until the configured count is reached.
///
/// # Example
/// ```
/// use core::time::Duration;
/// use nalgebra::Vector3;
/// use fusion_drumstick::{BaselineCollector, SensorSample};
///
/// let mut collector = BaselineCollector::new(3);
/// for i in 0..3 {
///     let sample = SensorSample::new(
///         Vector3::new(0.0, 0.0, 1.0),
///         Vector3::new(-4.0, 1.0, 0.0),
///         Duration::from_millis(10 * i),
///     );
///     collector.push(&sample);
/// }
/// let baseline = collector.finish().unwrap();
/// assert_eq!(baseline.gyro_bias, Vector3::new(-4.0, 1.0, 0.0));
/// ```
#[derive(Debug, Clone)]
pub struct BaselineCollector {
    required: usize,
    count: usize,
    gyro_sum: Vector3<f64>,
    accel_sum: Vector3<f64>,
}

impl BaselineCollector {
    /// `required` is clamped to at least one sample.
    pub fn new(required: usize) -> Self {
        Self {
            required: required.max(1),
            count: 0,
            gyro_sum: Vector3::zeros(),
            accel_sum: Vector3::zeros(),
        }
    }

    /// Add a sample. Returns true once enough samples have been collected.
    ///
    /// Samples beyond the required count are ignored.
    pub fn push(&mut self, sample: &SensorSample) -> bool {
        if self.is_complete() {
            return true;
        }
        self.gyro_sum += sample.gyro.cast::<f64>();
        self.accel_sum += sample.accel.cast::<f64>();
        self.count += 1;
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.count >= self.required
    }

    /// Samples gathered so far
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn required(&self) -> usize {
        self.required
    }

    /// Produce the baseline, or `None` if collection is not complete.
    pub fn finish(&self) -> Option<SensorBaseline> {
        if !self.is_complete() {
            return None;
        }
        let n = self.count as f64;
        let baseline = SensorBaseline {
            gyro_bias: (self.gyro_sum / n).cast::<f32>(),
            gravity: (self.accel_sum / n).cast::<f32>(),
            samples: self.count,
        };
        info!(
            "Baseline complete: gyro bias ({:.3}, {:.3}, {:.3}) deg/s, gravity {:.3} g",
            baseline.gyro_bias.x,
            baseline.gyro_bias.y,
            baseline.gyro_bias.z,
            baseline.gravity_magnitude()
        );
        Some(baseline)
    }
}

impl Default for BaselineCollector {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE_SAMPLES)
    }
}
