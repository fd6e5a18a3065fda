//! Fusion Drumstick - orientation tracking and hit detection for IMU drumsticks
//!
//! Each stick carries one accelerometer + gyroscope pair. Every sample passes
//! through the same pipeline:
//!
//! ```text
//! raw sample -> calibration -> complementary filter -> orientation
//!                                                        |-> hit detector
//!                                                        |-> stick kinematics -> zone collision
//! ```
//!
//! and produces the stick's orientation, whether the sample completed a hit,
//! the drum zone under the tip and a pitch that rests the tip on that zone.
//!
//! # Features
//!
//! - Per-stick calibration: offset, scale, axis remap, inversion and dead zone
//! - Complementary filter with a configurable gyroscope weight
//! - Rise/fall hit detection with cooldown, plus three threshold policies
//! - Rigid-link tip model and first-match zone collision with pitch correction
//! - Versioned JSON kit configuration validated at load
//! - Threaded per-stick polling over a shared sensor bus
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use core::time::Duration;
//! use nalgebra::Vector3;
//! use fusion_drumstick::{Hand, KitConfig, SensorSample};
//!
//! let config = KitConfig::from_json_str(r#"{ "version": 1 }"#).unwrap();
//! let kit = config.kit().unwrap();
//! let mut stick = config.stick_context(Hand::Right, kit);
//!
//! // one reading every 10 ms
//! for tick in 0..10 {
//!     let sample = SensorSample::new(
//!         Vector3::new(0.0, 0.0, 1.0), // g
//!         Vector3::new(0.0, 0.0, 0.0), // deg/s
//!         Duration::from_millis(10 * tick),
//!     );
//!     let output = stick.process(&sample);
//!     println!(
//!         "pitch {:.1} hit {} zone {:?}",
//!         output.orientation.pitch, output.is_hit, output.zone_name
//!     );
//! }
//! ```

pub mod axes;
mod baseline;
pub mod calibration;
pub mod collision;
mod config;
pub mod detector;
pub mod driver;
mod error;
mod estimator;
pub mod kinematics;
mod math;
pub mod runner;
mod stick;
mod types;

// Re-export all public types and functions
pub use baseline::{BaselineCollector, DEFAULT_BASELINE_SAMPLES, SensorBaseline};
pub use calibration::{CalibrationProfile, ProfileSource};
pub use collision::{CollisionResolver, CollisionSettings, DrumZone, Strike};
pub use config::{CONFIG_VERSION, KitConfig, StickConfig, StickConfigs};
pub use detector::{
    DetectionPolicy, DetectorInput, DetectorPhase, DetectorSettings, HitDetector, HitEvent, PolicyKind,
};
pub use driver::{BusSensor, ChannelSource, ImuBus, SensorSource, SharedBus};
pub use error::{ConfigError, SensorError};
pub use estimator::{FilterSettings, MAX_ALPHA, MIN_ALPHA, OrientationEstimator, accel_tilt};
pub use kinematics::{GripSettings, StickGeometry};
pub use math::{DEG_TO_RAD, RAD_TO_DEG, TILT_EPSILON, Vector3Ext, wrap_degrees};
pub use runner::{RunnerPhase, SamplingSettings, Snapshot, StickHandle, StickRunner};
pub use stick::{Kit, StickContext, StickDiagnostics, StickOutput};
pub use types::*;
