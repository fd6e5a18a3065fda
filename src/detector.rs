//! Hit-event detection
//!
//! Turns the continuous per-sample stream of one stick into discrete,
//! de-duplicated hit events. Four policies are available behind
//! [`DetectionPolicy`]; all of them share the same cooldown gate so that
//! mechanical bounce after a strike cannot trigger a second event.
//!
//! The default [`DetectionPolicy::RiseFall`] policy walks the state machine
//!
//! ```text
//! IDLE --pitch rises--> RISING --pitch falls, rise >= rise_threshold--> FALLING
//!   ^                      |                                               |
//!   |                      +--pitch falls, rise too small--> IDLE          |
//!   |                                                                      |
//!   +----- cooldown elapsed ----- COOLDOWN <--- peak - pitch >= fall_threshold
//! ```

use core::fmt;
use core::time::Duration;

use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shortest accepted cooldown
pub const MIN_COOLDOWN_MS: u64 = 80;
/// Longest accepted cooldown
pub const MAX_COOLDOWN_MS: u64 = 150;

/// Slow tracking weight for the gravity baseline once it is established
const BASELINE_TRACKING: f32 = 0.001;

/// Hit detection strategy.
///
/// Selected by the `kind` field in configuration:
///
/// ```json
/// { "kind": "rise_fall", "rise_threshold": 15.0, "fall_threshold": 10.0 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionPolicy {
    /// Pitch must rise by `rise_threshold` degrees, then fall back by
    /// `fall_threshold` degrees from the peak
    RiseFall {
        rise_threshold: f32,
        fall_threshold: f32,
        /// Pitch changes within ±epsilon degrees count as flat
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    /// Fast swing and hard acceleration on the same sample
    ThresholdAnd {
        /// Pitch or yaw rate in deg/s
        gyro_threshold: f32,
        /// Acceleration magnitude in g
        accel_threshold: f32,
    },
    /// Large pitch change between samples together with an acceleration spike
    DeltaBased {
        /// Degrees per sample
        pitch_delta_threshold: f32,
        /// Acceleration magnitude in g
        accel_threshold: f32,
    },
    /// Acceleration magnitude above a learned gravity baseline
    GravityCompensated {
        /// Excess over the baseline in g
        accel_delta_threshold: f32,
        /// Samples averaged into the baseline before detection starts
        baseline_samples: u32,
    },
}

fn default_epsilon() -> f32 {
    0.5
}

impl DetectionPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            DetectionPolicy::RiseFall { .. } => PolicyKind::RiseFall,
            DetectionPolicy::ThresholdAnd { .. } => PolicyKind::ThresholdAnd,
            DetectionPolicy::DeltaBased { .. } => PolicyKind::DeltaBased,
            DetectionPolicy::GravityCompensated { .. } => PolicyKind::GravityCompensated,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        fn non_negative(field: &str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::invalid(
                    format!("detector.policy.{field}"),
                    format!("must be a non-negative number, got {value}"),
                ))
            }
        }
        fn positive(field: &str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::invalid(
                    format!("detector.policy.{field}"),
                    format!("must be a positive number, got {value}"),
                ))
            }
        }

        match *self {
            DetectionPolicy::RiseFall {
                rise_threshold,
                fall_threshold,
                epsilon,
            } => {
                positive("rise_threshold", rise_threshold)?;
                positive("fall_threshold", fall_threshold)?;
                non_negative("epsilon", epsilon)
            }
            DetectionPolicy::ThresholdAnd {
                gyro_threshold,
                accel_threshold,
            } => {
                non_negative("gyro_threshold", gyro_threshold)?;
                non_negative("accel_threshold", accel_threshold)
            }
            DetectionPolicy::DeltaBased {
                pitch_delta_threshold,
                accel_threshold,
            } => {
                non_negative("pitch_delta_threshold", pitch_delta_threshold)?;
                non_negative("accel_threshold", accel_threshold)
            }
            DetectionPolicy::GravityCompensated {
                accel_delta_threshold,
                ..
            } => non_negative("accel_delta_threshold", accel_delta_threshold),
        }
    }
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        DetectionPolicy::RiseFall {
            rise_threshold: 15.0,
            fall_threshold: 10.0,
            epsilon: default_epsilon(),
        }
    }
}

/// Policy discriminant, carried on emitted events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    RiseFall,
    ThresholdAnd,
    DeltaBased,
    GravityCompensated,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyKind::RiseFall => "rise_fall",
            PolicyKind::ThresholdAnd => "threshold_and",
            PolicyKind::DeltaBased => "delta_based",
            PolicyKind::GravityCompensated => "gravity_compensated",
        };
        f.write_str(name)
    }
}

/// Detector configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub policy: DetectionPolicy,
    /// Dead time after a hit, in milliseconds (80 to 150)
    pub cooldown_ms: u64,
}

impl DetectorSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_COOLDOWN_MS..=MAX_COOLDOWN_MS).contains(&self.cooldown_ms) {
            return Err(ConfigError::invalid(
                "detector.cooldown_ms",
                format!(
                    "must be within [{MIN_COOLDOWN_MS}, {MAX_COOLDOWN_MS}], got {}",
                    self.cooldown_ms
                ),
            ));
        }
        self.policy.validate()
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            policy: DetectionPolicy::default(),
            cooldown_ms: 120,
        }
    }
}

/// Everything a policy may look at for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorInput {
    pub timestamp: Duration,
    /// Fused pitch in degrees
    pub pitch: f32,
    /// Calibrated acceleration in g
    pub accel: Vector3<f32>,
    /// Calibrated angular rate in deg/s
    pub gyro: Vector3<f32>,
}

/// A detected strike.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HitEvent {
    #[serde(with = "duration_secs")]
    pub timestamp: Duration,
    /// Policy-specific strength: swing amplitude in degrees for rise/fall,
    /// acceleration in g otherwise
    pub strength: f32,
    pub policy: PolicyKind,
}

mod duration_secs {
    use core::time::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

/// Detector state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    Idle,
    /// Pitch is climbing; the running peak is being recorded
    Rising,
    /// Rise confirmed, waiting for the fall to reach its threshold
    Falling,
    /// Hits suppressed until the given timestamp
    Cooldown { until: Duration },
}

/// Gravity magnitude learned by the gravity-compensated policy.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GravityBaseline {
    count: u32,
    sum: f32,
    value: f32,
}

impl GravityBaseline {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            value: 1.0,
        }
    }
}

/// Per-stick detector state.
///
/// Holds only the previous sample, never a history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorState {
    pub phase: DetectorPhase,
    pub previous_pitch: Option<f32>,
    /// Highest pitch of the current rise
    pub peak: f32,
    /// Pitch where the current rise started
    pub valley: f32,
    baseline: GravityBaseline,
}

impl DetectorState {
    fn new() -> Self {
        Self {
            phase: DetectorPhase::Idle,
            previous_pitch: None,
            peak: 0.0,
            valley: 0.0,
            baseline: GravityBaseline::new(),
        }
    }
}

/// Hit detector for one stick.
///
/// # Example
/// ```
/// use core::time::Duration;
/// use nalgebra::Vector3;
/// use fusion_drumstick::{DetectionPolicy, DetectorInput, DetectorSettings, HitDetector};
///
/// let settings = DetectorSettings {
///     policy: DetectionPolicy::RiseFall { rise_threshold: 3.0, fall_threshold: 3.0, epsilon: 0.5 },
///     cooldown_ms: 100,
/// };
/// let mut detector = HitDetector::new(settings);
///
/// let hits: Vec<_> = [0.0, 2.0, 5.0, 9.0, 6.0, 3.0]
///     .iter()
///     .enumerate()
///     .filter_map(|(i, &pitch)| {
///         detector.update(&DetectorInput {
///             timestamp: Duration::from_millis(10 * i as u64),
///             pitch,
///             accel: Vector3::z(),
///             gyro: Vector3::zeros(),
///         })
///     })
///     .collect();
/// assert_eq!(hits.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct HitDetector {
    settings: DetectorSettings,
    state: DetectorState,
}

impl HitDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            state: DetectorState::new(),
        }
    }

    pub fn settings(&self) -> DetectorSettings {
        self.settings
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn phase(&self) -> DetectorPhase {
        self.state.phase
    }

    /// Return to the freshly created state.
    pub fn reset(&mut self) {
        self.state = DetectorState::new();
    }

    /// Use an externally measured gravity magnitude instead of learning one.
    pub fn seed_gravity(&mut self, magnitude: f32) {
        if let DetectionPolicy::GravityCompensated {
            baseline_samples, ..
        } = self.settings.policy
        {
            if magnitude.is_finite() && magnitude > 0.0 {
                self.state.baseline = GravityBaseline {
                    count: baseline_samples,
                    sum: magnitude * baseline_samples as f32,
                    value: magnitude,
                };
            }
        }
    }

    /// Gravity magnitude currently used by the gravity-compensated policy
    pub fn gravity_baseline(&self) -> f32 {
        self.state.baseline.value
    }

    /// Feed one sample. Returns the hit event when this sample completes a
    /// strike.
    pub fn update(&mut self, input: &DetectorInput) -> Option<HitEvent> {
        let previous = self.state.previous_pitch;
        self.state.previous_pitch = Some(input.pitch);

        if let DetectorPhase::Cooldown { until } = self.state.phase {
            if input.timestamp < until {
                self.track_baseline(input.accel.norm());
                return None;
            }
            self.state.phase = DetectorPhase::Idle;
        }

        let policy = self.settings.policy;
        let strength = match policy {
            DetectionPolicy::RiseFall {
                rise_threshold,
                fall_threshold,
                epsilon,
            } => self.rise_fall(input.pitch, previous?, rise_threshold, fall_threshold, epsilon),
            DetectionPolicy::ThresholdAnd {
                gyro_threshold,
                accel_threshold,
            } => {
                let rate = input.gyro.y.abs().max(input.gyro.z.abs());
                let accel = input.accel.norm();
                (rate > gyro_threshold && accel > accel_threshold).then_some(accel)
            }
            DetectionPolicy::DeltaBased {
                pitch_delta_threshold,
                accel_threshold,
            } => {
                let delta = (input.pitch - previous?).abs();
                let accel = input.accel.norm();
                (delta > pitch_delta_threshold && accel > accel_threshold).then_some(accel)
            }
            DetectionPolicy::GravityCompensated {
                accel_delta_threshold,
                baseline_samples,
            } => self.gravity_compensated(input.accel.norm(), accel_delta_threshold, baseline_samples),
        }?;

        self.state.phase = DetectorPhase::Cooldown {
            until: input.timestamp + self.settings.cooldown(),
        };
        self.state.peak = input.pitch;
        self.state.valley = input.pitch;

        let event = HitEvent {
            timestamp: input.timestamp,
            strength,
            policy: policy.kind(),
        };
        debug!(
            "Hit at {:.3}s via {} (strength {:.2})",
            event.timestamp.as_secs_f32(),
            event.policy,
            event.strength
        );
        Some(event)
    }

    fn rise_fall(
        &mut self,
        pitch: f32,
        previous: f32,
        rise_threshold: f32,
        fall_threshold: f32,
        epsilon: f32,
    ) -> Option<f32> {
        let delta = pitch - previous;
        let state = &mut self.state;

        match state.phase {
            DetectorPhase::Idle => {
                if delta > epsilon {
                    state.phase = DetectorPhase::Rising;
                    state.valley = previous;
                    state.peak = pitch;
                }
                None
            }
            DetectorPhase::Rising => {
                if delta > epsilon {
                    state.peak = state.peak.max(pitch);
                } else if delta < -epsilon {
                    state.phase = if state.peak - state.valley >= rise_threshold {
                        DetectorPhase::Falling
                    } else {
                        DetectorPhase::Idle
                    };
                }
                None
            }
            DetectorPhase::Falling => {
                if delta > epsilon {
                    // the fall completed on the sample that entered Falling
                    if state.peak - previous >= fall_threshold {
                        return Some(state.peak - state.valley);
                    }
                    // swing reversed before striking; treat as a new rise
                    state.phase = DetectorPhase::Rising;
                    state.valley = previous;
                    state.peak = pitch;
                    None
                } else {
                    let fall = state.peak - pitch;
                    (fall >= fall_threshold).then_some(state.peak - state.valley)
                }
            }
            DetectorPhase::Cooldown { .. } => None,
        }
    }

    fn gravity_compensated(&mut self, magnitude: f32, threshold: f32, required: u32) -> Option<f32> {
        let baseline = &mut self.state.baseline;
        if baseline.count < required {
            baseline.sum += magnitude;
            baseline.count += 1;
            baseline.value = baseline.sum / baseline.count as f32;
            return None;
        }

        let excess = magnitude - baseline.value;
        if excess > threshold {
            Some(excess)
        } else {
            self.track_baseline(magnitude);
            None
        }
    }

    /// Let the gravity baseline follow slow sensor drift.
    fn track_baseline(&mut self, magnitude: f32) {
        if let DetectionPolicy::GravityCompensated {
            baseline_samples, ..
        } = self.settings.policy
        {
            let baseline = &mut self.state.baseline;
            if baseline.count >= baseline_samples && magnitude.is_finite() {
                baseline.value += (magnitude - baseline.value) * BASELINE_TRACKING;
            }
        }
    }
}

impl Default for HitDetector {
    fn default() -> Self {
        Self::new(DetectorSettings::default())
    }
}
