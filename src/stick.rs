//! Per-stick processing context
//!
//! A [`StickContext`] owns everything that changes while one stick is
//! tracked: its calibration, baseline, orientation filter and hit detector.
//! Kit-wide data that never changes after load lives in a shared [`Kit`].

use std::sync::Arc;

use log::{debug, info, trace, warn};
use nalgebra::Vector3;
use serde::Serialize;

use crate::baseline::SensorBaseline;
use crate::calibration::{self, CalibrationProfile, ProfileSource};
use crate::collision::CollisionResolver;
use crate::detector::{DetectorInput, DetectorSettings, HitDetector, HitEvent};
use crate::error::SensorError;
use crate::estimator::{FilterSettings, OrientationEstimator};
use crate::kinematics::StickGeometry;
use crate::types::{Hand, Orientation, SensorSample};

/// Read-only kit data shared by every stick.
#[derive(Debug, Clone, PartialEq)]
pub struct Kit {
    pub geometry: StickGeometry,
    pub resolver: CollisionResolver,
}

impl Kit {
    pub fn new(geometry: StickGeometry, resolver: CollisionResolver) -> Self {
        Self { geometry, resolver }
    }
}

impl Default for Kit {
    fn default() -> Self {
        Self::new(StickGeometry::default(), CollisionResolver::default())
    }
}

/// Result of processing one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StickOutput {
    pub hand: Hand,
    pub orientation: Orientation,
    pub is_hit: bool,
    /// Details of the hit when `is_hit` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit: Option<HitEvent>,
    /// Zone currently under the tip
    pub zone_name: Option<String>,
    /// Pitch that rests the tip on `zone_name`'s surface, or the fused pitch
    pub adjusted_pitch: f32,
    pub tip: Vector3<f32>,
}

/// Health counters for one stick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StickDiagnostics {
    pub hand: Hand,
    pub profile: ProfileSource,
    /// Samples collected by the most recent calibration phase
    pub baseline_samples: usize,
    pub ticks: u64,
    /// Ticks lost to sensor read failures
    pub skipped_ticks: u64,
    /// Failed reads since the last successful one
    pub consecutive_skips: u64,
    pub hits: u64,
    pub last_error: Option<String>,
}

impl StickDiagnostics {
    fn new(hand: Hand, profile: ProfileSource) -> Self {
        Self {
            hand,
            profile,
            baseline_samples: 0,
            ticks: 0,
            skipped_ticks: 0,
            consecutive_skips: 0,
            hits: 0,
            last_error: None,
        }
    }
}

/// All mutable tracking state of one stick.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use core::time::Duration;
/// use nalgebra::Vector3;
/// use fusion_drumstick::{Hand, Kit, SensorSample, StickContext};
///
/// let mut stick = StickContext::with_defaults(Hand::Right, Arc::new(Kit::default()));
/// let output = stick.process(&SensorSample::new(
///     Vector3::new(0.0, 0.0, 1.0),
///     Vector3::zeros(),
///     Duration::ZERO,
/// ));
/// assert!(!output.is_hit);
/// ```
#[derive(Debug, Clone)]
pub struct StickContext {
    hand: Hand,
    profile: CalibrationProfile,
    baseline: SensorBaseline,
    estimator: OrientationEstimator,
    detector: HitDetector,
    kit: Arc<Kit>,
    diagnostics: StickDiagnostics,
}

impl StickContext {
    pub fn new(
        hand: Hand,
        profile: CalibrationProfile,
        profile_source: ProfileSource,
        filter: FilterSettings,
        detector: DetectorSettings,
        kit: Arc<Kit>,
    ) -> Self {
        Self {
            hand,
            profile,
            baseline: SensorBaseline::neutral(),
            estimator: OrientationEstimator::with_settings(filter),
            detector: HitDetector::new(detector),
            kit,
            diagnostics: StickDiagnostics::new(hand, profile_source),
        }
    }

    /// Identity calibration and default filter and detector settings.
    pub fn with_defaults(hand: Hand, kit: Arc<Kit>) -> Self {
        Self::new(
            hand,
            CalibrationProfile::identity(),
            ProfileSource::Identity {
                reason: "no profile configured".to_string(),
            },
            FilterSettings::default(),
            DetectorSettings::default(),
            kit,
        )
    }

    pub fn hand(&self) -> Hand {
        self.hand
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    pub fn baseline(&self) -> &SensorBaseline {
        &self.baseline
    }

    pub fn orientation(&self) -> Orientation {
        self.estimator.orientation()
    }

    pub fn detector(&self) -> &HitDetector {
        &self.detector
    }

    pub fn kit(&self) -> &Kit {
        &self.kit
    }

    pub fn diagnostics(&self) -> &StickDiagnostics {
        &self.diagnostics
    }

    /// Offset, scale and axis correction of a raw sample, without the dead
    /// zone. Baseline collection works on these samples.
    pub fn correct(&self, sample: &SensorSample) -> SensorSample {
        let (accel, gyro) = calibration::correct(sample.accel, sample.gyro, &self.profile);
        SensorSample::new(accel, gyro, sample.timestamp)
    }

    /// Install a new stationary baseline.
    ///
    /// Orientation and detector state start over from zero; the detector's
    /// gravity reference is taken from the baseline.
    pub fn recalibrate(&mut self, baseline: SensorBaseline) {
        self.baseline = baseline;
        self.estimator.reset();
        self.detector.reset();
        self.detector.seed_gravity(baseline.gravity_magnitude());
        self.diagnostics.baseline_samples = baseline.samples;
        debug!(
            "{} stick recalibrated from {} samples",
            self.hand, baseline.samples
        );
    }

    /// Run one raw sample through the full pipeline.
    pub fn process(&mut self, sample: &SensorSample) -> StickOutput {
        // bias comes off before the dead zone, so rest noise is suppressed
        let corrected = self.correct(sample);
        let accel = self.profile.apply_dead_zone(corrected.accel);
        let gyro = self
            .profile
            .apply_dead_zone(corrected.gyro - self.baseline.gyro_bias);

        let orientation = self.estimator.update_at(accel, gyro, sample.timestamp);
        let hit = self.detector.update(&DetectorInput {
            timestamp: sample.timestamp,
            pitch: orientation.pitch,
            accel,
            gyro,
        });

        let Kit { geometry, resolver } = &*self.kit;
        let grip = geometry.grip_position(orientation.pitch, orientation.yaw, self.hand, accel.x);
        let tip = grip + geometry.tip_offset(orientation.pitch, orientation.yaw);
        let strike = resolver.detect(&tip, grip.y, orientation.pitch, geometry);
        let zone_name = strike.zone_name().map(str::to_owned);

        self.diagnostics.ticks += 1;
        if self.diagnostics.consecutive_skips > 0 {
            info!(
                "{} stick reading again after {} failed reads",
                self.hand, self.diagnostics.consecutive_skips
            );
            self.diagnostics.consecutive_skips = 0;
        }
        if hit.is_some() {
            self.diagnostics.hits += 1;
            debug!(
                "{} stick hit {} at pitch {:.1}",
                self.hand,
                zone_name.as_deref().unwrap_or("nothing"),
                orientation.pitch
            );
        }

        StickOutput {
            hand: self.hand,
            orientation,
            is_hit: hit.is_some(),
            hit,
            zone_name,
            adjusted_pitch: strike.adjusted_pitch,
            tip,
        }
    }

    /// Record a failed read. Orientation and detector state are untouched.
    ///
    /// Only the first failure of a run is logged as a warning.
    pub fn skip_tick(&mut self, error: &SensorError) {
        let diagnostics = &mut self.diagnostics;
        diagnostics.skipped_ticks += 1;
        diagnostics.consecutive_skips += 1;
        diagnostics.last_error = Some(error.to_string());
        if diagnostics.consecutive_skips == 1 {
            warn!("{} stick skipped a tick: {error}", self.hand);
        } else {
            trace!("{} stick skipped a tick: {error}", self.hand);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::BaselineCollector;
    use core::time::Duration;

    fn at_rest(tick: u64) -> SensorSample {
        SensorSample::new(
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(-4.0, 1.0, 0.0),
            Duration::from_millis(10 * tick),
        )
    }

    #[test]
    fn test_baseline_removes_gyro_bias() {
        let mut stick = StickContext::with_defaults(Hand::Right, Arc::new(Kit::default()));
        stick.recalibrate(SensorBaseline {
            gyro_bias: Vector3::new(-4.0, 1.0, 0.0),
            gravity: Vector3::z(),
            samples: 300,
        });

        for tick in 0..500 {
            stick.process(&at_rest(tick));
        }
        let o = stick.orientation();
        assert!(o.roll.abs() < 1e-3 && o.pitch.abs() < 1e-3 && o.yaw.abs() < 1e-3);
        assert_eq!(stick.diagnostics().ticks, 500);
        assert_eq!(stick.diagnostics().baseline_samples, 300);
    }

    #[test]
    fn test_dead_zone_applies_after_bias() {
        let profile = CalibrationProfile {
            dead_zone: 0.5,
            ..CalibrationProfile::identity()
        };
        let mut stick = StickContext::new(
            Hand::Right,
            profile,
            ProfileSource::Loaded,
            FilterSettings::default(),
            DetectorSettings::default(),
            Arc::new(Kit::default()),
        );
        // bias 0.4 deg/s on z with noise that straddles the dead zone
        let noisy = |tick: u64| {
            let rate = if tick % 2 == 0 { 0.6 } else { 0.2 };
            SensorSample::new(
                Vector3::z(),
                Vector3::new(0.0, 0.0, rate),
                Duration::from_millis(10 * tick),
            )
        };

        let mut collector = BaselineCollector::new(100);
        for tick in 0..100 {
            collector.push(&stick.correct(&noisy(tick)));
        }
        stick.recalibrate(collector.finish().unwrap());
        assert!((stick.baseline().gyro_bias.z - 0.4).abs() < 1e-5);

        for tick in 0..1_000 {
            stick.process(&noisy(tick));
        }
        assert_eq!(stick.orientation().yaw, 0.0);
    }

    #[test]
    fn test_uncorrected_bias_drifts_yaw() {
        let mut stick = StickContext::with_defaults(Hand::Right, Arc::new(Kit::default()));
        for tick in 0..101 {
            stick.process(&SensorSample::new(
                Vector3::z(),
                Vector3::new(0.0, 0.0, 5.0),
                Duration::from_millis(10 * tick),
            ));
        }
        assert!((stick.orientation().yaw - 5.0).abs() < 1e-2);
    }

    #[test]
    fn test_skip_tick_keeps_state() {
        let mut stick = StickContext::with_defaults(Hand::Left, Arc::new(Kit::default()));
        for tick in 0..50 {
            stick.process(&at_rest(tick));
        }
        let before = stick.orientation();
        stick.skip_tick(&SensorError::Timeout(Duration::from_millis(20)));

        assert_eq!(stick.orientation(), before);
        let diagnostics = stick.diagnostics();
        assert_eq!(diagnostics.skipped_ticks, 1);
        assert_eq!(diagnostics.ticks, 50);
        assert!(diagnostics.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_consecutive_skips_reset_on_read() {
        let mut stick = StickContext::with_defaults(Hand::Right, Arc::new(Kit::default()));
        for _ in 0..5 {
            stick.skip_tick(&SensorError::Disconnected);
        }
        assert_eq!(stick.diagnostics().consecutive_skips, 5);

        stick.process(&at_rest(0));
        let diagnostics = stick.diagnostics();
        assert_eq!(diagnostics.consecutive_skips, 0);
        assert_eq!(diagnostics.skipped_ticks, 5);
    }

    #[test]
    fn test_level_output() {
        let mut stick = StickContext::with_defaults(Hand::Right, Arc::new(Kit::default()));
        let output = stick.process(&at_rest(0));
        assert_eq!(output.hand, Hand::Right);
        assert!(!output.is_hit);
        assert!(output.hit.is_none());
        assert_eq!(output.adjusted_pitch, output.orientation.pitch);
        // a level stick hovers above the kit
        assert!(output.zone_name.is_none());
    }
}
