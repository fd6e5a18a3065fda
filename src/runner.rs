//! Producer loop for one stick
//!
//! Each stick runs on its own thread: a blocking calibration phase, then a
//! fixed-rate polling loop. The most recent result is published into a
//! mutex-guarded [`Snapshot`] that any number of readers may copy out.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineCollector, DEFAULT_BASELINE_SAMPLES};
use crate::driver::SensorSource;
use crate::error::ConfigError;
use crate::stick::{StickContext, StickDiagnostics, StickOutput};
use crate::types::Hand;

/// Polling and calibration parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    /// Target polling rate in Hz
    pub poll_rate_hz: f32,
    /// Longest a single sensor read may block
    pub read_timeout_ms: u64,
    /// Stationary samples collected before tracking starts
    pub calibration_samples: usize,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            poll_rate_hz: 100.0,
            read_timeout_ms: 20,
            calibration_samples: DEFAULT_BASELINE_SAMPLES,
        }
    }
}

impl SamplingSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.poll_rate_hz.is_finite() && self.poll_rate_hz > 0.0) {
            return Err(ConfigError::invalid(
                "sampling.poll_rate_hz",
                format!("must be a positive number, got {}", self.poll_rate_hz),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::invalid("sampling.read_timeout_ms", "must be non-zero"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.poll_rate_hz)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Lifecycle of a stick loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunnerPhase {
    /// Collecting the stationary baseline; the stick must be held still
    Calibrating { collected: usize, required: usize },
    Running,
    Stopped,
}

/// Latest published state of one stick.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub phase: RunnerPhase,
    pub latest: Option<StickOutput>,
    /// Most recent output that carried a hit
    pub last_hit: Option<StickOutput>,
    pub diagnostics: StickDiagnostics,
}

type SharedSnapshot = Arc<Mutex<Snapshot>>;

fn lock(snapshot: &SharedSnapshot) -> MutexGuard<'_, Snapshot> {
    snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Spawns stick loops.
pub struct StickRunner;

impl StickRunner {
    /// Start tracking a stick on a dedicated thread.
    ///
    /// The returned handle stops and joins the thread when dropped.
    pub fn spawn<S>(
        context: StickContext,
        source: S,
        sampling: SamplingSettings,
    ) -> io::Result<StickHandle>
    where
        S: SensorSource + Send + 'static,
    {
        let hand = context.hand();
        let snapshot = Arc::new(Mutex::new(Snapshot {
            phase: RunnerPhase::Calibrating {
                collected: 0,
                required: sampling.calibration_samples.max(1),
            },
            latest: None,
            last_hit: None,
            diagnostics: context.diagnostics().clone(),
        }));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let snapshot = Arc::clone(&snapshot);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("{hand}-stick"))
                .spawn(move || run(context, source, sampling, &snapshot, &stop))?
        };

        Ok(StickHandle {
            hand,
            snapshot,
            stop,
            thread: Some(thread),
        })
    }
}

fn pace(started: Instant, interval: Duration) {
    if let Some(rest) = interval.checked_sub(started.elapsed()) {
        thread::sleep(rest);
    }
}

fn run<S: SensorSource>(
    mut context: StickContext,
    mut source: S,
    sampling: SamplingSettings,
    snapshot: &SharedSnapshot,
    stop: &AtomicBool,
) -> StickContext {
    let hand = context.hand();
    let interval = sampling.poll_interval();
    let mut collector = BaselineCollector::new(sampling.calibration_samples);
    info!(
        "{hand} stick: hold still, collecting {} baseline samples",
        collector.required()
    );

    while !collector.is_complete() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let started = Instant::now();
        match source.read_sample() {
            Ok(sample) => {
                collector.push(&context.correct(&sample));
            }
            Err(err) => context.skip_tick(&err),
        }
        {
            let mut shared = lock(snapshot);
            shared.phase = RunnerPhase::Calibrating {
                collected: collector.count(),
                required: collector.required(),
            };
            shared.diagnostics = context.diagnostics().clone();
        }
        pace(started, interval);
    }

    if let Some(baseline) = collector.finish() {
        context.recalibrate(baseline);
        lock(snapshot).phase = RunnerPhase::Running;
        info!("{hand} stick tracking at {} Hz", sampling.poll_rate_hz);
    }

    while !stop.load(Ordering::Relaxed) {
        let started = Instant::now();
        match source.read_sample() {
            Ok(sample) => {
                let output = context.process(&sample);
                let mut shared = lock(snapshot);
                if output.is_hit {
                    shared.last_hit = Some(output.clone());
                }
                shared.latest = Some(output);
                shared.diagnostics = context.diagnostics().clone();
            }
            Err(err) => {
                context.skip_tick(&err);
                lock(snapshot).diagnostics = context.diagnostics().clone();
            }
        }
        pace(started, interval);
    }

    let mut shared = lock(snapshot);
    shared.phase = RunnerPhase::Stopped;
    shared.diagnostics = context.diagnostics().clone();
    context
}

/// Handle to a running stick loop.
#[derive(Debug)]
pub struct StickHandle {
    hand: Hand,
    snapshot: SharedSnapshot,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<StickContext>>,
}

impl StickHandle {
    pub fn hand(&self) -> Hand {
        self.hand
    }

    /// Copy of the full published state
    pub fn snapshot(&self) -> Snapshot {
        lock(&self.snapshot).clone()
    }

    /// Most recent per-tick output, `None` until calibration has finished
    pub fn latest(&self) -> Option<StickOutput> {
        lock(&self.snapshot).latest.clone()
    }

    pub fn phase(&self) -> RunnerPhase {
        lock(&self.snapshot).phase
    }

    pub fn diagnostics(&self) -> StickDiagnostics {
        lock(&self.snapshot).diagnostics.clone()
    }

    /// Ask the loop to finish after its current tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop the loop and take back its context.
    ///
    /// Returns `None` if the loop thread panicked.
    pub fn join(mut self) -> Option<StickContext> {
        self.stop();
        self.thread.take()?.join().ok()
    }
}

impl Drop for StickHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("{} stick loop panicked", self.hand);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::stick::Kit;
    use crate::types::SensorSample;
    use nalgebra::Vector3;

    /// Replays a fixed list of reads, then reports a disconnected sensor.
    struct Replay {
        reads: std::vec::IntoIter<Result<SensorSample, SensorError>>,
    }

    impl SensorSource for Replay {
        fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
            self.reads.next().unwrap_or(Err(SensorError::Disconnected))
        }
    }

    fn fast_sampling(calibration_samples: usize) -> SamplingSettings {
        SamplingSettings {
            poll_rate_hz: 2000.0,
            read_timeout_ms: 5,
            calibration_samples,
        }
    }

    fn wait_until(handle: &StickHandle, done: impl Fn(&Snapshot) -> bool) -> Snapshot {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = handle.snapshot();
            if done(&snapshot) || Instant::now() > deadline {
                return snapshot;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_sampling_validation() {
        assert!(SamplingSettings::default().validate().is_ok());
        let zero_rate = SamplingSettings {
            poll_rate_hz: 0.0,
            ..Default::default()
        };
        assert!(zero_rate.validate().is_err());
        assert_eq!(
            SamplingSettings::default().poll_interval(),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn test_calibrates_then_tracks() {
        let bias = Vector3::new(2.0, -1.0, 0.5);
        let reads = (0..40u64)
            .map(|i| {
                Ok(SensorSample::new(
                    Vector3::z(),
                    bias,
                    Duration::from_millis(10 * i),
                ))
            })
            .collect::<Vec<_>>();
        let context = StickContext::with_defaults(Hand::Right, Arc::new(Kit::default()));
        let handle = StickRunner::spawn(
            context,
            Replay {
                reads: reads.into_iter(),
            },
            fast_sampling(10),
        )
        .unwrap();

        let snapshot = wait_until(&handle, |s| s.diagnostics.ticks == 30);
        assert_eq!(snapshot.phase, RunnerPhase::Running);
        assert_eq!(snapshot.diagnostics.baseline_samples, 10);

        let context = handle.join().unwrap();
        assert_eq!(context.baseline().gyro_bias, bias);
        let o = context.orientation();
        assert!(o.roll.abs() < 1e-4 && o.pitch.abs() < 1e-4 && o.yaw.abs() < 1e-4);
    }

    #[test]
    fn test_failed_reads_are_skipped() {
        let sample = |i: u64| -> Result<SensorSample, SensorError> {
            Ok(SensorSample::new(
                Vector3::z(),
                Vector3::zeros(),
                Duration::from_millis(10 * i),
            ))
        };
        let reads = vec![
            sample(0),
            Err(SensorError::Bus("nack".to_string())),
            sample(1),
            sample(2),
        ];
        let context = StickContext::with_defaults(Hand::Left, Arc::new(Kit::default()));
        let handle = StickRunner::spawn(
            context,
            Replay {
                reads: reads.into_iter(),
            },
            fast_sampling(1),
        )
        .unwrap();

        let snapshot = wait_until(&handle, |s| s.diagnostics.ticks == 2);
        assert_eq!(snapshot.diagnostics.ticks, 2);
        assert!(snapshot.diagnostics.skipped_ticks >= 1);
        assert!(snapshot.latest.is_some());
    }

    #[test]
    fn test_stop_during_calibration() {
        let context = StickContext::with_defaults(Hand::Right, Arc::new(Kit::default()));
        let handle = StickRunner::spawn(
            context,
            Replay {
                reads: Vec::new().into_iter(),
            },
            fast_sampling(1_000_000),
        )
        .unwrap();

        handle.stop();
        let snapshot = wait_until(&handle, |s| s.phase == RunnerPhase::Stopped);
        assert_eq!(snapshot.phase, RunnerPhase::Stopped);
        assert!(snapshot.latest.is_none());
    }
}
