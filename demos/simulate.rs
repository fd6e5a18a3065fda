//! Two simulated sticks on one shared bus
//!
//! Loads the shipped kit configuration, puts two simulated MPU-6050s on a
//! single bus (right hand at 0x68, left hand at 0x69), runs the blocking
//! calibration phase for both and then logs every hit with its zone.
//!
//! Run with: `RUST_LOG=info cargo run --example simulate`

use std::error::Error;
use std::thread;
use std::time::{Duration, Instant};

use fusion_drumstick::driver::{ACCEL_LSB_PER_G, GYRO_LSB_PER_DPS, MPU6050_FRAME_LEN};
use fusion_drumstick::{
    BusSensor, Hand, ImuBus, KitConfig, SensorError, SharedBus, StickRunner,
};
use log::info;
use nalgebra::Vector3;

const RIGHT_ADDRESS: u8 = 0x68;
const LEFT_ADDRESS: u8 = 0x69;
const RUN_TIME: Duration = Duration::from_secs(6);

/// Stroke pattern of one simulated stick
struct SimulatedStick {
    address: u8,
    /// Raw sensor bias the calibration profile removes
    accel_offset: Vector3<f32>,
    gyro_offset: Vector3<f32>,
    /// Time of the first stroke
    start: Duration,
    period: Duration,
    /// Yaw rate while pitch rises, turns the stick towards another drum
    turn_rate: f32,
}

impl SimulatedStick {
    /// Body-frame reading at time `t`: pitch up for 200 ms, back for 100 ms, rest.
    fn reading(&self, t: Duration) -> (Vector3<f32>, Vector3<f32>) {
        let gravity = Vector3::new(0.0, 0.0, 1.0);
        let Some(since_start) = t.checked_sub(self.start) else {
            return (gravity, Vector3::zeros());
        };
        let phase = since_start.as_secs_f32() % self.period.as_secs_f32();
        match phase {
            p if p < 0.2 => (gravity, Vector3::new(0.0, 200.0, self.turn_rate)),
            p if p < 0.3 => (gravity * 1.4, Vector3::new(0.0, -400.0, -2.0 * self.turn_rate)),
            _ => (gravity, Vector3::zeros()),
        }
    }
}

/// A bus that synthesizes MPU-6050 bursts.
struct SimulatedBus {
    epoch: Instant,
    sticks: Vec<SimulatedStick>,
}

impl ImuBus for SimulatedBus {
    fn read_registers(
        &mut self,
        address: u8,
        _register: u8,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, SensorError> {
        let stick = self
            .sticks
            .iter()
            .find(|stick| stick.address == address)
            .ok_or(SensorError::Timeout(timeout))?;

        let (accel, gyro) = stick.reading(self.epoch.elapsed());
        let accel = (accel + stick.accel_offset) * ACCEL_LSB_PER_G;
        let gyro = (gyro + stick.gyro_offset) * GYRO_LSB_PER_DPS;
        let words = [accel.x, accel.y, accel.z, 0.0, gyro.x, gyro.y, gyro.z];

        let len = buffer.len().min(MPU6050_FRAME_LEN);
        for (i, word) in words.iter().enumerate() {
            let bytes = (word.clamp(i16::MIN as f32, i16::MAX as f32) as i16).to_be_bytes();
            if 2 * i + 1 < len {
                buffer[2 * i..2 * i + 2].copy_from_slice(&bytes);
            }
        }
        Ok(len)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    let mut config = KitConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/kit.json"))?;
    // one second of stillness is plenty for a simulated sensor
    config.sampling.calibration_samples = 100;
    let kit = config.kit()?;

    let (right_profile, _) = config.profile(Hand::Right);
    let (left_profile, _) = config.profile(Hand::Left);
    let bus = SharedBus::new(SimulatedBus {
        epoch: Instant::now(),
        sticks: vec![
            SimulatedStick {
                address: RIGHT_ADDRESS,
                accel_offset: right_profile.accel_offset,
                gyro_offset: right_profile.gyro_offset,
                start: Duration::from_millis(1500),
                period: Duration::from_millis(800),
                turn_rate: 0.0,
            },
            SimulatedStick {
                address: LEFT_ADDRESS,
                accel_offset: left_profile.accel_offset,
                gyro_offset: left_profile.gyro_offset,
                start: Duration::from_millis(1900),
                period: Duration::from_millis(1100),
                turn_rate: 60.0,
            },
        ],
    });

    let timeout = config.sampling.read_timeout();
    let handles = [(Hand::Right, RIGHT_ADDRESS), (Hand::Left, LEFT_ADDRESS)]
        .into_iter()
        .map(|(hand, address)| {
            StickRunner::spawn(
                config.stick_context(hand, kit.clone()),
                BusSensor::new(bus.clone(), address, timeout),
                config.sampling,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let started = Instant::now();
    let mut last_seen = vec![None; handles.len()];
    while started.elapsed() < RUN_TIME {
        for (handle, seen) in handles.iter().zip(last_seen.iter_mut()) {
            let Some(hit) = handle.snapshot().last_hit else {
                continue;
            };
            let timestamp = hit.hit.map(|event| event.timestamp);
            if *seen != timestamp {
                *seen = timestamp;
                info!(
                    "{} stick hit {} (pitch {:.1}, adjusted {:.1}, yaw {:.1})",
                    hit.hand,
                    hit.zone_name.as_deref().unwrap_or("air"),
                    hit.orientation.pitch,
                    hit.adjusted_pitch,
                    hit.orientation.yaw,
                );
            }
        }
        thread::sleep(Duration::from_millis(20));
    }

    for handle in handles {
        let diagnostics = handle.diagnostics();
        println!(
            "{}: {} ticks, {} skipped, {} hits, profile {:?}",
            diagnostics.hand,
            diagnostics.ticks,
            diagnostics.skipped_ticks,
            diagnostics.hits,
            diagnostics.profile
        );
    }
    Ok(())
}
