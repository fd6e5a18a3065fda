//! Sensor sources
//!
//! The pipeline only needs something that yields one [`SensorSample`] per
//! tick. Two sources are provided: [`BusSensor`] reads an MPU-6050 style
//! device over a (possibly shared) register bus, and [`ChannelSource`]
//! receives samples pushed by another thread.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::warn;
use nalgebra::Vector3;

use crate::error::SensorError;
use crate::types::SensorSample;

/// First register of the accelerometer/temperature/gyroscope burst
pub const MPU6050_BURST_REGISTER: u8 = 0x3B;
/// Length of the burst in bytes
pub const MPU6050_FRAME_LEN: usize = 14;
/// Accelerometer sensitivity at ±2 g
pub const ACCEL_LSB_PER_G: f32 = 16384.0;
/// Gyroscope sensitivity at ±250 °/s
pub const GYRO_LSB_PER_DPS: f32 = 131.0;

/// Anything that produces samples for one stick.
pub trait SensorSource {
    /// Read the next sample. Errors are per tick and never fatal.
    fn read_sample(&mut self) -> Result<SensorSample, SensorError>;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
        (**self).read_sample()
    }
}

/// Register-level transport (I2C or similar).
///
/// Implementations must give up after `timeout` and return
/// [`SensorError::Timeout`] so a stalled device cannot block its stick.
pub trait ImuBus {
    /// Read `buffer.len()` consecutive registers starting at `register`.
    ///
    /// Returns the number of bytes actually read.
    fn read_registers(
        &mut self,
        address: u8,
        register: u8,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, SensorError>;
}

/// A bus shared between several devices.
///
/// Every transaction holds the bus lock for its full length so reads from
/// two sticks never interleave inside one multi-register burst.
#[derive(Debug)]
pub struct SharedBus<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: ImuBus> SharedBus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }

    /// Run `f` with exclusive access to the bus.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut B) -> T) -> T {
        let mut bus = self.lock();
        f(&mut bus)
    }

    fn lock(&self) -> MutexGuard<'_, B> {
        // A panic in another stick's transaction leaves the bus itself usable
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One MPU-6050 on a shared bus.
#[derive(Debug)]
pub struct BusSensor<B> {
    bus: SharedBus<B>,
    address: u8,
    timeout: Duration,
    epoch: Instant,
}

impl<B: ImuBus> BusSensor<B> {
    /// Timestamps are measured from the moment the sensor is created.
    pub fn new(bus: SharedBus<B>, address: u8, timeout: Duration) -> Self {
        Self {
            bus,
            address,
            timeout,
            epoch: Instant::now(),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }
}

impl<B: ImuBus> SensorSource for BusSensor<B> {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
        let mut frame = [0u8; MPU6050_FRAME_LEN];
        let (address, timeout) = (self.address, self.timeout);
        let read = self.bus.transaction(|bus| {
            bus.read_registers(address, MPU6050_BURST_REGISTER, &mut frame, timeout)
        })?;
        decode_mpu6050(&frame[..read.min(MPU6050_FRAME_LEN)], self.epoch.elapsed())
    }
}

/// Decode the 14-byte accelerometer/temperature/gyroscope burst.
///
/// Registers are big-endian signed 16-bit values in the order
/// `ax ay az temp gx gy gz`; full-scale ranges are ±2 g and ±250 °/s.
pub fn decode_mpu6050(frame: &[u8], timestamp: Duration) -> Result<SensorSample, SensorError> {
    if frame.len() != MPU6050_FRAME_LEN {
        return Err(SensorError::Frame {
            expected: MPU6050_FRAME_LEN,
            actual: frame.len(),
        });
    }

    let word = |index: usize| i16::from_be_bytes([frame[2 * index], frame[2 * index + 1]]) as f32;
    let accel = Vector3::new(word(0), word(1), word(2)) / ACCEL_LSB_PER_G;
    // word 3 is the die temperature
    let gyro = Vector3::new(word(4), word(5), word(6)) / GYRO_LSB_PER_DPS;

    Ok(SensorSample::new(accel, gyro, timestamp))
}

/// Samples pushed from another thread, e.g. a vendor callback.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: Receiver<SensorSample>,
    timeout: Duration,
    disconnected: bool,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<SensorSample>, timeout: Duration) -> Self {
        Self {
            receiver,
            timeout,
            disconnected: false,
        }
    }

    /// True once every sender has been dropped
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

impl SensorSource for ChannelSource {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
        if self.disconnected {
            return Err(SensorError::Disconnected);
        }
        self.receiver
            .recv_timeout(self.timeout)
            .map_err(|err| match err {
                RecvTimeoutError::Timeout => SensorError::Timeout(self.timeout),
                RecvTimeoutError::Disconnected => {
                    warn!("Sample channel closed");
                    self.disconnected = true;
                    SensorError::Disconnected
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn encode(accel: [i16; 3], gyro: [i16; 3]) -> [u8; MPU6050_FRAME_LEN] {
        let mut frame = [0u8; MPU6050_FRAME_LEN];
        for (i, value) in accel.iter().chain(&[0i16]).chain(gyro.iter()).enumerate() {
            frame[2 * i..2 * i + 2].copy_from_slice(&value.to_be_bytes());
        }
        frame
    }

    /// Bus that serves fixed frames per address and records transactions.
    struct FakeBus {
        frames: Vec<(u8, [u8; MPU6050_FRAME_LEN])>,
        log: Vec<u8>,
    }

    impl ImuBus for FakeBus {
        fn read_registers(
            &mut self,
            address: u8,
            register: u8,
            buffer: &mut [u8],
            timeout: Duration,
        ) -> Result<usize, SensorError> {
            assert_eq!(register, MPU6050_BURST_REGISTER);
            self.log.push(address);
            let (_, frame) = self
                .frames
                .iter()
                .find(|(a, _)| *a == address)
                .ok_or(SensorError::Timeout(timeout))?;
            buffer.copy_from_slice(frame);
            Ok(buffer.len())
        }
    }

    #[test]
    fn test_decode_scaling() {
        let frame = encode([0, -8192, 16384], [131, -262, 0]);
        let sample = decode_mpu6050(&frame, Duration::from_millis(5)).unwrap();
        assert_eq!(sample.accel, Vector3::new(0.0, -0.5, 1.0));
        assert_eq!(sample.gyro, Vector3::new(1.0, -2.0, 0.0));
        assert_eq!(sample.timestamp, Duration::from_millis(5));
    }

    #[test]
    fn test_decode_short_frame() {
        let frame = [0u8; 6];
        assert_eq!(
            decode_mpu6050(&frame, Duration::ZERO),
            Err(SensorError::Frame {
                expected: MPU6050_FRAME_LEN,
                actual: 6
            })
        );
    }

    #[test]
    fn test_two_sensors_share_bus() {
        let bus = SharedBus::new(FakeBus {
            frames: vec![
                (0x68, encode([0, 0, 16384], [0, 0, 0])),
                (0x69, encode([16384, 0, 0], [0, 0, 0])),
            ],
            log: Vec::new(),
        });
        let mut right = BusSensor::new(bus.clone(), 0x68, Duration::from_millis(10));
        let mut left = BusSensor::new(bus.clone(), 0x69, Duration::from_millis(10));

        assert_eq!(right.read_sample().unwrap().accel, Vector3::z());
        assert_eq!(left.read_sample().unwrap().accel, Vector3::x());
        assert_eq!(bus.transaction(|b| b.log.clone()), vec![0x68, 0x69]);
    }

    #[test]
    fn test_bus_errors_propagate() {
        let bus = SharedBus::new(FakeBus {
            frames: Vec::new(),
            log: Vec::new(),
        });
        let mut sensor = BusSensor::new(bus, 0x68, Duration::from_millis(3));
        assert_eq!(
            sensor.read_sample(),
            Err(SensorError::Timeout(Duration::from_millis(3)))
        );
    }

    #[test]
    fn test_channel_source() {
        let (tx, rx) = mpsc::channel();
        let mut source = ChannelSource::new(rx, Duration::from_millis(1));
        assert_eq!(
            source.read_sample(),
            Err(SensorError::Timeout(Duration::from_millis(1)))
        );

        let sample = SensorSample::new(Vector3::z(), Vector3::zeros(), Duration::ZERO);
        tx.send(sample).unwrap();
        assert_eq!(source.read_sample(), Ok(sample));

        drop(tx);
        assert!(!source.is_disconnected());
        assert_eq!(source.read_sample(), Err(SensorError::Disconnected));
        assert!(source.is_disconnected());
        // stays disconnected without waiting on the channel again
        let started = Instant::now();
        assert_eq!(source.read_sample(), Err(SensorError::Disconnected));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
