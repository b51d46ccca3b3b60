use std::time::Instant;

use nalgebra::Vector3;

use crate::error::SensorError;
use crate::types::SensorSample;

/// Anything that can hand the fusion loop one sample per tick.
pub trait SampleSource: Send {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError>;
}

/// Register-mapped two-wire bus. The concrete bus is provided by the host.
pub trait RegisterBus: Send {
    fn write_register(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), SensorError>;
    fn read_registers(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<(), SensorError>;
}

// ─── Register map ────────────────────────────────────────────────────────────

pub const IMU_ADDR: u8 = 0x68;
pub const MAG_ADDR: u8 = 0x0D;

const IMU_PWR_MGMT_1: u8 = 0x6B;
const IMU_ACCEL_CONFIG: u8 = 0x1C;
const IMU_GYRO_CONFIG: u8 = 0x1B;
const IMU_ACCEL_XOUT_H: u8 = 0x3B;
const IMU_GYRO_XOUT_H: u8 = 0x43;

const MAG_DATA_X_L: u8 = 0x00;
const MAG_STATUS: u8 = 0x06;
const MAG_CONTROL_1: u8 = 0x09;
const MAG_SET_RESET_PERIOD: u8 = 0x0B;
const MAG_STATUS_DRDY: u8 = 0x01;

/// LSB per g at ±2 g full scale.
const ACCEL_LSB_PER_G: f32 = 16384.0;
/// LSB per deg/s at ±250 deg/s full scale.
const GYRO_LSB_PER_DPS: f32 = 131.0;

/// Continuous mode, 200 Hz, 8 G range, 512 oversampling.
const MAG_MODE_CONTINUOUS: u8 = 0x1D;

// ─── Inertial + magnetometer driver ──────────────────────────────────────────

/// 6-axis inertial unit plus 3-axis magnetometer sharing one bus.
pub struct InertialMagSource<B: RegisterBus> {
    bus: B,
    last_read: Option<Instant>,
    last_mag: Vector3<f32>,
    nominal_dt: f32,
}

impl<B: RegisterBus> InertialMagSource<B> {
    /// Runs the one-time power-on and mode configuration writes.
    pub fn new(mut bus: B, nominal_dt: f32) -> Result<Self, SensorError> {
        bus.write_register(IMU_ADDR, IMU_PWR_MGMT_1, 0x00)?;
        bus.write_register(IMU_ADDR, IMU_ACCEL_CONFIG, 0x00)?;
        bus.write_register(IMU_ADDR, IMU_GYRO_CONFIG, 0x00)?;

        bus.write_register(MAG_ADDR, MAG_SET_RESET_PERIOD, 0x01)?;
        bus.write_register(MAG_ADDR, MAG_CONTROL_1, MAG_MODE_CONTINUOUS)?;

        log::info!("Inertial (0x{:02X}) and magnetometer (0x{:02X}) configured", IMU_ADDR, MAG_ADDR);

        Ok(Self {
            bus,
            last_read: None,
            last_mag: Vector3::zeros(),
            nominal_dt,
        })
    }

    fn read_imu_axes(&mut self, reg: u8) -> Result<Vector3<i16>, SensorError> {
        let mut buf = [0u8; 6];
        self.bus.read_registers(IMU_ADDR, reg, &mut buf)?;
        Ok(decode_axes_be(&buf))
    }

    fn read_mag(&mut self) -> Result<Vector3<f32>, SensorError> {
        let mut status = [0u8; 1];
        self.bus.read_registers(MAG_ADDR, MAG_STATUS, &mut status)?;
        if status[0] & MAG_STATUS_DRDY == 0 {
            return Ok(self.last_mag);
        }

        let mut buf = [0u8; 6];
        self.bus.read_registers(MAG_ADDR, MAG_DATA_X_L, &mut buf)?;
        let raw = decode_axes_le(&buf);
        self.last_mag = raw.map(f32::from);
        Ok(self.last_mag)
    }
}

impl<B: RegisterBus> SampleSource for InertialMagSource<B> {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
        let accel = self.read_imu_axes(IMU_ACCEL_XOUT_H)?.map(|v| f32::from(v) / ACCEL_LSB_PER_G);
        let gyro = self.read_imu_axes(IMU_GYRO_XOUT_H)?.map(|v| f32::from(v) / GYRO_LSB_PER_DPS);
        let mag = self.read_mag()?;

        let now = Instant::now();
        let dt = match self.last_read {
            Some(prev) => now.duration_since(prev).as_secs_f32(),
            None => self.nominal_dt,
        };
        self.last_read = Some(now);

        Ok(SensorSample { accel, gyro, mag, dt })
    }
}

fn decode_axes_be(buf: &[u8; 6]) -> Vector3<i16> {
    Vector3::new(
        i16::from_be_bytes([buf[0], buf[1]]),
        i16::from_be_bytes([buf[2], buf[3]]),
        i16::from_be_bytes([buf[4], buf[5]]),
    )
}

fn decode_axes_le(buf: &[u8; 6]) -> Vector3<i16> {
    Vector3::new(
        i16::from_le_bytes([buf[0], buf[1]]),
        i16::from_le_bytes([buf[2], buf[3]]),
        i16::from_le_bytes([buf[4], buf[5]]),
    )
}

// ─── Synthetic source ────────────────────────────────────────────────────────

/// Slow left-to-right sweep with a gentle heading drift, for running the
/// fusion path without hardware.
pub struct MockSource {
    step: u64,
    dt: f32,
    sweep_rate_dps: f32,
    max_pitch: f32,
}

impl MockSource {
    pub fn new(dt: f32) -> Self {
        Self {
            step: 0,
            dt,
            sweep_rate_dps: 4.0,
            max_pitch: 60.0,
        }
    }
}

impl SampleSource for MockSource {
    fn read_sample(&mut self) -> Result<SensorSample, SensorError> {
        let t = self.step as f32 * self.dt;
        self.step += 1;

        let pitch = (t * self.sweep_rate_dps).min(self.max_pitch);
        let rate = if pitch < self.max_pitch { self.sweep_rate_dps } else { 0.0 };
        let (sin_p, cos_p) = pitch.to_radians().sin_cos();

        let heading = (20.0 + (t * 0.2).sin() * 2.0).to_radians();

        Ok(SensorSample {
            accel: Vector3::new(0.0, sin_p, cos_p),
            gyro: Vector3::new(rate, 0.0, 0.0),
            mag: Vector3::new(heading.cos() * 1200.0, heading.sin() * 1200.0, -400.0),
            dt: self.dt,
        })
    }
}
