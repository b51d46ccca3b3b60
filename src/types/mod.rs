use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One fused tick worth of raw readings.
///
/// `accel` is in g, `gyro` in deg/s, `mag` in raw magnetometer counts and
/// `dt` is the monotonic time since the previous sample in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorSample {
    pub accel: Vector3<f32>,
    pub gyro: Vector3<f32>,
    pub mag: Vector3<f32>,
    pub dt: f32,
}

impl SensorSample {
    pub fn new(accel: (f32, f32, f32), gyro: (f32, f32, f32), mag: (f32, f32, f32), dt: f32) -> Self {
        Self {
            accel: Vector3::new(accel.0, accel.1, accel.2),
            gyro: Vector3::new(gyro.0, gyro.1, gyro.2),
            mag: Vector3::new(mag.0, mag.1, mag.2),
            dt,
        }
    }
}

/// Fused attitude, all angles in degrees. `heading` is always in `[0, 360)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationEstimate {
    pub pitch: f32,
    pub roll: f32,
    pub heading: f32,
}

/// Origin captured at calibration time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReference {
    pub pitch: f32,
    pub roll: f32,
    pub heading: f32,
}

impl From<OrientationEstimate> for CalibrationReference {
    fn from(estimate: OrientationEstimate) -> Self {
        Self {
            pitch: estimate.pitch,
            roll: estimate.roll,
            heading: estimate.heading,
        }
    }
}

/// Canonical reading-session state shared by every consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    pub position: u32,
    pub calibrated: bool,
    pub running: bool,
    pub total_chars: u32,
}

impl PositionState {
    /// Last valid index, or `None` while no total is configured.
    pub fn last_index(&self) -> Option<u32> {
        if self.total_chars > 0 {
            Some(self.total_chars - 1)
        } else {
            None
        }
    }

    pub fn at_end(&self) -> bool {
        self.last_index().is_some_and(|last| self.position >= last)
    }

    pub fn clamp_position(&self, position: u32) -> u32 {
        match self.last_index() {
            Some(last) => position.min(last),
            None => position,
        }
    }
}
