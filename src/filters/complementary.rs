use crate::types::{OrientationEstimate, SensorSample};
use nalgebra::Vector3;

/// Gyro trust coefficient. Higher values correct gyro drift against the
/// gravity reference more slowly.
pub const DEFAULT_ALPHA: f32 = 0.95;

/// First-order pitch/roll complementary filter with magnetometer heading.
///
/// Stateless apart from its gain: the previous estimate and one new sample
/// fully determine the next estimate.
#[derive(Clone, Copy, Debug)]
pub struct ComplementaryFilter {
    alpha: f32,
}

impl ComplementaryFilter {
    pub fn new(alpha: f32) -> Self {
        Self { alpha: alpha.clamp(0.0, 1.0) }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn update(&self, prev: OrientationEstimate, sample: &SensorSample) -> OrientationEstimate {
        let accel_pitch = accel_pitch(&sample.accel);
        let accel_roll = accel_roll(&sample.accel);

        // Pitch integrates the x rate and roll the y rate.
        let pitch = self.alpha * (prev.pitch + sample.gyro.x * sample.dt)
            + (1.0 - self.alpha) * accel_pitch;
        let roll = self.alpha * (prev.roll + sample.gyro.y * sample.dt)
            + (1.0 - self.alpha) * accel_roll;

        OrientationEstimate {
            pitch,
            roll,
            heading: heading(&sample.mag),
        }
    }
}

impl Default for ComplementaryFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

pub fn accel_pitch(accel: &Vector3<f32>) -> f32 {
    accel
        .y
        .atan2((accel.x * accel.x + accel.z * accel.z).sqrt())
        .to_degrees()
}

pub fn accel_roll(accel: &Vector3<f32>) -> f32 {
    (-accel.x).atan2(accel.z).to_degrees()
}

/// Compass bearing from the horizontal field components, in `[0, 360)`.
pub fn heading(mag: &Vector3<f32>) -> f32 {
    normalize_heading(mag.y.atan2(mag.x).to_degrees())
}

pub fn normalize_heading(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.0 in f32
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
