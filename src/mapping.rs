//! Orientation delta → reading position.
//!
//! The score is a fixed linear blend of the pitch, roll and heading deltas
//! from the calibration origin. Revisiting the same physical spot yields the
//! same index because the mapping is a pure function of its two inputs.

use crate::types::{CalibrationReference, OrientationEstimate};

/// Degrees of combined movement per position step. Larger values need more
/// physical travel per character.
pub const DEFAULT_SCALE: f32 = 5.0;

pub const ROLL_WEIGHT: f32 = 0.5;
pub const HEADING_WEIGHT: f32 = 0.3;

#[derive(Clone, Copy, Debug)]
pub struct PositionMapper {
    scale: f32,
}

impl PositionMapper {
    pub fn new(scale: f32) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { DEFAULT_SCALE };
        Self { scale }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Returns 0 while uncalibrated.
    pub fn map(&self, estimate: &OrientationEstimate, reference: Option<&CalibrationReference>) -> u32 {
        let Some(reference) = reference else {
            return 0;
        };

        let d_pitch = estimate.pitch - reference.pitch;
        let d_roll = estimate.roll - reference.roll;
        let d_heading = wrap_heading_delta(estimate.heading - reference.heading);

        let score = (d_pitch + ROLL_WEIGHT * d_roll + HEADING_WEIGHT * d_heading) / self.scale;

        // `as` truncates toward zero and saturates; NaN becomes 0.
        (score.trunc() as i64).clamp(0, u32::MAX as i64) as u32
    }
}

impl Default for PositionMapper {
    fn default() -> Self {
        Self::new(DEFAULT_SCALE)
    }
}

/// Folds a heading difference into `(-180, 180]` so crossing north does not
/// register as a full turn.
pub fn wrap_heading_delta(delta: f32) -> f32 {
    if delta > 180.0 {
        delta - 360.0
    } else if delta <= -180.0 {
        delta + 360.0
    } else {
        delta
    }
}
