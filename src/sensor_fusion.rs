// sensor_fusion.rs — Pure computation layer for the page tracker
//
// Nothing in here touches tokio, the sensor bus or the network. Samples go in,
// orientation estimates, position indices and events come out, so the whole
// thing can be unit-tested with hand-built samples.

use crate::config::FusionConfig;
use crate::filters::complementary::ComplementaryFilter;
use crate::mapping::PositionMapper;
use crate::types::{CalibrationReference, OrientationEstimate, SensorSample};

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum FusionEvent {
    AutoCalibrated(CalibrationReference),
    SampleDropped { consecutive: u32 },
    Recovered { after_failures: u32 },
}

// ─── Output snapshot ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct FusionSnapshot {
    pub estimate: OrientationEstimate,
    pub position: u32,
    pub calibrated: bool,
    pub samples_fused: u64,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Owns the running estimate and the calibration origin.
pub struct OrientationEngine {
    filter: ComplementaryFilter,
    mapper: PositionMapper,
    estimate: OrientationEstimate,
    reference: Option<CalibrationReference>,
    auto_calibrate: bool,
    samples_fused: u64,
    consecutive_failures: u32,
}

impl OrientationEngine {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            filter: ComplementaryFilter::new(config.alpha),
            mapper: PositionMapper::new(config.scale),
            estimate: OrientationEstimate::default(),
            reference: None,
            auto_calibrate: config.auto_calibrate,
            samples_fused: 0,
            consecutive_failures: 0,
        }
    }

    /// Fuse one sample into the estimate.
    pub fn feed(&mut self, sample: &SensorSample) -> Vec<FusionEvent> {
        let mut events = Vec::new();

        if self.consecutive_failures > 0 {
            events.push(FusionEvent::Recovered { after_failures: self.consecutive_failures });
            self.consecutive_failures = 0;
        }

        self.estimate = self.filter.update(self.estimate, sample);

        if self.samples_fused == 0 && self.auto_calibrate && self.reference.is_none() {
            let reference = self.calibrate();
            events.push(FusionEvent::AutoCalibrated(reference));
        }

        self.samples_fused += 1;
        events
    }

    /// Record a failed read. The previous estimate is kept as-is.
    pub fn note_failure(&mut self) -> FusionEvent {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        FusionEvent::SampleDropped { consecutive: self.consecutive_failures }
    }

    /// Capture the current estimate as the new origin, replacing any previous one.
    pub fn calibrate(&mut self) -> CalibrationReference {
        let reference = CalibrationReference::from(self.estimate);
        self.reference = Some(reference);
        reference
    }

    pub fn position(&self) -> u32 {
        self.mapper.map(&self.estimate, self.reference.as_ref())
    }

    pub fn estimate(&self) -> OrientationEstimate {
        self.estimate
    }

    pub fn reference(&self) -> Option<CalibrationReference> {
        self.reference
    }

    pub fn is_calibrated(&self) -> bool {
        self.reference.is_some()
    }

    pub fn snapshot(&self) -> FusionSnapshot {
        FusionSnapshot {
            estimate: self.estimate,
            position: self.position(),
            calibrated: self.is_calibrated(),
            samples_fused: self.samples_fused,
        }
    }
}
