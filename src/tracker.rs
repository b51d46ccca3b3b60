use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::config::FusionConfig;
use crate::error::SensorError;
use crate::health_monitor::{HealthChange, SensorHealth};
use crate::sensor_fusion::{FusionEvent, OrientationEngine};
use crate::sensors::SampleSource;
use crate::session::{FusionLink, Session};
use crate::types::SensorSample;

/// Fusion-loop end of the session link.
pub struct TrackerControl {
    calibrate_rx: mpsc::Receiver<()>,
    calibrated_tx: watch::Sender<bool>,
}

pub fn fusion_channels() -> (FusionLink, TrackerControl) {
    let (calibrate_tx, calibrate_rx) = mpsc::channel(8);
    let (calibrated_tx, calibrated_rx) = watch::channel(false);
    (
        FusionLink { calibrate_tx, calibrated_rx },
        TrackerControl { calibrate_rx, calibrated_tx },
    )
}

type SharedSource = Arc<Mutex<Box<dyn SampleSource>>>;
type PendingRead = JoinHandle<Result<SensorSample, SensorError>>;

/// Periodic sample → fuse → map loop feeding the session.
///
/// Reads run on the blocking pool under a timeout; a failed or late read
/// leaves the previous estimate in place and the loop carries on. At most one
/// read is ever outstanding: a late read is picked up again on the next tick
/// instead of starting another one behind it.
pub struct Tracker {
    source: SharedSource,
    in_flight: Option<PendingRead>,
    engine: OrientationEngine,
    health: SensorHealth,
    config: FusionConfig,
}

impl Tracker {
    pub fn new(source: Box<dyn SampleSource>, config: FusionConfig) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            in_flight: None,
            engine: OrientationEngine::new(&config),
            health: SensorHealth::new("Glove sensor", config.silence_threshold),
            config,
        }
    }

    pub fn engine(&self) -> &OrientationEngine {
        &self.engine
    }

    async fn read(&mut self) -> Result<SensorSample, SensorError> {
        let mut read = match self.in_flight.take() {
            Some(pending) => pending,
            None => {
                let source = Arc::clone(&self.source);
                tokio::task::spawn_blocking(move || {
                    let mut source = source.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    source.read_sample()
                })
            }
        };

        let outcome = timeout(self.config.read_timeout, &mut read).await;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(SensorError::Unavailable(join_err.to_string())),
            Err(_) => {
                self.in_flight = Some(read);
                Err(SensorError::Timeout(self.config.read_timeout.as_millis() as u64))
            }
        }
    }

    /// One tick: read, fuse, and return the mapped index.
    pub async fn step(&mut self) -> u32 {
        match self.read().await {
            Ok(sample) => {
                if let Some(HealthChange::Recovered { failures }) = self.health.update() {
                    log::info!("{} recovered after {} failed reads", self.health.name, failures);
                }
                for event in self.engine.feed(&sample) {
                    match event {
                        FusionEvent::AutoCalibrated(reference) => log::info!(
                            "Auto-calibrated. ref_pitch={:.1} ref_roll={:.1} ref_heading={:.1}",
                            reference.pitch,
                            reference.roll,
                            reference.heading
                        ),
                        other => log::debug!("{:?}", other),
                    }
                }
            }
            Err(err) => {
                let dropped = self.engine.note_failure();
                log::debug!("Sample failed ({}): {:?}", err, dropped);
                if let Some(HealthChange::WentSilent { failures, silent_for }) = self.health.record_failure() {
                    log::warn!(
                        "{} silent for {:.1}s ({} failed reads): {}",
                        self.health.name,
                        silent_for.as_secs_f64(),
                        failures,
                        err
                    );
                }
            }
        }
        self.engine.position()
    }

    pub async fn run(mut self, session: Session, mut control: TrackerControl) {
        let mut ticker = interval(self.config.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        log::info!("Fusion loop running every {:?}", self.config.sample_interval);

        loop {
            tokio::select! {
                request = control.calibrate_rx.recv() => {
                    if request.is_none() {
                        log::info!("Session closed, fusion loop exiting");
                        break;
                    }
                    let reference = self.engine.calibrate();
                    log::info!(
                        "Calibrated! Origin set. ref_pitch={:.1} ref_roll={:.1} ref_heading={:.1}",
                        reference.pitch,
                        reference.roll,
                        reference.heading
                    );
                }
                _ = ticker.tick() => {
                    let index = self.step().await;
                    session.apply_sensor_position(index);

                    let snapshot = self.engine.snapshot();
                    if snapshot.samples_fused > 0 && snapshot.samples_fused % 200 == 0 {
                        let e = snapshot.estimate;
                        log::debug!(
                            "[{:.0}s] pitch={:6.1} roll={:6.1} heading={:6.1} -> position={} | {}",
                            started.elapsed().as_secs_f64(),
                            e.pitch,
                            e.roll,
                            e.heading,
                            snapshot.position,
                            self.health.format_status()
                        );
                    }
                }
            }

            let calibrated = self.engine.is_calibrated();
            control.calibrated_tx.send_if_modified(|ready| {
                let changed = *ready != calibrated;
                *ready = calibrated;
                changed
            });
        }
    }
}
