use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

use crate::broadcast::{ClientId, ClientRegistry};
use crate::config::ServerConfig;
use crate::protocol::{Command, ServerEvent};
use crate::simulation::SimulationDriver;
use crate::types::PositionState;

/// Observable session phase, derived from `(calibrated, running)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing calibrated, nothing moving
    Uninitialized,
    /// Origin set, waiting for a start
    CalibratedIdle,
    /// A driver is advancing the position
    Running,
}

/// Which position source is advancing the session while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Simulated,
    Sensor,
}

/// Session-side end of the link to the fusion loop.
#[derive(Clone)]
pub struct FusionLink {
    pub calibrate_tx: mpsc::Sender<()>,
    pub calibrated_rx: watch::Receiver<bool>,
}

impl FusionLink {
    fn sensor_ready(&self) -> bool {
        *self.calibrated_rx.borrow()
    }
}

struct Inner {
    state: PositionState,
    driver: Option<Driver>,
    /// Bumped on every start so a cancelled driver can never touch the state again.
    epoch: u64,
    simulation: SimulationDriver,
}

/// Owns the canonical `PositionState` and the consumer set.
///
/// Every command is applied under a single lock, and its events are queued
/// to consumers before that lock is released. Fan-out only ever does
/// `try_send`, so nothing under the lock waits on a consumer.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
    clients: ClientRegistry,
    fusion: Option<FusionLink>,
    force_simulation: bool,
}

impl Session {
    pub fn new(config: &ServerConfig, fusion: Option<FusionLink>) -> Self {
        Session {
            inner: Arc::new(Mutex::new(Inner {
                state: PositionState::default(),
                driver: None,
                epoch: 0,
                simulation: SimulationDriver::new(config.tick),
            })),
            clients: ClientRegistry::new(config.client_queue),
            fusion,
            force_simulation: config.force_simulation,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> PositionState {
        self.lock().state
    }

    pub fn phase(&self) -> SessionPhase {
        let state = self.state();
        match (state.calibrated, state.running) {
            (_, true) => SessionPhase::Running,
            (true, false) => SessionPhase::CalibratedIdle,
            (false, false) => SessionPhase::Uninitialized,
        }
    }

    pub fn driver(&self) -> Option<Driver> {
        self.lock().driver
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    // ─── Consumers ───────────────────────────────────────────────────────────

    /// Register a consumer. Its queue starts with a full state snapshot.
    pub fn connect(&self) -> (ClientId, mpsc::Receiver<ServerEvent>) {
        // Held across registration so no event can slip in before the snapshot.
        let inner = self.lock();
        let registered = self.clients.register(ServerEvent::from(inner.state));
        drop(inner);
        registered
    }

    pub fn disconnect(&self, id: ClientId) {
        self.clients.remove(id);
    }

    /// Queue `events` to every consumer. Takes the guard so events leave in
    /// the same order as the state changes that produced them.
    fn publish(&self, _inner: &MutexGuard<'_, Inner>, events: &[ServerEvent]) {
        for event in events {
            self.clients.broadcast(event);
        }
    }

    // ─── Commands ────────────────────────────────────────────────────────────

    /// Decode and apply one consumer message; anything unreadable is ignored.
    pub fn handle_text(&self, text: &str) {
        match Command::decode(text) {
            Some(command) => self.handle_command(command),
            None => log::debug!("Ignoring unrecognised message: {}", text),
        }
    }

    pub fn handle_command(&self, command: Command) {
        match command {
            Command::Calibrate => self.calibrate(),
            Command::SetTotal { total } => self.set_total(total),
            Command::StartSim => self.start(),
            Command::StopSim => self.stop(),
            Command::Reset => self.reset(),
            Command::SetPosition { position } => self.set_position(position),
        }
    }

    fn calibrate(&self) {
        let mut inner = self.lock();
        inner.state.position = 0;
        inner.state.calibrated = true;
        if let Some(link) = &self.fusion {
            if link.calibrate_tx.try_send(()).is_err() {
                log::warn!("Fusion loop not accepting calibration requests");
            }
        }
        log::info!("Calibrated. Origin set to position 0");
        self.publish(&inner, &[ServerEvent::Calibrated { position: 0 }]);
    }

    fn set_total(&self, total: u32) {
        let mut inner = self.lock();
        inner.state.total_chars = total;
        inner.state.position = inner.state.clamp_position(inner.state.position);
        log::info!("Total chars set to {}", total);
    }

    fn start(&self) {
        let use_sensor = !self.force_simulation
            && self.fusion.as_ref().is_some_and(FusionLink::sensor_ready);
        let driver = if use_sensor { Driver::Sensor } else { Driver::Simulated };

        let mut inner = self.lock();
        let resuming = inner.state.running
            && inner.driver == Some(driver)
            && (driver == Driver::Sensor || inner.simulation.is_active());
        if resuming {
            return;
        }
        inner.state.running = true;
        inner.driver = Some(driver);
        inner.epoch += 1;
        let epoch = inner.epoch;

        match driver {
            Driver::Simulated => {
                inner.simulation.start(self.clone(), epoch);
                log::info!("Simulation started");
            }
            Driver::Sensor => {
                inner.simulation.stop();
                log::info!("Sensor tracking started");
            }
        }
    }

    fn stop(&self) {
        let mut inner = self.lock();
        inner.state.running = false;
        inner.driver = None;
        inner.simulation.stop();
        log::info!("Simulation stopped");
    }

    fn reset(&self) {
        let mut inner = self.lock();
        inner.state.position = 0;
        inner.state.running = false;
        inner.driver = None;
        inner.simulation.stop();
        log::info!("Reset to position 0");
        self.publish(&inner, &[ServerEvent::Position { position: 0 }]);
    }

    fn set_position(&self, position: u32) {
        let mut inner = self.lock();
        inner.state.position = inner.state.clamp_position(position);
        let position = inner.state.position;
        self.publish(&inner, &[ServerEvent::Position { position }]);
    }

    // ─── Drivers ─────────────────────────────────────────────────────────────

    /// One simulation step. Returns false once the driver should exit.
    pub(crate) fn simulation_tick(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if !inner.state.running || inner.driver != Some(Driver::Simulated) || inner.epoch != epoch {
            return false;
        }

        if inner.state.at_end() {
            inner.state.running = false;
            inner.driver = None;
            log::info!("Reached end of text");
            self.publish(&inner, &[ServerEvent::Done]);
            false
        } else {
            inner.state.position += 1;
            let event = ServerEvent::Position { position: inner.state.position };
            log::debug!("Simulated tick: {:?}", event);
            self.publish(&inner, &[event]);
            true
        }
    }

    /// Apply a fusion-derived index while the sensor driver is active.
    pub fn apply_sensor_position(&self, index: u32) {
        let mut inner = self.lock();
        if !inner.state.running || inner.driver != Some(Driver::Sensor) {
            return;
        }

        let mut events = Vec::with_capacity(2);
        let position = inner.state.clamp_position(index);
        if position != inner.state.position {
            inner.state.position = position;
            events.push(ServerEvent::Position { position });
        }
        if inner.state.at_end() {
            inner.state.running = false;
            inner.driver = None;
            log::info!("Reached end of text");
            events.push(ServerEvent::Done);
        }
        self.publish(&inner, &events);
    }
}
