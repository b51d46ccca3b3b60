use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::session::Session;

struct RunningTask {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Supervises the background task that walks the position forward one step
/// per tick while no sensor is driving the session.
pub struct SimulationDriver {
    tick: Duration,
    task: Option<RunningTask>,
}

impl SimulationDriver {
    pub fn new(tick: Duration) -> Self {
        Self { tick, task: None }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Replace any running driver with a fresh one bound to `epoch`.
    pub fn start(&mut self, session: Session, epoch: u64) {
        self.stop();
        let (cancel, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(run(session, epoch, self.tick, cancel_rx));
        self.task = Some(RunningTask { cancel, handle });
    }

    /// Signal the driver to exit. Takes effect before its next tick.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.cancel.send(());
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.handle.is_finished())
    }
}

impl Drop for SimulationDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(session: Session, epoch: u64, tick: Duration, mut cancel_rx: oneshot::Receiver<()>) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::debug!("Simulation driver {} running every {:?}", epoch, tick);

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel_rx => {
                log::debug!("Simulation driver {} cancelled", epoch);
                break;
            }
            _ = ticker.tick() => {
                if !session.simulation_tick(epoch) {
                    break;
                }
            }
        }
    }
}
