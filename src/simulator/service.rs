use std::{sync::Arc, time::Duration};

use rand::{rngs::StdRng, SeedableRng};
use tokio::{sync::Mutex, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::generator;
use crate::{
    db::Repository,
    error::{FleetError, FleetResult},
};

/// Smallest interval `start` accepts; shorter requests are raised to it.
pub const MIN_INTERVAL_SECS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationStatus {
    pub running: bool,
    pub interval_secs: u64,
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ControllerState {
    interval_secs: u64,
    active: Option<ActiveRun>,
}

impl ControllerState {
    fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|run| !run.handle.is_finished())
    }
}

/// Process-wide start/stop/status controller for the live simulation task.
///
/// At most one task runs at a time. The lock is held across the whole of
/// `start` and `stop`, so concurrent calls are serialised.
pub struct SimulationController {
    repo: Arc<dyn Repository>,
    default_interval_secs: u64,
    state: Mutex<ControllerState>,
}

impl SimulationController {
    pub fn new(repo: Arc<dyn Repository>, default_interval_secs: u64) -> Self {
        let default_interval_secs = default_interval_secs.max(MIN_INTERVAL_SECS);
        Self {
            repo,
            default_interval_secs,
            state: Mutex::new(ControllerState {
                interval_secs: default_interval_secs,
                active: None,
            }),
        }
    }

    /// Spawns the tick loop. Fails with `AlreadyRunning` if a task is active.
    ///
    /// `interval_secs` defaults to the configured interval and is raised to
    /// [`MIN_INTERVAL_SECS`] when smaller.
    pub async fn start(&self, interval_secs: Option<u64>) -> FleetResult<SimulationStatus> {
        let mut state = self.state.lock().await;
        if state.is_running() {
            return Err(FleetError::AlreadyRunning);
        }

        let interval_secs = interval_secs
            .unwrap_or(self.default_interval_secs)
            .max(MIN_INTERVAL_SECS);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&self.repo),
            Duration::from_secs(interval_secs),
            cancel.clone(),
        ));

        state.interval_secs = interval_secs;
        state.active = Some(ActiveRun { cancel, handle });
        info!(interval_secs, "Simulation started");

        Ok(SimulationStatus { running: true, interval_secs })
    }

    /// Cancels the tick loop and waits for it to exit.
    ///
    /// Returns `false` when nothing was running.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        let Some(run) = state.active.take() else {
            return false;
        };
        if run.handle.is_finished() {
            return false;
        }

        run.cancel.cancel();
        if let Err(e) = run.handle.await {
            warn!(error = %e, "Simulation task ended abnormally");
        }
        info!("Simulation stopped");
        true
    }

    pub async fn status(&self) -> SimulationStatus {
        let state = self.state.lock().await;
        SimulationStatus {
            running: state.is_running(),
            interval_secs: state.interval_secs,
        }
    }
}

/// Tick, then sleep, until `cancel` fires. Cancellation interrupts either phase.
async fn run(repo: Arc<dyn Repository>, interval: Duration, cancel: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "Simulation loop started");
    let mut rng = StdRng::from_os_rng();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = generator::tick(repo.as_ref(), &mut rng) => {
                if let Err(e) = result {
                    error!(error = %e, "Simulation tick failed");
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = time::sleep(interval) => {}
        }
    }

    info!("Simulation loop exited");
}
