use std::sync::Arc;

use crate::{
    db::Repository,
    evaluation::{Classifier, Preset},
    readings::ReadingService,
    simulator::SimulationController,
};

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub readings: Arc<ReadingService>,
    /// The one simulation controller for this process.
    pub simulator: Arc<SimulationController>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>, ingest_preset: Preset, sim_interval_secs: u64) -> Self {
        Self {
            readings: Arc::new(ReadingService::new(repo.clone(), Classifier::preset(ingest_preset))),
            simulator: Arc::new(SimulationController::new(repo.clone(), sim_interval_secs)),
            repo,
        }
    }
}
