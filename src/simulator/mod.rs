pub mod generator;
pub mod service;

pub use generator::{SeedParams, SeedReport, Signal};
pub use service::{SimulationController, SimulationStatus};
