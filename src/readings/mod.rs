pub mod service;
pub mod summary;

pub use service::{ReadingInput, ReadingService};
pub use summary::FleetSummary;
