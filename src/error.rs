use thiserror::Error;

/// Domain errors shared by the ingestion, generation, and scheduling layers.
///
/// The HTTP layer maps each variant to a status code in `api::errors`.
#[derive(Debug, Error)]
pub enum FleetError {
    /// A machine id did not resolve on a single-item operation.
    #[error("machine {0} not found")]
    NotFound(String),

    /// A unique value (the serial number) is already taken.
    #[error("{0}")]
    Conflict(String),

    /// A request parameter is outside its accepted range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation that needs at least one machine found none.
    #[error("no machines registered; create machines first")]
    EmptyFleet,

    /// `start` was called while a simulation task is active.
    #[error("simulator is already running")]
    AlreadyRunning,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type FleetResult<T> = Result<T, FleetError>;
