pub mod memory;
pub mod models;
pub mod postgres;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::FleetResult;
use models::{Machine, MachineUpdate, NewMachine, NewReading, Reading};

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Storage contract for machines and their readings.
///
/// Shared as `Arc<dyn Repository>` between request handlers and the
/// simulator task. Every write is a single-statement commit.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fails with `Conflict` when the serial number is already registered.
    async fn create_machine(&self, new: NewMachine) -> FleetResult<Machine>;

    async fn get_machine(&self, id: Uuid) -> FleetResult<Option<Machine>>;

    async fn get_machine_by_serial(&self, serial_number: &str) -> FleetResult<Option<Machine>>;

    /// All machines ordered by name, then id.
    async fn list_machines(&self) -> FleetResult<Vec<Machine>>;

    /// Returns `None` when no machine has this id.
    async fn update_machine(&self, id: Uuid, update: MachineUpdate) -> FleetResult<Option<Machine>>;

    /// Deletes the machine and all of its readings. Returns `false` if absent.
    async fn delete_machine(&self, id: Uuid) -> FleetResult<bool>;

    /// Fails with `NotFound` when the owning machine does not exist.
    async fn insert_reading(&self, reading: NewReading) -> FleetResult<Reading>;

    /// Bulk insert; returns the number of rows written.
    async fn insert_readings(&self, readings: Vec<NewReading>) -> FleetResult<u64>;

    /// Newest first, at most `limit` rows.
    async fn readings_for_machine(&self, machine_id: Uuid, limit: i64) -> FleetResult<Vec<Reading>>;

    /// One reading per machine: the one with the greatest `recorded_at`.
    /// Which row wins a timestamp tie is unspecified.
    async fn latest_readings(&self) -> FleetResult<Vec<Reading>>;

    async fn count_machines_by_type(&self) -> FleetResult<BTreeMap<String, i64>>;
}
