use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    models::{Machine, MachineUpdate, NewMachine, NewReading, Reading},
    Repository,
};
use crate::error::{FleetError, FleetResult};

const MACHINE_COLUMNS: &str = "id, name, machine_type, description, serial_number, engine";

const READING_COLUMNS: &str = "\
    id, machine_id, serial_number, \
    temperature, vibration, oil_pressure, \
    recorded_at, state, reason";

const READING_INSERT_COLUMNS: &str = "\
    machine_id, serial_number, temperature, vibration, oil_pressure, \
    recorded_at, state, reason";

/// Rows per multi-row INSERT. Eight binds per row keeps each statement well
/// under the 65535 bind-parameter limit.
const INSERT_CHUNK: usize = 1000;

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_machine(&self, new: NewMachine) -> FleetResult<Machine> {
        let query = format!(
            "INSERT INTO machines ({MACHINE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {MACHINE_COLUMNS}"
        );
        sqlx::query_as::<_, Machine>(&query)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.machine_type)
            .bind(new.description.as_deref())
            .bind(&new.serial_number)
            .bind(new.engine.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => FleetError::Conflict(
                    format!("serial number {} already exists", new.serial_number),
                ),
                other => other.into(),
            })
    }

    async fn get_machine(&self, id: Uuid) -> FleetResult<Option<Machine>> {
        let query = format!("SELECT {MACHINE_COLUMNS} FROM machines WHERE id = $1");
        Ok(sqlx::query_as::<_, Machine>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_machine_by_serial(&self, serial_number: &str) -> FleetResult<Option<Machine>> {
        let query = format!("SELECT {MACHINE_COLUMNS} FROM machines WHERE serial_number = $1");
        Ok(sqlx::query_as::<_, Machine>(&query)
            .bind(serial_number)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_machines(&self) -> FleetResult<Vec<Machine>> {
        let query = format!("SELECT {MACHINE_COLUMNS} FROM machines ORDER BY name, id");
        Ok(sqlx::query_as::<_, Machine>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_machine(&self, id: Uuid, update: MachineUpdate) -> FleetResult<Option<Machine>> {
        let query = format!(
            "UPDATE machines SET \
                 name         = COALESCE($2, name), \
                 machine_type = COALESCE($3, machine_type), \
                 description  = CASE WHEN $4 THEN $5 ELSE description END, \
                 engine       = CASE WHEN $6 THEN $7 ELSE engine END \
             WHERE id = $1 \
             RETURNING {MACHINE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Machine>(&query)
            .bind(id)
            .bind(update.name)
            .bind(update.machine_type)
            .bind(update.description.is_some())
            .bind(update.description.flatten())
            .bind(update.engine.is_some())
            .bind(update.engine.flatten())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_machine(&self, id: Uuid) -> FleetResult<bool> {
        // readings go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_reading(&self, reading: NewReading) -> FleetResult<Reading> {
        let query = format!(
            "INSERT INTO readings ({READING_INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {READING_COLUMNS}"
        );
        sqlx::query_as::<_, Reading>(&query)
            .bind(reading.machine_id)
            .bind(reading.serial_number.as_deref())
            .bind(reading.temperature)
            .bind(reading.vibration)
            .bind(reading.oil_pressure)
            .bind(reading.recorded_at)
            .bind(reading.state)
            .bind(reading.reason.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    FleetError::NotFound(reading.machine_id.to_string())
                }
                other => other.into(),
            })
    }

    async fn insert_readings(&self, readings: Vec<NewReading>) -> FleetResult<u64> {
        let mut inserted = 0;
        for chunk in readings.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO readings ({READING_INSERT_COLUMNS}) "));
            builder.push_values(chunk, |mut row, r| {
                row.push_bind(r.machine_id)
                    .push_bind(r.serial_number.clone())
                    .push_bind(r.temperature)
                    .push_bind(r.vibration)
                    .push_bind(r.oil_pressure)
                    .push_bind(r.recorded_at)
                    .push_bind(r.state)
                    .push_bind(r.reason.clone());
            });
            inserted += builder.build().execute(&self.pool).await?.rows_affected();
        }
        Ok(inserted)
    }

    async fn readings_for_machine(&self, machine_id: Uuid, limit: i64) -> FleetResult<Vec<Reading>> {
        let query = format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE machine_id = $1 \
             ORDER BY recorded_at DESC, id DESC \
             LIMIT $2"
        );
        Ok(sqlx::query_as::<_, Reading>(&query)
            .bind(machine_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn latest_readings(&self) -> FleetResult<Vec<Reading>> {
        let query = format!(
            "SELECT DISTINCT ON (machine_id) {READING_COLUMNS} FROM readings \
             ORDER BY machine_id, recorded_at DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, Reading>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_machines_by_type(&self) -> FleetResult<BTreeMap<String, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT machine_type, COUNT(*) FROM machines GROUP BY machine_type",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests (need a Postgres instance: DATABASE_URL=... cargo test -- --ignored)
// ---------------------------------------------------------------------------
