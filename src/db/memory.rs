use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    models::{Machine, MachineUpdate, NewMachine, NewReading, Reading},
    Repository,
};
use crate::error::{FleetError, FleetResult};

#[derive(Default)]
struct Tables {
    machines: HashMap<Uuid, Machine>,
    readings: Vec<Reading>,
    next_reading_id: i64,
}

impl Tables {
    fn push_reading(&mut self, reading: NewReading) -> FleetResult<Reading> {
        if !self.machines.contains_key(&reading.machine_id) {
            return Err(FleetError::NotFound(reading.machine_id.to_string()));
        }
        self.next_reading_id += 1;
        let stored = reading.into_reading(self.next_reading_id);
        self.readings.push(stored.clone());
        Ok(stored)
    }
}

/// Process-local store with the same semantics as the Postgres schema:
/// unique serial numbers, foreign-key checked readings, cascade delete.
///
/// Wrapped in `Arc` so clones share the same tables. Uses
/// `tokio::sync::RwLock` so concurrent readers never block each other.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_machine(&self, new: NewMachine) -> FleetResult<Machine> {
        let mut tables = self.inner.write().await;
        if tables.machines.values().any(|m| m.serial_number == new.serial_number) {
            return Err(FleetError::Conflict(format!(
                "serial number {} already exists",
                new.serial_number
            )));
        }
        let machine = Machine {
            id: Uuid::new_v4(),
            name: new.name,
            machine_type: new.machine_type,
            description: new.description,
            serial_number: new.serial_number,
            engine: new.engine,
        };
        tables.machines.insert(machine.id, machine.clone());
        Ok(machine)
    }

    async fn get_machine(&self, id: Uuid) -> FleetResult<Option<Machine>> {
        Ok(self.inner.read().await.machines.get(&id).cloned())
    }

    async fn get_machine_by_serial(&self, serial_number: &str) -> FleetResult<Option<Machine>> {
        Ok(self
            .inner
            .read()
            .await
            .machines
            .values()
            .find(|m| m.serial_number == serial_number)
            .cloned())
    }

    async fn list_machines(&self) -> FleetResult<Vec<Machine>> {
        let mut machines: Vec<Machine> = self.inner.read().await.machines.values().cloned().collect();
        machines.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(machines)
    }

    async fn update_machine(&self, id: Uuid, update: MachineUpdate) -> FleetResult<Option<Machine>> {
        let mut tables = self.inner.write().await;
        Ok(tables.machines.get_mut(&id).map(|machine| {
            update.apply(machine);
            machine.clone()
        }))
    }

    async fn delete_machine(&self, id: Uuid) -> FleetResult<bool> {
        let mut tables = self.inner.write().await;
        if tables.machines.remove(&id).is_none() {
            return Ok(false);
        }
        tables.readings.retain(|r| r.machine_id != id);
        Ok(true)
    }

    async fn insert_reading(&self, reading: NewReading) -> FleetResult<Reading> {
        self.inner.write().await.push_reading(reading)
    }

    async fn insert_readings(&self, readings: Vec<NewReading>) -> FleetResult<u64> {
        let mut tables = self.inner.write().await;
        // all-or-nothing, like one INSERT statement
        if let Some(missing) = readings.iter().find(|r| !tables.machines.contains_key(&r.machine_id)) {
            return Err(FleetError::NotFound(missing.machine_id.to_string()));
        }
        let mut inserted = 0;
        for reading in readings {
            tables.push_reading(reading)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn readings_for_machine(&self, machine_id: Uuid, limit: i64) -> FleetResult<Vec<Reading>> {
        let tables = self.inner.read().await;
        let mut rows: Vec<Reading> = tables
            .readings
            .iter()
            .filter(|r| r.machine_id == machine_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn latest_readings(&self) -> FleetResult<Vec<Reading>> {
        let tables = self.inner.read().await;
        let mut latest: HashMap<Uuid, &Reading> = HashMap::new();
        for r in &tables.readings {
            latest
                .entry(r.machine_id)
                .and_modify(|cur| {
                    if r.recorded_at >= cur.recorded_at {
                        *cur = r;
                    }
                })
                .or_insert(r);
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn count_machines_by_type(&self) -> FleetResult<BTreeMap<String, i64>> {
        let tables = self.inner.read().await;
        let mut counts = BTreeMap::new();
        for m in tables.machines.values() {
            *counts.entry(m.machine_type.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::{
        db::models::{HealthState, SensorSample},
        evaluation::{Classifier, Preset},
    };

    fn new_machine(name: &str, machine_type: &str, serial: &str) -> NewMachine {
        NewMachine {
            name: name.into(),
            machine_type: machine_type.into(),
            description: None,
            serial_number: serial.into(),
            engine: None,
        }
    }

    fn reading(machine_id: Uuid, temperature: f64, minutes_ago: i64) -> NewReading {
        NewReading::classified(
            &Classifier::preset(Preset::Historical),
            machine_id,
            None,
            SensorSample { temperature: Some(temperature), vibration: Some(1.0), oil_pressure: Some(3.0) },
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[tokio::test]
    async fn empty_repository_returns_nothing() {
        let repo = MemoryRepository::new();
        assert!(repo.list_machines().await.unwrap().is_empty());
        assert!(repo.latest_readings().await.unwrap().is_empty());
        assert!(repo.count_machines_by_type().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_serial_is_conflict() {
        let repo = MemoryRepository::new();
        repo.create_machine(new_machine("A", "pump", "SN-1")).await.unwrap();
        let err = repo.create_machine(new_machine("B", "press", "SN-1")).await.unwrap_err();
        assert!(matches!(err, FleetError::Conflict(_)));
        assert_eq!(repo.list_machines().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lookup_by_serial() {
        let repo = MemoryRepository::new();
        let m = repo.create_machine(new_machine("A", "pump", "SN-1")).await.unwrap();
        assert_eq!(repo.get_machine_by_serial("SN-1").await.unwrap(), Some(m));
        assert!(repo.get_machine_by_serial("SN-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_ordered_by_name() {
        let repo = MemoryRepository::new();
        repo.create_machine(new_machine("Lathe", "lathe", "SN-2")).await.unwrap();
        repo.create_machine(new_machine("Compressor", "compressor", "SN-1")).await.unwrap();
        let names: Vec<_> = repo.list_machines().await.unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, ["Compressor", "Lathe"]);
    }

    #[tokio::test]
    async fn partial_update_keeps_unset_fields() {
        let repo = MemoryRepository::new();
        let m = repo
            .create_machine(NewMachine { engine: Some("E1".into()), ..new_machine("A", "pump", "SN-1") })
            .await
            .unwrap();

        let updated = repo
            .update_machine(m.id, MachineUpdate { name: Some("A2".into()), ..Default::default() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "A2");
        assert_eq!(updated.machine_type, "pump");
        assert_eq!(updated.engine.as_deref(), Some("E1"));

        assert!(repo.update_machine(Uuid::new_v4(), MachineUpdate::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reading_for_unknown_machine_is_rejected() {
        let repo = MemoryRepository::new();
        let err = repo.insert_reading(reading(Uuid::new_v4(), 90.0, 0)).await.unwrap_err();
        assert!(matches!(err, FleetError::NotFound(_)));
    }

    #[tokio::test]
    async fn bulk_insert_with_unknown_machine_writes_nothing() {
        let repo = MemoryRepository::new();
        let m = repo.create_machine(new_machine("A", "pump", "SN-1")).await.unwrap();
        let rows = vec![reading(m.id, 90.0, 2), reading(m.id, 91.0, 1), reading(Uuid::new_v4(), 92.0, 0)];

        let err = repo.insert_readings(rows).await.unwrap_err();
        assert!(matches!(err, FleetError::NotFound(_)));
        assert!(repo.readings_for_machine(m.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_can_clear_optional_fields() {
        let repo = MemoryRepository::new();
        let m = repo
            .create_machine(NewMachine {
                description: Some("old".into()),
                engine: Some("E1".into()),
                ..new_machine("A", "pump", "SN-1")
            })
            .await
            .unwrap();

        let updated = repo
            .update_machine(m.id, MachineUpdate { description: Some(None), ..Default::default() })
            .await
            .unwrap()
            .unwrap();
        assert!(updated.description.is_none());
        assert_eq!(updated.engine.as_deref(), Some("E1"));
    }

    #[tokio::test]
    async fn reading_ids_are_monotonic() {
        let repo = MemoryRepository::new();
        let m = repo.create_machine(new_machine("A", "pump", "SN-1")).await.unwrap();
        let first = repo.insert_reading(reading(m.id, 90.0, 1)).await.unwrap();
        let second = repo.insert_reading(reading(m.id, 90.0, 0)).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn delete_cascades_readings() {
        let repo = MemoryRepository::new();
        let a = repo.create_machine(new_machine("A", "pump", "SN-1")).await.unwrap();
        let b = repo.create_machine(new_machine("B", "pump", "SN-2")).await.unwrap();
        let batch = (0..5).map(|i| reading(a.id, 90.0, i)).chain([reading(b.id, 90.0, 0)]).collect();
        assert_eq!(repo.insert_readings(batch).await.unwrap(), 6);

        assert!(repo.delete_machine(a.id).await.unwrap());
        assert!(repo.readings_for_machine(a.id, 100).await.unwrap().is_empty());
        assert_eq!(repo.readings_for_machine(b.id, 100).await.unwrap().len(), 1);
        assert!(!repo.delete_machine(a.id).await.unwrap());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let repo = MemoryRepository::new();
        let m = repo.create_machine(new_machine("A", "pump", "SN-1")).await.unwrap();
        let batch = [30, 10, 20].into_iter().map(|ago| reading(m.id, 90.0, ago)).collect();
        repo.insert_readings(batch).await.unwrap();

        let rows = repo.readings_for_machine(m.id, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].recorded_at > rows[1].recorded_at);
        assert!(rows.iter().all(|r| r.recorded_at > Utc::now() - Duration::minutes(25)));
    }

    #[tokio::test]
    async fn latest_is_newest_per_machine() {
        let repo = MemoryRepository::new();
        let a = repo.create_machine(new_machine("A", "pump", "SN-1")).await.unwrap();
        let b = repo.create_machine(new_machine("B", "press", "SN-2")).await.unwrap();
        // inserted out of chronological order on purpose
        let batch = vec![reading(a.id, 130.0, 0), reading(a.id, 90.0, 10), reading(b.id, 105.0, 3)];
        repo.insert_readings(batch).await.unwrap();

        let latest = repo.latest_readings().await.unwrap();
        assert_eq!(latest.len(), 2);
        let for_a = latest.iter().find(|r| r.machine_id == a.id).unwrap();
        assert_eq!(for_a.state, HealthState::Critical);
        let for_b = latest.iter().find(|r| r.machine_id == b.id).unwrap();
        assert_eq!(for_b.state, HealthState::Warning);
    }

    #[tokio::test]
    async fn counts_machines_by_type() {
        let repo = MemoryRepository::new();
        repo.create_machine(new_machine("A", "pump", "SN-1")).await.unwrap();
        repo.create_machine(new_machine("B", "pump", "SN-2")).await.unwrap();
        repo.create_machine(new_machine("C", "press", "SN-3")).await.unwrap();
        let counts = repo.count_machines_by_type().await.unwrap();
        assert_eq!(counts["pump"], 2);
        assert_eq!(counts["press"], 1);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let repo = MemoryRepository::new();
        let clone = repo.clone();
        repo.create_machine(new_machine("A", "pump", "SN-1")).await.unwrap();
        assert_eq!(clone.list_machines().await.unwrap().len(), 1);
    }
}
