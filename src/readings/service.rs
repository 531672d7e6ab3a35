use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::summary::FleetSummary;
use crate::{
    db::{
        models::{Machine, NewReading, Reading, SensorSample},
        Repository,
    },
    error::{FleetError, FleetResult},
    evaluation::Classifier,
};

/// Upper bound applied to history queries.
pub const MAX_HISTORY_LIMIT: i64 = 10_000;

/// One client-supplied reading before it is resolved and classified.
#[derive(Debug, Clone)]
pub struct ReadingInput {
    /// Unparsed machine id; anything that is not an existing machine's UUID
    /// is treated as not found.
    pub machine_id: String,
    pub serial_number: Option<String>,
    pub sample: SensorSample,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Resolves, classifies and stores client-supplied readings.
pub struct ReadingService {
    repo: Arc<dyn Repository>,
    classifier: Classifier,
}

impl ReadingService {
    pub fn new(repo: Arc<dyn Repository>, classifier: Classifier) -> Self {
        Self { repo, classifier }
    }

    /// Validates the machine reference, classifies, and persists one reading.
    ///
    /// Absent sensor values are classified as 0 but stored as absent. The
    /// serial number defaults to the machine's and the timestamp to now.
    pub async fn ingest(&self, input: ReadingInput) -> FleetResult<Reading> {
        let machine = self
            .resolve(&input.machine_id)
            .await?
            .ok_or_else(|| FleetError::NotFound(input.machine_id.clone()))?;

        let reading = self.repo.insert_reading(self.prepare(&machine, input)).await?;
        info!(
            machine_id = %reading.machine_id,
            reading_id = reading.id,
            state = %reading.state,
            "Reading ingested"
        );
        Ok(reading)
    }

    /// Ingests every input whose machine exists; the rest are skipped.
    /// Returns the number of rows written.
    ///
    /// A failure on one item never aborts the batch: failed lookups and
    /// machines deleted before the write are skipped. Rows are written one
    /// machine at a time, so a failed write drops only that machine's rows.
    pub async fn ingest_batch(&self, inputs: Vec<ReadingInput>) -> FleetResult<u64> {
        let total = inputs.len();
        let mut machines: HashMap<String, Option<Machine>> = HashMap::new();
        // per machine, in first-seen order
        let mut groups: Vec<(Uuid, Vec<NewReading>)> = Vec::new();

        for input in inputs {
            if !machines.contains_key(&input.machine_id) {
                let machine = match self.resolve(&input.machine_id).await {
                    Ok(machine) => machine,
                    Err(e) => {
                        warn!(machine_id = %input.machine_id, error = %e, "Machine lookup failed; skipping reading");
                        continue;
                    }
                };
                machines.insert(input.machine_id.clone(), machine);
            }
            let Some(machine) = machines.get(&input.machine_id).and_then(Option::as_ref) else {
                debug!(machine_id = %input.machine_id, "Skipping reading for unknown machine");
                continue;
            };
            let row = self.prepare(machine, input);
            match groups.iter_mut().find(|(id, _)| *id == machine.id) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((machine.id, vec![row])),
            }
        }

        let mut inserted = 0;
        for (machine_id, rows) in groups {
            match self.repo.insert_readings(rows).await {
                Ok(n) => inserted += n,
                Err(FleetError::NotFound(_)) => {
                    debug!(machine_id = %machine_id, "Machine deleted during batch; skipping its readings");
                }
                Err(e) => {
                    error!(machine_id = %machine_id, error = %e, "Failed to store readings; skipping them");
                }
            }
        }
        let skipped = total as u64 - inserted;
        info!(inserted, skipped, "Reading batch ingested");
        Ok(inserted)
    }

    /// Latest reading of every machine that has one.
    pub async fn latest(&self) -> FleetResult<Vec<Reading>> {
        self.repo.latest_readings().await
    }

    /// Newest-first history of one machine. Unknown machines yield an empty list.
    pub async fn history(&self, machine_id: &str, limit: i64) -> FleetResult<Vec<Reading>> {
        if limit < 1 {
            return Err(FleetError::InvalidInput(format!("limit must be at least 1, got {limit}")));
        }
        let Ok(id) = machine_id.parse::<Uuid>() else {
            return Ok(Vec::new());
        };
        self.repo
            .readings_for_machine(id, limit.min(MAX_HISTORY_LIMIT))
            .await
    }

    pub async fn summarize(&self) -> FleetResult<FleetSummary> {
        let per_type = self.repo.count_machines_by_type().await?;
        let latest = self.repo.latest_readings().await?;
        Ok(FleetSummary::tally(per_type, &latest))
    }

    async fn resolve(&self, machine_id: &str) -> FleetResult<Option<Machine>> {
        match machine_id.parse::<Uuid>() {
            Ok(id) => self.repo.get_machine(id).await,
            Err(_) => Ok(None),
        }
    }

    fn prepare(&self, machine: &Machine, input: ReadingInput) -> NewReading {
        NewReading::classified(
            &self.classifier,
            machine.id,
            input.serial_number.or_else(|| Some(machine.serial_number.clone())),
            input.sample,
            input.recorded_at.unwrap_or_else(Utc::now),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::{
        db::{
            models::{HealthState, MachineUpdate, NewMachine},
            MemoryRepository,
        },
        evaluation::Preset,
    };

    /// Memory store whose machine lookups can fail for one id, or delete
    /// another id right after it has been looked up.
    struct RacyRepository {
        inner: MemoryRepository,
        failing_lookup: Option<Uuid>,
        deleted_after_lookup: Option<Uuid>,
    }

    #[async_trait]
    impl Repository for RacyRepository {
        async fn create_machine(&self, new: NewMachine) -> FleetResult<Machine> {
            self.inner.create_machine(new).await
        }
        async fn get_machine(&self, id: Uuid) -> FleetResult<Option<Machine>> {
            if self.failing_lookup == Some(id) {
                return Err(FleetError::Database(sqlx::Error::PoolTimedOut));
            }
            let machine = self.inner.get_machine(id).await?;
            if self.deleted_after_lookup == Some(id) {
                self.inner.delete_machine(id).await?;
            }
            Ok(machine)
        }
        async fn get_machine_by_serial(&self, serial_number: &str) -> FleetResult<Option<Machine>> {
            self.inner.get_machine_by_serial(serial_number).await
        }
        async fn list_machines(&self) -> FleetResult<Vec<Machine>> {
            self.inner.list_machines().await
        }
        async fn update_machine(&self, id: Uuid, update: MachineUpdate) -> FleetResult<Option<Machine>> {
            self.inner.update_machine(id, update).await
        }
        async fn delete_machine(&self, id: Uuid) -> FleetResult<bool> {
            self.inner.delete_machine(id).await
        }
        async fn insert_reading(&self, reading: NewReading) -> FleetResult<Reading> {
            self.inner.insert_reading(reading).await
        }
        async fn insert_readings(&self, readings: Vec<NewReading>) -> FleetResult<u64> {
            self.inner.insert_readings(readings).await
        }
        async fn readings_for_machine(&self, machine_id: Uuid, limit: i64) -> FleetResult<Vec<Reading>> {
            self.inner.readings_for_machine(machine_id, limit).await
        }
        async fn latest_readings(&self) -> FleetResult<Vec<Reading>> {
            self.inner.latest_readings().await
        }
        async fn count_machines_by_type(&self) -> FleetResult<BTreeMap<String, i64>> {
            self.inner.count_machines_by_type().await
        }
    }

    async fn two_machines(repo: &MemoryRepository) -> (Machine, Machine) {
        let mut created = Vec::new();
        for serial in ["SN-A", "SN-B"] {
            let m = repo
                .create_machine(NewMachine {
                    name: serial.into(),
                    machine_type: "pump".into(),
                    description: None,
                    serial_number: serial.into(),
                    engine: None,
                })
                .await
                .unwrap();
            created.push(m);
        }
        let b = created.pop().unwrap();
        let a = created.pop().unwrap();
        (a, b)
    }

    async fn setup() -> (ReadingService, Arc<MemoryRepository>, Machine) {
        let repo = Arc::new(MemoryRepository::new());
        let machine = repo
            .create_machine(NewMachine {
                name: "Compressor 1".into(),
                machine_type: "compressor".into(),
                description: None,
                serial_number: "CMP-001".into(),
                engine: None,
            })
            .await
            .unwrap();
        let service = ReadingService::new(repo.clone(), Classifier::preset(Preset::Historical));
        (service, repo, machine)
    }

    fn input(machine_id: &str, t: f64, v: f64, p: f64) -> ReadingInput {
        ReadingInput {
            machine_id: machine_id.to_owned(),
            serial_number: None,
            sample: SensorSample { temperature: Some(t), vibration: Some(v), oil_pressure: Some(p) },
            recorded_at: None,
        }
    }

    #[tokio::test]
    async fn ingest_classifies_and_defaults_serial_and_timestamp() {
        let (service, _, machine) = setup().await;
        let before = Utc::now();

        let r = service.ingest(input(&machine.id.to_string(), 105.0, 2.0, 3.5)).await.unwrap();
        assert_eq!(r.machine_id, machine.id);
        assert_eq!(r.serial_number.as_deref(), Some("CMP-001"));
        assert!(r.recorded_at >= before);
        assert_eq!(r.state, HealthState::Warning);
        assert_eq!(r.reason.as_deref(), Some("temperature elevated (105.0°C)"));
    }

    #[tokio::test]
    async fn ingest_keeps_supplied_serial_and_timestamp() {
        let (service, _, machine) = setup().await;
        let ts = Utc::now() - Duration::hours(3);
        let r = service
            .ingest(ReadingInput {
                serial_number: Some("OVERRIDE".into()),
                recorded_at: Some(ts),
                ..input(&machine.id.to_string(), 90.0, 2.0, 3.5)
            })
            .await
            .unwrap();
        assert_eq!(r.serial_number.as_deref(), Some("OVERRIDE"));
        assert_eq!(r.recorded_at, ts);
        assert_eq!(r.state, HealthState::Ok);
        assert!(r.reason.is_none());
    }

    #[tokio::test]
    async fn absent_values_are_stored_absent_but_classified_as_zero() {
        let (service, _, machine) = setup().await;
        let r = service
            .ingest(ReadingInput {
                machine_id: machine.id.to_string(),
                serial_number: None,
                sample: SensorSample { temperature: Some(90.0), vibration: None, oil_pressure: None },
                recorded_at: None,
            })
            .await
            .unwrap();
        assert!(r.vibration.is_none());
        assert!(r.oil_pressure.is_none());
        assert_eq!(r.state, HealthState::Critical);
        assert_eq!(r.reason.as_deref(), Some("oil pressure critical (0.0 bar)"));
    }

    #[tokio::test]
    async fn ingest_unknown_machine_is_not_found_and_writes_nothing() {
        let (service, repo, _) = setup().await;
        for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_owned()] {
            let err = service.ingest(input(&id, 90.0, 2.0, 3.5)).await.unwrap_err();
            assert!(matches!(err, FleetError::NotFound(_)));
        }
        assert!(repo.latest_readings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_skips_unknown_machines() {
        let (service, repo, machine) = setup().await;
        let id = machine.id.to_string();
        let inputs = vec![
            input(&id, 90.0, 2.0, 3.5),
            input(&Uuid::new_v4().to_string(), 90.0, 2.0, 3.5),
            input(&id, 125.0, 2.0, 3.5),
            input("garbage", 90.0, 2.0, 3.5),
        ];
        assert_eq!(service.ingest_batch(inputs).await.unwrap(), 2);
        assert_eq!(repo.readings_for_machine(machine.id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn batch_of_only_unknown_machines_inserts_nothing() {
        let (service, _, _) = setup().await;
        let inputs = vec![input(&Uuid::new_v4().to_string(), 90.0, 2.0, 3.5)];
        assert_eq!(service.ingest_batch(inputs).await.unwrap(), 0);
        assert_eq!(service.ingest_batch(Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn history_validates_limit_and_tolerates_unknown_ids() {
        let (service, _, machine) = setup().await;
        let err = service.history(&machine.id.to_string(), 0).await.unwrap_err();
        assert!(matches!(err, FleetError::InvalidInput(_)));
        assert!(service.history("nope", 10).await.unwrap().is_empty());
        assert!(service.history(&Uuid::new_v4().to_string(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_uses_latest_reading_per_machine() {
        let (service, repo, first) = setup().await;
        let mut ids = vec![first.id];
        for (i, kind) in ["compressor", "press"].iter().enumerate() {
            let m = repo
                .create_machine(NewMachine {
                    name: format!("M{i}"),
                    machine_type: (*kind).to_owned(),
                    description: None,
                    serial_number: format!("SN-{i}"),
                    engine: None,
                })
                .await
                .unwrap();
            ids.push(m.id);
        }
        let old = Utc::now() - Duration::hours(1);
        // an older critical reading on the first machine must not count
        service
            .ingest(ReadingInput { recorded_at: Some(old), ..input(&ids[0].to_string(), 130.0, 2.0, 3.5) })
            .await
            .unwrap();
        service.ingest(input(&ids[0].to_string(), 90.0, 2.0, 3.5)).await.unwrap();
        service.ingest(input(&ids[1].to_string(), 90.0, 2.0, 3.5)).await.unwrap();
        service.ingest(input(&ids[2].to_string(), 130.0, 2.0, 3.5)).await.unwrap();

        let s = service.summarize().await.unwrap();
        assert_eq!(s.total_machines, 3);
        assert_eq!((s.ok, s.warning, s.critical), (2, 0, 1));
        assert_eq!(s.per_type["compressor"], 2);
        assert_eq!(s.per_type["press"], 1);
    }

    #[tokio::test]
    async fn batch_skips_machine_deleted_before_write() {
        let inner = MemoryRepository::new();
        let (a, b) = two_machines(&inner).await;
        let repo = Arc::new(RacyRepository {
            inner: inner.clone(),
            failing_lookup: None,
            deleted_after_lookup: Some(b.id),
        });
        let service = ReadingService::new(repo, Classifier::preset(Preset::Historical));

        let (a_id, b_id) = (a.id.to_string(), b.id.to_string());
        let inputs = vec![
            input(&a_id, 90.0, 2.0, 3.5),
            input(&a_id, 91.0, 2.0, 3.5),
            input(&b_id, 92.0, 2.0, 3.5),
        ];
        assert_eq!(service.ingest_batch(inputs).await.unwrap(), 2);
        assert_eq!(inner.readings_for_machine(a.id, 10).await.unwrap().len(), 2);
        assert!(inner.get_machine(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_skips_items_whose_lookup_fails() {
        let inner = MemoryRepository::new();
        let (a, b) = two_machines(&inner).await;
        let repo = Arc::new(RacyRepository {
            inner: inner.clone(),
            failing_lookup: Some(a.id),
            deleted_after_lookup: None,
        });
        let service = ReadingService::new(repo, Classifier::preset(Preset::Historical));

        let inputs = vec![
            input(&a.id.to_string(), 90.0, 2.0, 3.5),
            input(&b.id.to_string(), 90.0, 2.0, 3.5),
        ];
        assert_eq!(service.ingest_batch(inputs).await.unwrap(), 1);
        assert!(inner.readings_for_machine(a.id, 10).await.unwrap().is_empty());
        assert_eq!(inner.readings_for_machine(b.id, 10).await.unwrap().len(), 1);
    }
}
