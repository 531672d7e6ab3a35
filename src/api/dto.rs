use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::models::{HealthState, Machine, MachineUpdate, NewMachine, Reading, SensorSample},
    error::FleetError,
    readings::{FleetSummary, ReadingInput},
    simulator::{SeedReport, SimulationStatus},
};

// ---------------------------------------------------------------------------
// Machines
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MachineDto {
    pub id: Uuid,
    pub nombre: String,
    pub tipo: String,
    pub descripcion: Option<String>,
    pub numero_serie: String,
    pub motor: Option<String>,
}

impl From<Machine> for MachineDto {
    fn from(m: Machine) -> Self {
        Self {
            id: m.id,
            nombre: m.name,
            tipo: m.machine_type,
            descripcion: m.description,
            numero_serie: m.serial_number,
            motor: m.engine,
        }
    }
}

/// Request body for `POST /maquinaria`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMachineRequest {
    pub nombre: String,
    /// Machine category, e.g. `compresor`.
    pub tipo: String,
    pub descripcion: Option<String>,
    /// Must be unique across the fleet.
    pub numero_serie: String,
    /// Engine or motor descriptor.
    pub motor: Option<String>,
}

impl TryFrom<CreateMachineRequest> for NewMachine {
    type Error = FleetError;

    fn try_from(req: CreateMachineRequest) -> Result<Self, Self::Error> {
        for (field, value) in [("nombre", &req.nombre), ("tipo", &req.tipo), ("numero_serie", &req.numero_serie)] {
            if value.trim().is_empty() {
                return Err(FleetError::InvalidInput(format!("{field} must not be empty")));
            }
        }
        Ok(Self {
            name: req.nombre,
            machine_type: req.tipo,
            description: req.descripcion,
            serial_number: req.numero_serie,
            engine: req.motor,
        })
    }
}

/// Request body for `PUT /maquinaria/{id}`. Omitted fields are left
/// unchanged; `descripcion` and `motor` are cleared by an explicit `null`.
/// The serial number cannot be changed.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateMachineRequest {
    pub nombre: Option<String>,
    pub tipo: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub descripcion: Option<Option<String>>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub motor: Option<Option<String>>,
}

/// `Some(None)` for an explicit `null`; absent fields fall back to `None`
/// through `#[serde(default)]`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl From<UpdateMachineRequest> for MachineUpdate {
    fn from(req: UpdateMachineRequest) -> Self {
        Self {
            name: req.nombre,
            machine_type: req.tipo,
            description: req.descripcion,
            engine: req.motor,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    pub ok: bool,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// A persisted reading. Field order matches the dashboard's export columns.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadingDto {
    pub id: i64,
    pub maquinaria_id: Uuid,
    pub numero_serie: Option<String>,
    /// °C
    pub temperatura: Option<f64>,
    /// mm/s RMS
    pub vibracion: Option<f64>,
    pub presion_aceite: Option<f64>,
    pub ts: DateTime<Utc>,
    pub estado: HealthState,
    /// Triggered conditions joined with `"; "`. Absent when `estado` is `OK`.
    pub motivo: Option<String>,
}

impl From<Reading> for ReadingDto {
    fn from(r: Reading) -> Self {
        Self {
            id: r.id,
            maquinaria_id: r.machine_id,
            numero_serie: r.serial_number,
            temperatura: r.temperature,
            vibracion: r.vibration,
            presion_aceite: r.oil_pressure,
            ts: r.recorded_at,
            estado: r.state,
            motivo: r.reason,
        }
    }
}

/// Request body for `POST /lecturas`. State and reason are always computed.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReadingRequest {
    pub maquinaria_id: String,
    /// Defaults to the machine's serial number.
    pub numero_serie: Option<String>,
    pub temperatura: Option<f64>,
    pub vibracion: Option<f64>,
    pub presion_aceite: Option<f64>,
    /// Defaults to the time of ingestion.
    pub ts: Option<DateTime<Utc>>,
}

impl From<ReadingRequest> for ReadingInput {
    fn from(req: ReadingRequest) -> Self {
        Self {
            machine_id: req.maquinaria_id,
            serial_number: req.numero_serie,
            sample: SensorSample {
                temperature: req.temperatura,
                vibration: req.vibracion,
                oil_pressure: req.presion_aceite,
            },
            recorded_at: req.ts,
        }
    }
}

/// Request body for `POST /lecturas/batch`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReadingBatchRequest {
    pub lecturas: Vec<ReadingRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchResponse {
    pub ok: bool,
    pub inserted: u64,
}

/// Response for `GET /lecturas/resumen`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SummaryDto {
    pub total_maquinas: i64,
    pub ok: i64,
    pub alerta: i64,
    pub critico: i64,
    /// Machine count per `tipo`.
    pub por_tipo: BTreeMap<String, i64>,
}

impl From<FleetSummary> for SummaryDto {
    fn from(s: FleetSummary) -> Self {
        Self {
            total_maquinas: s.total_machines,
            ok: s.ok,
            alerta: s.warning,
            critico: s.critical,
            por_tipo: s.per_type,
        }
    }
}

// ---------------------------------------------------------------------------
// Seed & simulator
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SeedRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SeedResponse {
    pub ok: bool,
    pub inserted: u64,
    pub machines: usize,
    pub range: SeedRange,
    pub step_minutes: i64,
}

impl From<SeedReport> for SeedResponse {
    fn from(r: SeedReport) -> Self {
        Self {
            ok: true,
            inserted: r.inserted,
            machines: r.machines,
            range: SeedRange { from: r.from, to: r.to },
            step_minutes: r.step_minutes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SimStartResponse {
    pub ok: bool,
    pub interval_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SimStopResponse {
    pub ok: bool,
    /// `false` when the simulator was not running.
    pub stopped: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SimStatusDto {
    pub running: bool,
    pub interval_seconds: u64,
}

impl From<SimulationStatus> for SimStatusDto {
    fn from(s: SimulationStatus) -> Self {
        Self {
            running: s.running,
            interval_seconds: s.interval_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_tells_null_from_absent() {
        let req: UpdateMachineRequest =
            serde_json::from_str(r#"{"nombre": null, "descripcion": null, "motor": "V8"}"#).unwrap();
        let update = MachineUpdate::from(req);
        assert_eq!(update.name, None);
        assert_eq!(update.description, Some(None));
        assert_eq!(update.engine, Some(Some("V8".to_owned())));

        let update = MachineUpdate::from(serde_json::from_str::<UpdateMachineRequest>("{}").unwrap());
        assert_eq!(update.description, None);
        assert_eq!(update.engine, None);
    }
}
