use axum::{
    extract::{Path, Query, State},
    Json,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};
use uuid::Uuid;

use super::{
    dto::{
        BatchResponse, CreateMachineRequest, DeleteResponse, MachineDto, ReadingBatchRequest,
        ReadingDto, ReadingRequest, SeedRange, SeedResponse, SimStartResponse, SimStatusDto,
        SimStopResponse, SummaryDto, UpdateMachineRequest,
    },
    errors::AppError,
};
use crate::{
    db::models::{HealthState, NewMachine},
    error::FleetError,
    simulator::{generator, SeedParams, Signal},
    state::AppState,
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Maximum number of readings, newest first. Defaults to 100.
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SeedParamsQuery {
    /// Days back from now, 1..=60. Defaults to 7.
    pub days: Option<i64>,
    /// Minutes between samples, 1..=60. Defaults to 10.
    pub every_minutes: Option<i64>,
    pub base_temp: Option<f64>,
    pub base_vib: Option<f64>,
    pub base_pres: Option<f64>,
    pub temp_noise: Option<f64>,
    pub vib_noise: Option<f64>,
    pub pres_noise: Option<f64>,
}

impl From<SeedParamsQuery> for SeedParams {
    fn from(q: SeedParamsQuery) -> Self {
        let d = SeedParams::default();
        let signal = |base: Option<f64>, noise: Option<f64>, default: Signal| Signal {
            baseline: base.unwrap_or(default.baseline),
            noise: noise.unwrap_or(default.noise),
        };
        Self {
            days: q.days.unwrap_or(d.days),
            every_minutes: q.every_minutes.unwrap_or(d.every_minutes),
            temperature: signal(q.base_temp, q.temp_noise, d.temperature),
            vibration: signal(q.base_vib, q.vib_noise, d.vibration),
            oil_pressure: signal(q.base_pres, q.pres_noise, d.oil_pressure),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SimStartParams {
    /// Seconds between ticks; values below 2 are raised to 2.
    pub interval_seconds: Option<u64>,
}

const DEFAULT_HISTORY_LIMIT: i64 = 100;

fn parse_machine_id(raw: &str) -> Result<Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError(FleetError::NotFound(raw.to_owned())))
}

// ---------------------------------------------------------------------------
// Machines
// ---------------------------------------------------------------------------

/// List every registered machine.
#[utoipa::path(
    get,
    path = "/maquinaria",
    responses(
        (status = 200, description = "All machines", body = Vec<MachineDto>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "maquinaria"
)]
pub async fn list_machines(State(state): State<AppState>) -> Result<Json<Vec<MachineDto>>, AppError> {
    let machines = state.repo.list_machines().await?;
    Ok(Json(machines.into_iter().map(Into::into).collect()))
}

/// Register a machine. Serial numbers are unique.
#[utoipa::path(
    post,
    path = "/maquinaria",
    request_body = CreateMachineRequest,
    responses(
        (status = 200, description = "Created machine", body = MachineDto),
        (status = 400, description = "Blank required field"),
        (status = 409, description = "Serial number already registered"),
    ),
    tag = "maquinaria"
)]
pub async fn create_machine(
    State(state): State<AppState>,
    Json(body): Json<CreateMachineRequest>,
) -> Result<Json<MachineDto>, AppError> {
    let new = NewMachine::try_from(body)?;
    if state.repo.get_machine_by_serial(&new.serial_number).await?.is_some() {
        return Err(FleetError::Conflict(format!("serial number {} already exists", new.serial_number)).into());
    }
    let machine = state.repo.create_machine(new).await?;
    tracing::info!(machine_id = %machine.id, serial_number = %machine.serial_number, "Machine created");
    Ok(Json(machine.into()))
}

/// Fetch one machine by id.
#[utoipa::path(
    get,
    path = "/maquinaria/{id}",
    params(("id" = String, Path, description = "Machine id")),
    responses(
        (status = 200, description = "Machine", body = MachineDto),
        (status = 404, description = "No such machine"),
    ),
    tag = "maquinaria"
)]
pub async fn get_machine(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MachineDto>, AppError> {
    let machine = state
        .repo
        .get_machine(parse_machine_id(&id)?)
        .await?
        .ok_or(FleetError::NotFound(id))?;
    Ok(Json(machine.into()))
}

/// Partially update a machine; omitted fields keep their value and an
/// explicit `null` clears `descripcion` or `motor`.
#[utoipa::path(
    put,
    path = "/maquinaria/{id}",
    params(("id" = String, Path, description = "Machine id")),
    request_body = UpdateMachineRequest,
    responses(
        (status = 200, description = "Updated machine", body = MachineDto),
        (status = 404, description = "No such machine"),
    ),
    tag = "maquinaria"
)]
pub async fn update_machine(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateMachineRequest>,
) -> Result<Json<MachineDto>, AppError> {
    let machine = state
        .repo
        .update_machine(parse_machine_id(&id)?, body.into())
        .await?
        .ok_or(FleetError::NotFound(id))?;
    Ok(Json(machine.into()))
}

/// Delete a machine together with all of its readings.
#[utoipa::path(
    delete,
    path = "/maquinaria/{id}",
    params(("id" = String, Path, description = "Machine id")),
    responses(
        (status = 200, description = "Machine deleted", body = DeleteResponse),
        (status = 404, description = "No such machine"),
    ),
    tag = "maquinaria"
)]
pub async fn delete_machine(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let machine_id = parse_machine_id(&id)?;
    if !state.repo.delete_machine(machine_id).await? {
        return Err(FleetError::NotFound(id).into());
    }
    tracing::info!(machine_id = %machine_id, "Machine deleted");
    Ok(Json(DeleteResponse {
        ok: true,
        message: "machine deleted".to_owned(),
    }))
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Ingest one reading; its state and reason are computed server-side.
#[utoipa::path(
    post,
    path = "/lecturas",
    request_body = ReadingRequest,
    responses(
        (status = 200, description = "Stored reading", body = ReadingDto),
        (status = 404, description = "Unknown machine"),
    ),
    tag = "lecturas"
)]
pub async fn create_reading(
    State(state): State<AppState>,
    Json(body): Json<ReadingRequest>,
) -> Result<Json<ReadingDto>, AppError> {
    let reading = state.readings.ingest(body.into()).await?;
    Ok(Json(reading.into()))
}

/// Ingest many readings. Entries for unknown machines are skipped.
#[utoipa::path(
    post,
    path = "/lecturas/batch",
    request_body = ReadingBatchRequest,
    responses(
        (status = 200, description = "Number of stored readings", body = BatchResponse),
    ),
    tag = "lecturas"
)]
pub async fn create_readings_batch(
    State(state): State<AppState>,
    Json(body): Json<ReadingBatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    let inputs = body.lecturas.into_iter().map(Into::into).collect();
    let inserted = state.readings.ingest_batch(inputs).await?;
    Ok(Json(BatchResponse { ok: true, inserted }))
}

/// Latest reading of every machine that has one.
#[utoipa::path(
    get,
    path = "/lecturas/latest",
    responses(
        (status = 200, description = "Latest reading per machine", body = Vec<ReadingDto>),
    ),
    tag = "lecturas"
)]
pub async fn latest_readings(State(state): State<AppState>) -> Result<Json<Vec<ReadingDto>>, AppError> {
    let rows = state.readings.latest().await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Reading history of one machine, newest first.
#[utoipa::path(
    get,
    path = "/lecturas/maquina/{id}",
    params(("id" = String, Path, description = "Machine id"), HistoryParams),
    responses(
        (status = 200, description = "Readings, newest first", body = Vec<ReadingDto>),
        (status = 400, description = "limit below 1"),
    ),
    tag = "lecturas"
)]
pub async fn machine_readings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ReadingDto>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let rows = state.readings.history(&id, limit).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Fleet health summary from each machine's latest reading.
#[utoipa::path(
    get,
    path = "/lecturas/resumen",
    responses(
        (status = 200, description = "Fleet summary", body = SummaryDto),
    ),
    tag = "lecturas"
)]
pub async fn summary(State(state): State<AppState>) -> Result<Json<SummaryDto>, AppError> {
    Ok(Json(state.readings.summarize().await?.into()))
}

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// Backfill synthetic history for every machine.
#[utoipa::path(
    post,
    path = "/seed/historico",
    params(SeedParamsQuery),
    responses(
        (status = 200, description = "Seed report", body = SeedResponse),
        (status = 400, description = "Parameter out of range or no machines registered"),
    ),
    tag = "seed"
)]
pub async fn seed_history(
    State(state): State<AppState>,
    Query(query): Query<SeedParamsQuery>,
) -> Result<Json<SeedResponse>, AppError> {
    let params = SeedParams::from(query);
    let mut rng = StdRng::from_os_rng();
    let report = generator::seed_history(state.repo.as_ref(), &params, &mut rng).await?;
    Ok(Json(report.into()))
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Start the live simulator.
#[utoipa::path(
    post,
    path = "/sim/start",
    params(SimStartParams),
    responses(
        (status = 200, description = "Simulator started", body = SimStartResponse),
        (status = 400, description = "Simulator already running"),
    ),
    tag = "simulador"
)]
pub async fn sim_start(
    State(state): State<AppState>,
    Query(params): Query<SimStartParams>,
) -> Result<Json<SimStartResponse>, AppError> {
    let status = state.simulator.start(params.interval_seconds).await?;
    Ok(Json(SimStartResponse {
        ok: true,
        interval_seconds: status.interval_secs,
    }))
}

/// Stop the live simulator. Stopping an idle simulator is not an error.
#[utoipa::path(
    post,
    path = "/sim/stop",
    responses(
        (status = 200, description = "Whether a running simulator was stopped", body = SimStopResponse),
    ),
    tag = "simulador"
)]
pub async fn sim_stop(State(state): State<AppState>) -> Json<SimStopResponse> {
    let stopped = state.simulator.stop().await;
    Json(SimStopResponse { ok: true, stopped })
}

#[utoipa::path(
    get,
    path = "/sim/status",
    responses(
        (status = 200, description = "Simulator status", body = SimStatusDto),
    ),
    tag = "simulador"
)]
pub async fn sim_status(State(state): State<AppState>) -> Json<SimStatusDto> {
    Json(state.simulator.status().await.into())
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service banner")),
    tag = "system"
)]
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Mantenimiento Predictivo" }))
}

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy")),
    tag = "system"
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI document
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        list_machines, create_machine, get_machine, update_machine, delete_machine,
        create_reading, create_readings_batch, latest_readings, machine_readings, summary,
        seed_history, sim_start, sim_stop, sim_status, root, health,
    ),
    components(schemas(
        MachineDto, CreateMachineRequest, UpdateMachineRequest, DeleteResponse,
        ReadingDto, ReadingRequest, ReadingBatchRequest, BatchResponse, SummaryDto, HealthState,
        SeedRange, SeedResponse, SimStartResponse, SimStopResponse, SimStatusDto,
    )),
    tags(
        (name = "maquinaria", description = "Machine registry"),
        (name = "lecturas",   description = "Sensor readings and fleet summary"),
        (name = "seed",       description = "Synthetic history"),
        (name = "simulador",  description = "Live fleet simulator"),
        (name = "system",     description = "System endpoints"),
    ),
    info(
        title = "Predictive Maintenance API",
        version = "0.1.0",
        description = "Machinery telemetry with threshold-based health classification"
    )
)]
pub struct ApiDoc;
