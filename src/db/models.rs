use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::evaluation::Classifier;

/// Mirrors the `health_state` Postgres enum.
///
/// Ordered by severity so `max()` over a set of findings yields the overall state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "health_state")]
pub enum HealthState {
    #[serde(rename = "OK")]
    #[sqlx(rename = "OK")]
    Ok,
    #[serde(rename = "ALERTA")]
    #[sqlx(rename = "ALERTA")]
    Warning,
    #[serde(rename = "CRITICO")]
    #[sqlx(rename = "CRITICO")]
    Critical,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Ok => "OK",
            HealthState::Warning => "ALERTA",
            HealthState::Critical => "CRITICO",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Machine {
    pub id: Uuid,
    pub name: String,
    pub machine_type: String,
    pub description: Option<String>,
    pub serial_number: String,
    pub engine: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMachine {
    pub name: String,
    pub machine_type: String,
    pub description: Option<String>,
    pub serial_number: String,
    pub engine: Option<String>,
}

/// Partial update: `None` leaves the stored value untouched. The optional
/// columns take `Some(None)` to clear them.
#[derive(Debug, Clone, Default)]
pub struct MachineUpdate {
    pub name: Option<String>,
    pub machine_type: Option<String>,
    pub description: Option<Option<String>>,
    pub engine: Option<Option<String>>,
}

impl MachineUpdate {
    pub fn apply(self, machine: &mut Machine) {
        if let Some(v) = self.name {
            machine.name = v;
        }
        if let Some(v) = self.machine_type {
            machine.machine_type = v;
        }
        if let Some(v) = self.description {
            machine.description = v;
        }
        if let Some(v) = self.engine {
            machine.engine = v;
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub machine_id: Uuid,
    pub serial_number: Option<String>,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub oil_pressure: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    pub state: HealthState,
    /// `None` when `state` is `Ok`.
    pub reason: Option<String>,
}

/// Raw sensor values as supplied by a client or the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSample {
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub oil_pressure: Option<f64>,
}

/// A reading ready for insertion.
///
/// `state` and `reason` can only be filled in by [`NewReading::classified`],
/// so a stored reading always agrees with its own sensor values.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub machine_id: Uuid,
    pub serial_number: Option<String>,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub oil_pressure: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    pub(crate) state: HealthState,
    pub(crate) reason: Option<String>,
}

impl NewReading {
    /// Run `classifier` over `sample` (absent values count as 0) and build the row.
    pub fn classified(
        classifier: &Classifier,
        machine_id: Uuid,
        serial_number: Option<String>,
        sample: SensorSample,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let evaluation = classifier.classify_sample(&sample);
        Self {
            machine_id,
            serial_number,
            temperature: sample.temperature,
            vibration: sample.vibration,
            oil_pressure: sample.oil_pressure,
            recorded_at,
            state: evaluation.state,
            reason: evaluation.reason,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Attach the store-assigned sequence id.
    pub(crate) fn into_reading(self, id: i64) -> Reading {
        Reading {
            id,
            machine_id: self.machine_id,
            serial_number: self.serial_number,
            temperature: self.temperature,
            vibration: self.vibration,
            oil_pressure: self.oil_pressure,
            recorded_at: self.recorded_at,
            state: self.state,
            reason: self.reason,
        }
    }
}
