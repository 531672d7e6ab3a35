use std::collections::BTreeMap;

use crate::db::models::{HealthState, Reading};

/// Fleet-wide health counts built from each machine's latest reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSummary {
    pub total_machines: i64,
    pub ok: i64,
    pub warning: i64,
    pub critical: i64,
    /// Machines (not readings) per `machine_type`.
    pub per_type: BTreeMap<String, i64>,
}

impl FleetSummary {
    /// `per_type` covers every machine, including those with no readings;
    /// `latest` holds at most one reading per machine.
    pub fn tally(per_type: BTreeMap<String, i64>, latest: &[Reading]) -> Self {
        let mut summary = Self {
            total_machines: per_type.values().sum(),
            per_type,
            ..Self::default()
        };
        for reading in latest {
            match reading.state {
                HealthState::Ok => summary.ok += 1,
                HealthState::Warning => summary.warning += 1,
                HealthState::Critical => summary.critical += 1,
            }
        }
        summary
    }
}
