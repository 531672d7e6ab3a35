//! Threshold classifier mapping raw sensor values to a [`HealthState`].
//!
//! Three independent rules run in a fixed order (vibration, temperature, oil
//! pressure). Each yields at most one finding. If any finding is critical the
//! state is `CRITICO` and the reason lists only the critical findings; else if
//! any warning fired the state is `ALERTA` with the warnings; otherwise `OK`
//! with no reason. Findings are joined with `"; "` in rule order.

use std::{fmt, str::FromStr};

use anyhow::Result;

use crate::db::models::{HealthState, SensorSample};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Threshold constants for one calibration. All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Vibration above this (mm/s) is critical.
    pub vibration_critical: f64,
    /// Vibration above this (mm/s) is elevated.
    pub vibration_warning: f64,
    /// Temperature above this (°C) is critical.
    pub temperature_critical: f64,
    /// Temperature above this (°C) is elevated.
    pub temperature_high: f64,
    /// Temperature below this (°C) is low.
    pub temperature_low: f64,
    /// Oil pressure below this is critical.
    pub oil_pressure_critical: f64,
    /// Oil pressure below this is low.
    pub oil_pressure_low: f64,
    /// Oil pressure above this is high.
    pub oil_pressure_high: f64,
}

/// Calibration used for ingestion and historical seeding. Oil pressure in bar.
pub const HISTORICAL: Thresholds = Thresholds {
    vibration_critical: 4.5,
    vibration_warning: 2.5,
    temperature_critical: 120.0,
    temperature_high: 100.0,
    temperature_low: 80.0,
    oil_pressure_critical: 1.5,
    oil_pressure_low: 2.5,
    oil_pressure_high: 5.5,
};

/// Calibration used by the live simulator tick.
///
/// Oil pressure runs on a ×100 scale relative to [`HISTORICAL`].
pub const LIVE: Thresholds = Thresholds {
    vibration_critical: 4.5,
    vibration_warning: 2.5,
    temperature_critical: 120.0,
    temperature_high: 100.0,
    temperature_low: 80.0,
    oil_pressure_critical: 150.0,
    oil_pressure_low: 200.0,
    oil_pressure_high: 350.0,
};

// ---------------------------------------------------------------------------
// Preset
// ---------------------------------------------------------------------------

/// Named threshold presets selectable by callers and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Live,
    Historical,
}

impl Preset {
    pub const fn thresholds(self) -> Thresholds {
        match self {
            Preset::Live => LIVE,
            Preset::Historical => HISTORICAL,
        }
    }
}

impl FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "live" => Ok(Self::Live),
            "historical" => Ok(Self::Historical),
            other => Err(anyhow::anyhow!("unknown threshold preset: {other:?}")),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Preset::Live => "live",
            Preset::Historical => "historical",
        })
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Severity {
    Warning,
    Critical,
}

struct Finding {
    severity: Severity,
    message: String,
}

impl Finding {
    fn warning(message: String) -> Self {
        Self { severity: Severity::Warning, message }
    }

    fn critical(message: String) -> Self {
        Self { severity: Severity::Critical, message }
    }
}

/// Outcome of one classification: the state and, unless `OK`, why.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub state: HealthState,
    pub reason: Option<String>,
}

/// Pure, deterministic classifier parameterised by a set of [`Thresholds`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    thresholds: Thresholds,
}

impl Classifier {
    pub const fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub const fn preset(preset: Preset) -> Self {
        Self::new(preset.thresholds())
    }

    pub fn classify(&self, temperature: f64, vibration: f64, oil_pressure: f64) -> Evaluation {
        let findings = [
            self.vibration_rule(vibration),
            self.temperature_rule(temperature),
            self.oil_pressure_rule(oil_pressure),
        ];

        let join = |severity: Severity| {
            findings
                .iter()
                .flatten()
                .filter(|f| f.severity == severity)
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        };

        let worst = findings.iter().flatten().map(|f| f.severity).max();
        match worst {
            Some(Severity::Critical) => Evaluation {
                state: HealthState::Critical,
                reason: Some(join(Severity::Critical)),
            },
            Some(Severity::Warning) => Evaluation {
                state: HealthState::Warning,
                reason: Some(join(Severity::Warning)),
            },
            None => Evaluation { state: HealthState::Ok, reason: None },
        }
    }

    /// Classify a sample whose absent values are treated as 0.
    pub fn classify_sample(&self, sample: &SensorSample) -> Evaluation {
        self.classify(
            sample.temperature.unwrap_or(0.0),
            sample.vibration.unwrap_or(0.0),
            sample.oil_pressure.unwrap_or(0.0),
        )
    }

    fn vibration_rule(&self, v: f64) -> Option<Finding> {
        let t = &self.thresholds;
        if v > t.vibration_critical {
            Some(Finding::critical(format!("vibration critical ({v:?} mm/s)")))
        } else if v > t.vibration_warning {
            Some(Finding::warning(format!("vibration elevated ({v:?} mm/s)")))
        } else {
            None
        }
    }

    fn temperature_rule(&self, v: f64) -> Option<Finding> {
        let t = &self.thresholds;
        if v > t.temperature_critical {
            Some(Finding::critical(format!("temperature critical ({v:?}°C)")))
        } else if v > t.temperature_high {
            Some(Finding::warning(format!("temperature elevated ({v:?}°C)")))
        } else if v < t.temperature_low {
            Some(Finding::warning(format!("temperature low ({v:?}°C)")))
        } else {
            None
        }
    }

    fn oil_pressure_rule(&self, v: f64) -> Option<Finding> {
        let t = &self.thresholds;
        if v < t.oil_pressure_critical {
            Some(Finding::critical(format!("oil pressure critical ({v:?} bar)")))
        } else if v < t.oil_pressure_low {
            Some(Finding::warning(format!("oil pressure low ({v:?} bar)")))
        } else if v > t.oil_pressure_high {
            Some(Finding::warning(format!("oil pressure high ({v:?} bar)")))
        } else {
            None
        }
    }
}

impl From<Preset> for Classifier {
    fn from(preset: Preset) -> Self {
        Self::preset(preset)
    }
}
