//! Synthetic reading generation: historical backfill and live fleet ticks.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info};

use crate::{
    db::{
        models::{Machine, NewReading, SensorSample},
        Repository,
    },
    error::{FleetError, FleetResult},
    evaluation::{Classifier, Preset},
};

const TEMPERATURE_BOUNDS: (f64, f64) = (60.0, 140.0);
const VIBRATION_BOUNDS: (f64, f64) = (0.2, 8.0);
const OIL_PRESSURE_BOUNDS: (f64, f64) = (0.5, 7.0);

const LIVE_TEMPERATURE: (f64, f64) = (70.0, 110.0);
const LIVE_VIBRATION: (f64, f64) = (1.0, 5.0);
const LIVE_OIL_PRESSURE: (f64, f64) = (200.0, 350.0);

/// Time steps generated in memory before each bulk insert.
const STEPS_PER_INSERT: usize = 500;

// ---------------------------------------------------------------------------
// Historical seed
// ---------------------------------------------------------------------------

/// Baseline and noise amplitude for one sensor channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub baseline: f64,
    pub noise: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedParams {
    /// How far back to start, 1..=60.
    pub days: i64,
    /// Step between samples, 1..=60.
    pub every_minutes: i64,
    pub temperature: Signal,
    pub vibration: Signal,
    pub oil_pressure: Signal,
}

impl Default for SeedParams {
    fn default() -> Self {
        Self {
            days: 7,
            every_minutes: 10,
            temperature: Signal { baseline: 90.0, noise: 15.0 },
            vibration: Signal { baseline: 2.0, noise: 1.5 },
            oil_pressure: Signal { baseline: 3.5, noise: 1.0 },
        }
    }
}

impl SeedParams {
    pub fn validate(&self) -> FleetResult<()> {
        if !(1..=60).contains(&self.days) {
            return Err(FleetError::InvalidInput(format!("days must be in 1..=60, got {}", self.days)));
        }
        if !(1..=60).contains(&self.every_minutes) {
            return Err(FleetError::InvalidInput(format!(
                "every_minutes must be in 1..=60, got {}",
                self.every_minutes
            )));
        }
        for (name, signal) in [
            ("temperature", self.temperature),
            ("vibration", self.vibration),
            ("oil_pressure", self.oil_pressure),
        ] {
            if !signal.baseline.is_finite() || !signal.noise.is_finite() || signal.noise < 0.0 {
                return Err(FleetError::InvalidInput(format!(
                    "{name}: baseline must be finite and noise a finite non-negative number"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    pub inserted: u64,
    pub machines: usize,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub step_minutes: i64,
}

/// Timestamps from `from` to `to` inclusive, `step` apart.
fn time_steps(from: DateTime<Utc>, to: DateTime<Utc>, step: Duration) -> Vec<DateTime<Utc>> {
    let mut steps = Vec::new();
    let mut t = from;
    while t <= to {
        steps.push(t);
        t += step;
    }
    steps
}

fn jitter<R: Rng>(rng: &mut R, signal: Signal, (lo, hi): (f64, f64)) -> f64 {
    let offset = if signal.noise > 0.0 {
        // unit draw scaled afterwards; `-noise..=noise` overflows for huge noise
        rng.random_range(-1.0..=1.0) * signal.noise
    } else {
        0.0
    };
    round1((signal.baseline + offset).clamp(lo, hi))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Backfills one reading per machine at every step from `now - days` to `now`.
///
/// Values are clamped to plausible sensor ranges, rounded to one decimal and
/// classified with the historical preset after rounding. Each machine's rows
/// are inserted in chronological order.
pub async fn seed_history<R: Rng + Send>(
    repo: &dyn Repository,
    params: &SeedParams,
    rng: &mut R,
) -> FleetResult<SeedReport> {
    params.validate()?;

    let machines = repo.list_machines().await?;
    if machines.is_empty() {
        return Err(FleetError::EmptyFleet);
    }

    let to = Utc::now();
    let from = to - Duration::days(params.days);
    let steps = time_steps(from, to, Duration::minutes(params.every_minutes));
    let classifier = Classifier::preset(Preset::Historical);

    info!(
        machines = machines.len(),
        steps = steps.len(),
        step_minutes = params.every_minutes,
        "Seeding historical readings"
    );

    let mut inserted = 0;
    for chunk in steps.chunks(STEPS_PER_INSERT) {
        let mut rows = Vec::with_capacity(chunk.len() * machines.len());
        for &ts in chunk {
            for m in &machines {
                let sample = SensorSample {
                    temperature: Some(jitter(rng, params.temperature, TEMPERATURE_BOUNDS)),
                    vibration: Some(jitter(rng, params.vibration, VIBRATION_BOUNDS)),
                    oil_pressure: Some(jitter(rng, params.oil_pressure, OIL_PRESSURE_BOUNDS)),
                };
                rows.push(NewReading::classified(
                    &classifier,
                    m.id,
                    Some(m.serial_number.clone()),
                    sample,
                    ts,
                ));
            }
        }
        inserted += repo.insert_readings(rows).await?;
    }

    info!(inserted, "Historical seed complete");
    Ok(SeedReport {
        inserted,
        machines: machines.len(),
        from,
        to,
        step_minutes: params.every_minutes,
    })
}

// ---------------------------------------------------------------------------
// Live tick
// ---------------------------------------------------------------------------

fn live_sample<R: Rng>(rng: &mut R) -> SensorSample {
    let mut draw = |(lo, hi): (f64, f64)| round1(rng.random_range(lo..=hi));
    SensorSample {
        temperature: Some(draw(LIVE_TEMPERATURE)),
        vibration: Some(draw(LIVE_VIBRATION)),
        oil_pressure: Some(draw(LIVE_OIL_PRESSURE)),
    }
}

/// Builds one live-preset reading per machine, all stamped `now`.
pub fn live_readings<R: Rng>(
    machines: &[Machine],
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<NewReading> {
    let classifier = Classifier::preset(Preset::Live);
    machines
        .iter()
        .map(|m| {
            NewReading::classified(&classifier, m.id, Some(m.serial_number.clone()), live_sample(rng), now)
        })
        .collect()
}

/// One fleet-wide simulation step. An empty fleet is a no-op.
pub async fn tick<R: Rng + Send>(repo: &dyn Repository, rng: &mut R) -> FleetResult<u64> {
    let machines = repo.list_machines().await?;
    if machines.is_empty() {
        debug!("No machines registered; skipping simulation tick");
        return Ok(0);
    }
    let rows = live_readings(&machines, Utc::now(), rng);
    let inserted = repo.insert_readings(rows).await?;
    debug!(inserted, "Simulation tick complete");
    Ok(inserted)
}
