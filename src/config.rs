use anyhow::{bail, Context, Result};

use crate::evaluation::Preset;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset the service runs on the
    /// in-memory store and nothing survives a restart.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    /// Default seconds between simulator ticks
    pub sim_interval_secs: u64,
    /// Start the simulator as soon as the server is up
    pub sim_autostart: bool,
    /// Threshold preset applied to readings posted through the API
    pub ingest_preset: Preset,
    /// Comma-separated list of allowed origins; `*` allows any
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            db_max_connections: optional("DB_MAX_CONNECTIONS", "10")
                .parse()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8001")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            sim_interval_secs: optional("SIM_INTERVAL_SECS", "10")
                .parse()
                .context("SIM_INTERVAL_SECS must be a positive integer")?,
            sim_autostart: parse_bool(&optional("SIM_AUTOSTART", "false"))
                .context("SIM_AUTOSTART must be a boolean")?,
            ingest_preset: optional("INGEST_PRESET", "historical")
                .parse()
                .context("INGEST_PRESET must be `live` or `historical`")?,
            cors_allowed_origins: parse_origins(&optional("CORS_ALLOWED_ORIGINS", "*")),
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("not a boolean: {other}"),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
