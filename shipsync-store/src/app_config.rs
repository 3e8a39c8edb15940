use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub carrier: CarrierConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_ms: u64,
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_statement_timeout() -> u64 { 5_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct CarrierConfig {
    pub base_url: String,
    #[serde(default = "default_tracking_path")]
    pub tracking_path: String,
    pub api_token: String,
    #[serde(default = "default_token_header")]
    pub token_header: String,
    #[serde(default = "default_carrier_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: usize,
    #[serde(default = "default_breaker_reset")]
    pub breaker_reset_seconds: u64,
}

fn default_tracking_path() -> String { "/parcels/{tracking}".to_string() }
fn default_token_header() -> String { "X-API-TOKEN".to_string() }
fn default_carrier_timeout() -> u64 { 10 }
fn default_breaker_threshold() -> usize { 5 }
fn default_breaker_reset() -> u64 { 60 }

impl CarrierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn breaker_reset(&self) -> Duration {
        Duration::from_secs(self.breaker_reset_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_order_timeout")]
    pub order_timeout_seconds: u64,
    pub batch_limit: Option<usize>,
}

fn default_interval() -> u64 { 600 } // every 10 minutes
fn default_concurrency() -> usize { 4 }
fn default_order_timeout() -> u64 { 30 }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            concurrency: default_concurrency(),
            order_timeout_seconds: default_order_timeout(),
            batch_limit: None,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    /// Used when `RUST_LOG` is not set.
    pub filter: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of SHIPSYNC)
            // Eg.. `SHIPSYNC__CARRIER__API_TOKEN=...` would set `carrier.api_token`
            .add_source(config::Environment::with_prefix("SHIPSYNC").separator("__"))
            .build()?;

        let config: Config = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the worker cannot run with. A zero interval would
    /// panic the tick timer and zero timeouts fail every call.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let must_be_positive = [
            ("sync.interval_seconds", self.sync.interval_seconds),
            ("sync.order_timeout_seconds", self.sync.order_timeout_seconds),
            ("sync.concurrency", self.sync.concurrency as u64),
            ("carrier.timeout_seconds", self.carrier.timeout_seconds),
        ];
        match must_be_positive.iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(config::ConfigError::Message(format!(
                "{} must be greater than zero",
                key
            ))),
            None => Ok(()),
        }
    }
}
