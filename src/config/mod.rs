use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::time::Duration;

use crate::payments::RateTable;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Fees, crypto assets, settlement delays. Replacing a map here (e.g.
    /// `rates.fees`) replaces it wholesale.
    #[serde(default)]
    pub rates: RateTable,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Shared HMAC secret subscribers verify signatures with.
    pub secret: String,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub timeout_secs: u64,
    #[serde(default)]
    pub livemode: bool,
}

impl WebhookConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub tick_interval_secs: u64,
    pub batch_size: i64,
    /// Fake one block per tick for crypto charges. Off means confirmations
    /// only arrive through the push endpoint.
    pub simulate_confirmations: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 5,
            batch_size: 200,
            simulate_confirmations: false,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://chargeflow.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("webhooks.max_attempts", 3)?
            .set_default("webhooks.backoff_base_ms", 2000)?
            .set_default("webhooks.timeout_secs", 30)?
            .set_default("webhooks.livemode", false)?

            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // CHARGEFLOW__WEBHOOKS__SECRET=... ; double underscore separates levels
            .add_source(Environment::with_prefix("CHARGEFLOW").separator("__"))

            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.webhooks.secret.trim().is_empty() {
            return Err(ConfigError::Message("webhooks.secret must not be empty".to_string()));
        }
        if self.webhooks.max_attempts == 0 {
            return Err(ConfigError::Message("webhooks.max_attempts must be at least 1".to_string()));
        }
        if self.worker.tick_interval_secs == 0 {
            return Err(ConfigError::Message("worker.tick_interval_secs must be positive".to_string()));
        }
        self.rates
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://chargeflow.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            webhooks: WebhookConfig {
                secret: "whsec_change-me-in-production".to_string(),
                max_attempts: 3,
                backoff_base_ms: 2000,
                timeout_secs: 30,
                livemode: false,
            },
            worker: WorkerConfig::default(),
            rates: RateTable::default(),
        }
    }
}
