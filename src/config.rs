//! Application configuration

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::RecorderError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl HttpConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite://berth-recorder.db?mode=rwc`
    pub url: String,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    /// Maximum write requests per client within one window
    pub max_requests: u32,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub window: Duration,
    /// How often expired client windows are purged from memory
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("BERTHRECORDER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl RateLimitConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.max_requests == 0 {
            return Err(RecorderError::ConfigurationError {
                message: "Rate limit max_requests must be greater than zero".to_string(),
            });
        }
        if self.window.is_zero() {
            return Err(RecorderError::ConfigurationError {
                message: "Rate limit window must be greater than zero".to_string(),
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(RecorderError::ConfigurationError {
                message: "Rate limit sweep interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
