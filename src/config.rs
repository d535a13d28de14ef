//! Process configuration from environment variables
//!
//! - `MEDISAFE_HOST`: Bind address (default: 0.0.0.0)
//! - `MEDISAFE_PORT`: Port number (default: 8080)
//! - `MEDISAFE_THRESHOLDS`: JSON threshold file (default: built-in sensor catalogue)
//! - `MEDISAFE_SNAPSHOT_PATH`: Store snapshot file (default: none, state is not persisted)
//! - `MEDISAFE_SNAPSHOT_INTERVAL_SECS`: Snapshot interval (default: 30)
//! - `MEDISAFE_RETRY_ATTEMPTS`: Store attempts per call, including the first (default: 4)
//! - `MEDISAFE_WEBHOOK_URL`: Webhook for alert notifications (default: log only)

use std::path::PathBuf;
use std::time::Duration;

use crate::alerts::NotifyTarget;
use crate::api::ServerConfig;
use crate::storage::RetryPolicy;
use crate::thresholds::ThresholdConfig;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// JSON parse error
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Everything the server binary needs to start
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub server: ServerConfig,
    pub thresholds_path: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval: Duration,
    pub retry: RetryPolicy,
    pub notify_targets: Vec<NotifyTarget>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            thresholds_path: None,
            snapshot_path: None,
            snapshot_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            notify_targets: vec![NotifyTarget::Log],
        }
    }
}

impl MonitorConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset and empty variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(host) = get("MEDISAFE_HOST") {
            config.server.host = host;
        }
        if let Some(port) = get("MEDISAFE_PORT") {
            config.server.port = parse_number("MEDISAFE_PORT", &port)?;
        }

        config.thresholds_path = get("MEDISAFE_THRESHOLDS").map(PathBuf::from);
        config.snapshot_path = get("MEDISAFE_SNAPSHOT_PATH").map(PathBuf::from);

        if let Some(secs) = get("MEDISAFE_SNAPSHOT_INTERVAL_SECS") {
            let secs: u64 = parse_number("MEDISAFE_SNAPSHOT_INTERVAL_SECS", &secs)?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "MEDISAFE_SNAPSHOT_INTERVAL_SECS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config.snapshot_interval = Duration::from_secs(secs);
        }

        if let Some(attempts) = get("MEDISAFE_RETRY_ATTEMPTS") {
            let attempts: u32 = parse_number("MEDISAFE_RETRY_ATTEMPTS", &attempts)?;
            if attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "MEDISAFE_RETRY_ATTEMPTS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config.retry.max_attempts = attempts;
        }

        if let Some(url) = get("MEDISAFE_WEBHOOK_URL") {
            config.notify_targets.push(NotifyTarget::Webhook {
                url: url.trim().to_string(),
                headers: Default::default(),
            });
        }

        Ok(config)
    }

    /// Threshold configuration from the configured file, or the built-in catalogue
    pub fn thresholds(&self) -> Result<ThresholdConfig, ConfigError> {
        match &self.thresholds_path {
            Some(path) => ThresholdConfig::load(path),
            None => Ok(ThresholdConfig::builtin()),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
