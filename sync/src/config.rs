//! Configuration for sync clients

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sync client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retry policy for transient store failures
    pub retry: RetryConfig,

    /// How long an unacknowledged mutation stays on screen
    pub confirm_timeout_ms: u64,

    /// How often pending mutations are checked for expiry
    pub expiry_tick_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            confirm_timeout_ms: 5_000,
            expiry_tick_ms: 250,
        }
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First retry delay
    pub initial_delay_ms: u64,

    /// Cap on a single retry delay
    pub max_delay_ms: u64,

    /// Growth factor between retries
    pub multiplier: f64,

    /// Give up after this much total time
    pub max_elapsed_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 50,
            max_delay_ms: 2_000,
            multiplier: 2.0,
            max_elapsed_ms: 10_000,
        }
    }
}

impl SyncConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = SyncConfig::default();

        if let Some(ms) = env_number("TABSPLIT_CONFIRM_TIMEOUT_MS")? {
            config.confirm_timeout_ms = ms;
        }
        if let Some(ms) = env_number("TABSPLIT_EXPIRY_TICK_MS")? {
            config.expiry_tick_ms = ms;
        }
        if let Some(ms) = env_number("TABSPLIT_RETRY_INITIAL_MS")? {
            config.retry.initial_delay_ms = ms;
        }
        if let Some(ms) = env_number("TABSPLIT_RETRY_MAX_ELAPSED_MS")? {
            config.retry.max_elapsed_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.expiry_tick_ms == 0 {
            return Err(crate::Error::Configuration(
                "expiry_tick_ms must be positive".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(crate::Error::Configuration(format!(
                "retry.multiplier must be at least 1.0 (got {})",
                self.retry.multiplier
            )));
        }
        Ok(())
    }

    /// Confirm timeout as a duration
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    /// Expiry tick as a duration
    pub fn expiry_tick(&self) -> Duration {
        Duration::from_millis(self.expiry_tick_ms)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> crate::Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| crate::Error::Configuration(format!("{} is not a number: {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}
