//! Configuration for the claim ledger

use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Store actor configuration
    pub store: StoreConfig,

    /// Claim validation configuration
    pub claims: ClaimsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "tabsplit-ledger".to_string(),
            store: StoreConfig::default(),
            claims: ClaimsConfig::default(),
        }
    }
}

/// Store actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Bounded mailbox size (backpressure on writers)
    pub mailbox_capacity: usize,

    /// Buffered change events per receipt before slow subscribers lag
    pub feed_capacity: usize,

    /// Deleted item and participant IDs remembered for `Conflict` errors
    pub tombstone_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
            feed_capacity: 256,
            tombstone_capacity: crate::tables::DEFAULT_TOMBSTONE_CAPACITY,
        }
    }
}

/// Claim validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimsConfig {
    /// Maximum decimal places accepted in a claim portion
    pub max_portion_scale: u32,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            max_portion_scale: 4,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(name) = std::env::var("TABSPLIT_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Some(capacity) = env_number("TABSPLIT_MAILBOX_CAPACITY")? {
            config.store.mailbox_capacity = capacity;
        }

        if let Some(capacity) = env_number("TABSPLIT_FEED_CAPACITY")? {
            config.store.feed_capacity = capacity;
        }

        if let Some(capacity) = env_number("TABSPLIT_TOMBSTONE_CAPACITY")? {
            config.store.tombstone_capacity = capacity;
        }

        if let Some(scale) = env_number("TABSPLIT_MAX_PORTION_SCALE")? {
            config.claims.max_portion_scale = scale;
        }

        Ok(config)
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
