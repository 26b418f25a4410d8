//! Error types for the synchronization layer

use thiserror::Error;

/// Sync error
#[derive(Debug, Error)]
pub enum Error {
    /// Error returned by the store or ledger
    #[error(transparent)]
    Ledger(#[from] tabsplit_ledger::Error),

    /// Store did not acknowledge a mutation in time
    #[error("No acknowledgement after {waited_ms}ms")]
    Timeout {
        /// Time waited before giving up
        waited_ms: u64,
    },

    /// Change feed closed underneath the client
    #[error("Change feed closed")]
    FeedClosed,

    /// Invalid sync configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Ledger(err) => err.is_transient(),
            Error::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Whether the client should re-read the receipt before doing anything else
    pub fn needs_refresh(&self) -> bool {
        matches!(
            self,
            Error::Ledger(
                tabsplit_ledger::Error::Overclaim { .. }
                    | tabsplit_ledger::Error::NotFound(_)
                    | tabsplit_ledger::Error::Conflict(_)
            ) | Error::FeedClosed
        )
    }

    /// Message safe to show a guest
    pub fn user_message(&self) -> String {
        match self {
            Error::Ledger(err) => err.user_message(),
            Error::Timeout { .. } => "Still waiting on the server, try again".to_string(),
            Error::FeedClosed => "Connection lost, reconnecting".to_string(),
            Error::Configuration(_) | Error::Io(_) => "Something went wrong".to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tabsplit_ledger::ItemId;

    #[test]
    fn test_overclaim_needs_refresh() {
        let err = Error::from(tabsplit_ledger::Error::Overclaim {
            item_id: ItemId::generate(),
            requested: Decimal::ONE,
            available: Decimal::ZERO,
        });
        assert!(err.needs_refresh());
        assert!(!err.is_transient());
        assert_eq!(err.user_message(), "Someone just claimed that, refreshing");
    }

    #[test]
    fn test_store_failure_is_transient() {
        let err = Error::from(tabsplit_ledger::Error::Store("connection reset".into()));
        assert!(err.is_transient());
        assert!(!err.needs_refresh());
        assert!(Error::Timeout { waited_ms: 10 }.is_transient());
    }
}
