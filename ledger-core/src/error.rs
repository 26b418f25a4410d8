//! Error types for the claim ledger

use crate::types::ItemId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Claim would push the item's claimed quantity past its quantity
    #[error("Overclaim on item {item_id}: requested {requested}, available {available}")]
    Overclaim {
        /// Item being claimed
        item_id: ItemId,
        /// Portion the caller asked for
        requested: Decimal,
        /// Portion still claimable by the caller
        available: Decimal,
    },

    /// Dangling receipt/item/participant/claim reference
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrent structural change (e.g. item deleted mid-claim)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed receipt data (negative prices, bad quantities, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transient backing store failure
    #[error("Storage error: {0}")]
    Store(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller can recover by refreshing its view and retrying.
    ///
    /// `Configuration` is fatal for the receipt until the host corrects it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Overclaim { .. }
                | Error::NotFound(_)
                | Error::Conflict(_)
                | Error::Store(_)
                | Error::Concurrency(_)
        )
    }

    /// Whether the same request may succeed if simply resent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Store(_) | Error::Concurrency(_))
    }

    /// Message suitable for showing to a participant
    pub fn user_message(&self) -> String {
        match self {
            Error::Overclaim { .. } | Error::Conflict(_) => {
                "Someone just claimed that, refreshing".to_string()
            }
            Error::NotFound(_) => "This receipt changed, refreshing".to_string(),
            Error::Configuration(msg) => format!("The receipt needs fixing: {}", msg),
            _ => "Something went wrong, please try again".to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(format!("Failed to parse config: {}", err))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_overclaim_is_recoverable_not_transient() {
        let err = Error::Overclaim {
            item_id: ItemId::from_uuid(Uuid::nil()),
            requested: Decimal::from(2),
            available: Decimal::ONE,
        };
        assert!(err.is_recoverable());
        assert!(!err.is_transient());
        assert_eq!(err.user_message(), "Someone just claimed that, refreshing");
    }

    #[test]
    fn test_configuration_is_fatal() {
        let err = Error::Configuration("negative price".to_string());
        assert!(!err.is_recoverable());
        assert!(err.user_message().contains("negative price"));
    }

    #[test]
    fn test_store_errors_are_transient() {
        assert!(Error::Store("timeout".into()).is_transient());
        assert!(Error::Concurrency("mailbox closed".into()).is_transient());
        assert!(!Error::NotFound("item".into()).is_transient());
    }
}
