//! Tabsplit Synchronization Layer
//!
//! Keeps each connected device's view of a receipt current without any
//! shared memory between devices. Consistency comes from the store's atomic
//! check-and-write plus the change feed.
//!
//! # Architecture
//!
//! - **Projection**: per-receipt copy of confirmed rows, hydrated from an
//!   atomic snapshot and advanced by feed events
//! - **Pending Mutations**: local claims and unclaims tracked as unconfirmed,
//!   confirmed, rejected or reverted
//! - **Client Loop**: one task per device selecting over the feed, an expiry
//!   ticker and shutdown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use tabsplit_ledger::{ClaimLedger, Config, MemoryStore};
//! use tabsplit_sync::{SyncClient, SyncConfig};
//! # use tabsplit_ledger::{ItemId, ParticipantId, ReceiptId};
//!
//! # async fn run(receipt_id: ReceiptId, guest: ParticipantId, item_id: ItemId) -> tabsplit_sync::Result<()> {
//! let config = Config::default();
//! let store = Arc::new(MemoryStore::spawn(&config.store));
//! let ledger = ClaimLedger::new(store, config.claims);
//!
//! let client = SyncClient::connect(ledger, receipt_id, guest, SyncConfig::default()).await?;
//! client.claim(item_id, Decimal::ONE).await?;
//!
//! let view = client.wait_until(|v| v.pending.is_empty()).await?;
//! println!("{} owes {}", guest, view.settlement.participant(guest).map(|p| p.total_owed()).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod client;
pub mod config;
pub mod error;
pub mod optimistic;
pub mod projection;
pub mod retry;

// Re-exports
pub use client::{ReceiptView, SyncClient};
pub use config::{RetryConfig, SyncConfig};
pub use error::{Error, Result};
pub use optimistic::{MutationId, MutationKind, MutationState, PendingMutation, PendingMutations};
pub use projection::{Applied, ReceiptProjection};
