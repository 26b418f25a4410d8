//! Tabsplit Claim Ledger
//!
//! Authoritative record of who claimed which portion of a shared bill.
//!
//! # Architecture
//!
//! - **Money**: integer cents, exact `Decimal` products, rounding only at the edge
//! - **Single Writer**: one store actor performs every check-and-write, so two
//!   guests racing for the last unit cannot both win
//! - **Change Feed**: per-receipt broadcast of committed rows, in commit order
//! - **Audit Log**: hash-chained claim history that replays to the current claims
//!
//! # Invariants
//!
//! - No overclaim: Σ(portions on an item) ≤ item quantity, checked at commit
//! - One active claim per (item, participant); re-claiming updates it
//! - Lifecycle is derived: only the publication flag is ever written

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod ledger;
pub mod metrics;
pub mod money;
pub mod seed;
pub mod store;
pub mod tables;
pub mod types;

// Re-exports
pub use actor::MemoryStore;
pub use config::Config;
pub use error::{Error, Result};
pub use event::{ChangeEvent, ChangeType, LedgerEvent, Row, Table};
pub use host::HostSession;
pub use ledger::{ClaimLedger, Unclaimed};
pub use money::Cents;
pub use store::{BackingStore, ItemTally, ReceiptSnapshot};
pub use types::{
    Claim, ClaimId, ClaimStatus, Item, ItemId, NewItem, NewParticipant, NewReceipt, Participant,
    ParticipantId, PaymentStatus, Publication, Receipt, ReceiptId, ReceiptStatus,
};
