//! Tabsplit Settlement Calculator
//!
//! Turns a receipt's confirmed items and claims into who owes what.
//!
//! # Algorithm
//!
//! 1. **Items sum**: `Σ unit_price × quantity` in exact minor units; the
//!    items-derived sum is authoritative over the declared subtotal
//! 2. **Weights**: each item absorbs tax and tip in proportion to its value
//! 3. **Partition**: each item's subtotal, tax and tip are split across its
//!    claims by portion, with the remainder reported as unclaimed
//! 4. **Buckets**: every claim share is either paid or still owed
//!
//! Every split uses largest-remainder apportionment, so the rounded parts
//! always add back up to the rounded whole.
//!
//! # Example
//!
//! ```text
//! Items: A $10.00 × 2, B $5.00 × 1   tax $1.50   tip $3.00
//!
//! Weights:      A 0.8, B 0.2
//! Item tax:     A $1.20, B $0.30
//! Item tip:     A $2.40, B $0.60
//!
//! P1 claims 1 × A            → $10.00 + $0.60 + $1.20 = $11.80
//! P2 claims 1 × A and 1 × B  → $11.80 + $5.90          = $17.70
//! ```
//!
//! Both the calculator and [`derive_status`] are pure: identical inputs give
//! byte-identical outputs.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod apportion;
pub mod calculator;
pub mod status;
pub mod types;

// Re-exports
pub use apportion::apportion;
pub use calculator::settle;
pub use status::derive_status;
pub use types::*;
