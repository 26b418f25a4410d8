//! Claim ledger
//!
//! The authoritative set of (item, participant, portion) claims. The ledger
//! validates requests locally, then hands the check-and-write to the
//! backing store so the no-overclaim invariant is enforced at commit time,
//! not at request time.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use tabsplit_ledger::{ClaimLedger, Config, MemoryStore};
//! # use tabsplit_ledger::types::{ItemId, ParticipantId};
//!
//! # async fn run(item_id: ItemId, participant_id: ParticipantId) -> tabsplit_ledger::Result<()> {
//! let config = Config::default();
//! let store = Arc::new(MemoryStore::spawn(&config.store));
//! let ledger = ClaimLedger::new(store, config.claims);
//!
//! let claim = ledger.claim(item_id, participant_id, Decimal::ONE).await?;
//! println!("claimed {} for {}", claim.portion, claim.amount_cents);
//! # Ok(())
//! # }
//! ```

use crate::{
    config::ClaimsConfig,
    event::{verify_chain, LedgerEvent},
    metrics::Metrics,
    store::{BackingStore, ItemTally},
    types::{Claim, ItemId, ParticipantId, ReceiptId},
    Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of an unclaim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unclaimed {
    /// The claim existed and was deleted
    Removed(Claim),
    /// There was nothing to remove
    NotPresent,
}

/// Claim ledger over a backing store
pub struct ClaimLedger<S: ?Sized> {
    store: Arc<S>,
    config: ClaimsConfig,
    metrics: Option<Metrics>,
}

impl<S: ?Sized> Clone for ClaimLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for ClaimLedger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimLedger")
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl<S: BackingStore + ?Sized> ClaimLedger<S> {
    /// Create a ledger over a store
    pub fn new(store: Arc<S>, config: ClaimsConfig) -> Self {
        Self {
            store,
            config,
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn validate_portion(&self, portion: Decimal) -> Result<()> {
        if portion <= Decimal::ZERO {
            return Err(Error::Configuration(format!(
                "Claim portion must be positive (got {})",
                portion
            )));
        }
        if portion.normalize().scale() > self.config.max_portion_scale {
            return Err(Error::Configuration(format!(
                "Claim portion {} has more than {} decimal places",
                portion, self.config.max_portion_scale
            )));
        }
        Ok(())
    }

    /// Claim `portion` units of an item for a participant.
    ///
    /// Re-claiming the same item replaces the participant's previous portion.
    /// Fails with `Overclaim` if other participants' claims plus `portion`
    /// would exceed the item quantity.
    pub async fn claim(
        &self,
        item_id: ItemId,
        participant_id: ParticipantId,
        portion: Decimal,
    ) -> Result<Claim> {
        self.validate_portion(portion)?;

        let start = Instant::now();
        match self.store.upsert_claim(item_id, participant_id, portion).await {
            Ok(claim) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_claim(start.elapsed().as_secs_f64());
                }
                tracing::info!(
                    %item_id,
                    %participant_id,
                    %portion,
                    amount = %claim.amount_cents,
                    "Claim committed"
                );
                Ok(claim)
            }
            Err(err @ Error::Overclaim { .. }) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_rejection();
                }
                tracing::warn!(%item_id, %participant_id, "Claim rejected: {}", err);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Remove a participant's claim on an item.
    ///
    /// Removing a claim that does not exist succeeds with `NotPresent`, so
    /// clients can retry freely.
    pub async fn unclaim(&self, item_id: ItemId, participant_id: ParticipantId) -> Result<Unclaimed> {
        match self.store.delete_claim_for(item_id, participant_id).await? {
            Some(claim) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_unclaim();
                }
                tracing::info!(%item_id, %participant_id, portion = %claim.portion, "Claim released");
                Ok(Unclaimed::Removed(claim))
            }
            None => {
                tracing::debug!(%item_id, %participant_id, "Unclaim of absent claim");
                Ok(Unclaimed::NotPresent)
            }
        }
    }

    /// Active claims on the given items, grouped in the given item order
    pub async fn list_claims(&self, item_ids: &[ItemId]) -> Result<Vec<Claim>> {
        self.store.list_claims(item_ids).await
    }

    /// Claimed and remaining quantity on an item
    pub async fn item_tally(&self, item_id: ItemId) -> Result<ItemTally> {
        self.store.item_tally(item_id).await
    }

    /// Audit history of a receipt
    pub async fn history(&self, receipt_id: ReceiptId) -> Result<Vec<LedgerEvent>> {
        self.store.history(receipt_id).await
    }

    /// Check the hash chain of a receipt's history
    pub async fn verify_history(&self, receipt_id: ReceiptId) -> Result<bool> {
        let events = self.history(receipt_id).await?;
        let valid = verify_chain(&events);
        if !valid {
            tracing::error!(%receipt_id, "Audit chain verification failed");
        }
        Ok(valid)
    }
}
