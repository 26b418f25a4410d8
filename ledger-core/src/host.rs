//! Host-side receipt editing
//!
//! The host creates the receipt, edits its items and participants, and
//! performs the one stored lifecycle transition: publishing. Payment marks
//! are recorded here too; everything else about the lifecycle is derived.

use crate::{
    store::BackingStore,
    types::{
        Item, NewItem, NewParticipant, NewReceipt, Participant, ParticipantId, PaymentStatus,
        Publication, Receipt, ReceiptId,
    },
    Error, Result,
};
use std::sync::Arc;

/// Host operations over a backing store
pub struct HostSession<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> std::fmt::Debug for HostSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSession").finish_non_exhaustive()
    }
}

impl<S: BackingStore + ?Sized> HostSession<S> {
    /// Create a host session
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create a draft receipt
    pub async fn create_receipt(&self, receipt: NewReceipt) -> Result<Receipt> {
        let receipt = self.store.insert_receipt(receipt).await?;
        tracing::info!(receipt_id = %receipt.id, merchant = %receipt.merchant_name, "Receipt created");
        Ok(receipt)
    }

    /// Resave the item list wholesale. Claims on the old items are dropped.
    pub async fn replace_items(&self, receipt_id: ReceiptId, items: Vec<NewItem>) -> Result<Vec<Item>> {
        let items = self.store.replace_items(receipt_id, items).await?;
        tracing::info!(%receipt_id, count = items.len(), "Items replaced");
        Ok(items)
    }

    /// Add someone by name (the host, or a guest joining)
    pub async fn add_participant(
        &self,
        receipt_id: ReceiptId,
        display_name: impl Into<String>,
        identity: Option<String>,
    ) -> Result<Participant> {
        self.store
            .insert_participant(NewParticipant {
                receipt_id,
                display_name: display_name.into(),
                identity,
            })
            .await
    }

    /// Remove a participant along with their claims
    pub async fn remove_participant(&self, participant_id: ParticipantId) -> Result<()> {
        self.store.remove_participant(participant_id).await
    }

    /// Mark the receipt ready without publishing it
    pub async fn mark_ready(&self, receipt_id: ReceiptId) -> Result<Receipt> {
        let receipt = self.store.get_receipt(receipt_id).await?;
        if receipt.publication.is_shared() {
            return Err(Error::Conflict(format!(
                "receipt {} is already shared",
                receipt_id
            )));
        }
        self.store.set_publication(receipt_id, Publication::Ready).await
    }

    /// Publish the receipt to guests (`draft`/`ready` → `shared`).
    ///
    /// Publishing twice is a no-op.
    pub async fn publish(&self, receipt_id: ReceiptId) -> Result<Receipt> {
        let receipt = self.store.get_receipt(receipt_id).await?;
        if receipt.publication.is_shared() {
            return Ok(receipt);
        }
        let receipt = self.store.set_publication(receipt_id, Publication::Shared).await?;
        tracing::info!(%receipt_id, "Receipt published");
        Ok(receipt)
    }

    /// Ask a participant to pay
    pub async fn request_payment(&self, participant_id: ParticipantId) -> Result<Participant> {
        self.store
            .set_payment_status(participant_id, PaymentStatus::Requested)
            .await
    }

    /// Record that a participant paid
    pub async fn mark_paid(&self, participant_id: ParticipantId) -> Result<Participant> {
        let participant = self
            .store
            .set_payment_status(participant_id, PaymentStatus::Paid)
            .await?;
        tracing::info!(%participant_id, name = %participant.display_name, "Participant marked paid");
        Ok(participant)
    }

    /// Undo a payment mark
    pub async fn reset_payment(&self, participant_id: ParticipantId) -> Result<Participant> {
        self.store
            .set_payment_status(participant_id, PaymentStatus::Pending)
            .await
    }
}
