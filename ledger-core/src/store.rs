//! Backing store contract
//!
//! The engine never owns persistence. Whatever sits behind this trait must
//! provide CRUD on the four tables, an atomic claim check-and-write, and a
//! per-receipt change feed delivered in commit order.

use crate::{
    event::{ChangeEvent, LedgerEvent},
    types::{
        Claim, ClaimId, Item, ItemId, NewItem, NewParticipant, NewReceipt, Participant,
        ParticipantId, PaymentStatus, Publication, Receipt, ReceiptId,
    },
    Result,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Consistent view of one receipt taken in a single store step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSnapshot {
    /// Last commit sequence included in the snapshot
    pub sequence: u64,
    /// Receipt row
    pub receipt: Receipt,
    /// Items ordered by position
    pub items: Vec<Item>,
    /// Participants ordered by join time
    pub participants: Vec<Participant>,
    /// Active claims ordered by item position, then creation
    pub claims: Vec<Claim>,
}

/// Claimed quantity on one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTally {
    /// Item quantity
    pub quantity: Decimal,
    /// Sum of active claim portions
    pub claimed: Decimal,
}

impl ItemTally {
    /// Quantity nobody has claimed yet
    pub fn remaining(&self) -> Decimal {
        (self.quantity - self.claimed).max(Decimal::ZERO)
    }

    /// Whether every unit is claimed
    pub fn is_fully_claimed(&self) -> bool {
        self.claimed >= self.quantity
    }
}

/// Persistence and change-notification backend
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Create a receipt in `Draft`
    async fn insert_receipt(&self, receipt: NewReceipt) -> Result<Receipt>;

    /// Fetch a receipt
    async fn get_receipt(&self, receipt_id: ReceiptId) -> Result<Receipt>;

    /// Set the publication flag
    async fn set_publication(
        &self,
        receipt_id: ReceiptId,
        publication: Publication,
    ) -> Result<Receipt>;

    /// Replace the whole item list; claims on removed items are deleted
    async fn replace_items(&self, receipt_id: ReceiptId, items: Vec<NewItem>) -> Result<Vec<Item>>;

    /// Fetch one item
    async fn get_item(&self, item_id: ItemId) -> Result<Item>;

    /// Add a participant
    async fn insert_participant(&self, participant: NewParticipant) -> Result<Participant>;

    /// Remove a participant and their claims
    async fn remove_participant(&self, participant_id: ParticipantId) -> Result<()>;

    /// Change a participant's payment status (and their claims' status)
    async fn set_payment_status(
        &self,
        participant_id: ParticipantId,
        status: PaymentStatus,
    ) -> Result<Participant>;

    /// Atomically check the no-overclaim invariant and upsert the
    /// (item, participant) claim.
    async fn upsert_claim(
        &self,
        item_id: ItemId,
        participant_id: ParticipantId,
        portion: Decimal,
    ) -> Result<Claim>;

    /// Delete a claim; deleting a missing claim succeeds
    async fn delete_claim(&self, claim_id: ClaimId) -> Result<Option<Claim>>;

    /// Atomically delete the claim an (item, participant) pair holds.
    /// Succeeds with `None` when there is none.
    async fn delete_claim_for(
        &self,
        item_id: ItemId,
        participant_id: ParticipantId,
    ) -> Result<Option<Claim>>;

    /// Active claim for an (item, participant) pair
    async fn find_claim(
        &self,
        item_id: ItemId,
        participant_id: ParticipantId,
    ) -> Result<Option<Claim>>;

    /// Active claims on the given items, in the order the items are given
    async fn list_claims(&self, item_ids: &[ItemId]) -> Result<Vec<Claim>>;

    /// Claimed quantity on an item
    async fn item_tally(&self, item_id: ItemId) -> Result<ItemTally>;

    /// Everything about one receipt, taken atomically
    async fn snapshot(&self, receipt_id: ReceiptId) -> Result<ReceiptSnapshot>;

    /// Audit history for a receipt, oldest first
    async fn history(&self, receipt_id: ReceiptId) -> Result<Vec<LedgerEvent>>;

    /// Subscribe to committed changes on a receipt
    fn subscribe(&self, receipt_id: ReceiptId) -> broadcast::Receiver<ChangeEvent>;
}
