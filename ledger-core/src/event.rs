//! Change feed rows and the hash-chained audit log
//!
//! Two kinds of records leave the store:
//!
//! - [`ChangeEvent`]: what subscribers see on the per-receipt change feed,
//!   one per row write, in commit order.
//! - [`LedgerEvent`]: the append-only claim history. Each event carries the
//!   SHA-256 of its predecessor on the same receipt, so the history can be
//!   verified and replayed to reproduce the active claim set.

use crate::types::{
    Claim, ClaimId, Item, ItemId, Participant, ParticipantId, PaymentStatus, Receipt, ReceiptId,
};
use crate::money::Cents;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Table a change event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Receipts
    Receipts,
    /// Items
    Items,
    /// Participants
    Participants,
    /// Claims
    Claims,
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Row created
    Insert,
    /// Row modified
    Update,
    /// Row removed (payload is the last state)
    Delete,
}

/// Row payload of a change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Row {
    /// Receipt row
    Receipt(Receipt),
    /// Item row
    Item(Item),
    /// Participant row
    Participant(Participant),
    /// Claim row
    Claim(Claim),
}

impl Row {
    /// Table this row lives in
    pub fn table(&self) -> Table {
        match self {
            Row::Receipt(_) => Table::Receipts,
            Row::Item(_) => Table::Items,
            Row::Participant(_) => Table::Participants,
            Row::Claim(_) => Table::Claims,
        }
    }

    /// Commit sequence stamped on the row
    pub fn version(&self) -> u64 {
        match self {
            Row::Receipt(r) => r.version,
            Row::Item(i) => i.version,
            Row::Participant(p) => p.version,
            Row::Claim(c) => c.version,
        }
    }
}

/// One committed row write, delivered on the change feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Store-wide commit sequence
    pub sequence: u64,

    /// Receipt the row belongs to
    pub receipt_id: ReceiptId,

    /// Table
    pub table: Table,

    /// Insert, update or delete
    pub event_type: ChangeType,

    /// Row state after the write (before, for deletes)
    pub row: Row,
}

impl ChangeEvent {
    /// Build an event for a row
    pub fn new(sequence: u64, receipt_id: ReceiptId, event_type: ChangeType, row: Row) -> Self {
        Self {
            sequence,
            receipt_id,
            table: row.table(),
            event_type,
            row,
        }
    }
}

/// Why a claim disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnclaimReason {
    /// The participant unclaimed it
    Released,
    /// The host removed or replaced the item
    ItemRemoved,
    /// The participant left the receipt
    ParticipantRemoved,
}

/// Audit log entry body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEventKind {
    /// Claim created or its portion changed
    Claimed {
        /// Claim ID
        claim_id: ClaimId,
        /// Item
        item_id: ItemId,
        /// Claimant
        participant_id: ParticipantId,
        /// New portion
        portion: Decimal,
        /// Portion before this write (zero for a fresh claim)
        previous_portion: Decimal,
        /// Cached amount
        amount_cents: Cents,
    },
    /// Claim removed
    Unclaimed {
        /// Claim ID
        claim_id: ClaimId,
        /// Item
        item_id: ItemId,
        /// Claimant
        participant_id: ParticipantId,
        /// Portion released
        portion: Decimal,
        /// Cause
        reason: UnclaimReason,
    },
    /// Participant payment status changed
    PaymentMarked {
        /// Participant
        participant_id: ParticipantId,
        /// New status
        status: PaymentStatus,
    },
}

impl LedgerEventKind {
    fn hash_into(&self, hasher: &mut Sha256) {
        match self {
            LedgerEventKind::Claimed {
                claim_id,
                item_id,
                participant_id,
                portion,
                previous_portion,
                amount_cents,
            } => {
                hasher.update([1u8]);
                hasher.update(claim_id.as_uuid().as_bytes());
                hasher.update(item_id.as_uuid().as_bytes());
                hasher.update(participant_id.as_uuid().as_bytes());
                hasher.update(portion.normalize().to_string().as_bytes());
                hasher.update(previous_portion.normalize().to_string().as_bytes());
                hasher.update(amount_cents.as_i64().to_be_bytes());
            }
            LedgerEventKind::Unclaimed {
                claim_id,
                item_id,
                participant_id,
                portion,
                reason,
            } => {
                hasher.update([2u8]);
                hasher.update(claim_id.as_uuid().as_bytes());
                hasher.update(item_id.as_uuid().as_bytes());
                hasher.update(participant_id.as_uuid().as_bytes());
                hasher.update(portion.normalize().to_string().as_bytes());
                hasher.update([*reason as u8]);
            }
            LedgerEventKind::PaymentMarked {
                participant_id,
                status,
            } => {
                hasher.update([3u8]);
                hasher.update(participant_id.as_uuid().as_bytes());
                hasher.update([*status as u8]);
            }
        }
    }
}

/// Hash-chained audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Store-wide commit sequence
    pub sequence: u64,

    /// Receipt this entry belongs to
    pub receipt_id: ReceiptId,

    /// What happened
    pub kind: LedgerEventKind,

    /// Commit timestamp
    pub committed_at: DateTime<Utc>,

    /// Hash of the previous entry for this receipt (zeros for the first)
    pub previous_hash: [u8; 32],

    /// Hash of this entry
    pub hash: [u8; 32],
}

impl LedgerEvent {
    /// Build an entry chained onto `previous_hash`
    pub fn chained(
        sequence: u64,
        receipt_id: ReceiptId,
        kind: LedgerEventKind,
        committed_at: DateTime<Utc>,
        previous_hash: [u8; 32],
    ) -> Self {
        let mut event = Self {
            sequence,
            receipt_id,
            kind,
            committed_at,
            previous_hash,
            hash: [0u8; 32],
        };
        event.hash = event.compute_hash();
        event
    }

    /// Compute the entry hash
    pub fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.receipt_id.as_uuid().as_bytes());
        self.kind.hash_into(&mut hasher);
        hasher.update(
            self.committed_at
                .timestamp_nanos_opt()
                .unwrap_or(0)
                .to_be_bytes(),
        );
        hasher.update(self.previous_hash);
        hasher.finalize().into()
    }
}

/// Check that every entry hashes correctly and links to its predecessor.
pub fn verify_chain(events: &[LedgerEvent]) -> bool {
    let mut previous = [0u8; 32];
    let mut last_sequence = 0u64;

    for event in events {
        if event.previous_hash != previous
            || event.hash != event.compute_hash()
            || event.sequence <= last_sequence
        {
            return false;
        }
        previous = event.hash;
        last_sequence = event.sequence;
    }

    true
}

/// Reproduce the active claim portions from a receipt's history.
pub fn replay_claims(events: &[LedgerEvent]) -> BTreeMap<(ItemId, ParticipantId), Decimal> {
    let mut claims = BTreeMap::new();

    for event in events {
        match &event.kind {
            LedgerEventKind::Claimed {
                item_id,
                participant_id,
                portion,
                ..
            } => {
                claims.insert((*item_id, *participant_id), *portion);
            }
            LedgerEventKind::Unclaimed {
                item_id,
                participant_id,
                ..
            } => {
                claims.remove(&(*item_id, *participant_id));
            }
            LedgerEventKind::PaymentMarked { .. } => {}
        }
    }

    claims
}
