//! In-memory tables behind the store actor
//!
//! Every mutating method runs to completion without yielding, so the
//! overclaim check and the claim write always observe the same state. Each
//! returns the change events it produced, in commit order, for the actor to
//! publish.

use crate::{
    event::{ChangeEvent, ChangeType, LedgerEvent, LedgerEventKind, Row, UnclaimReason},
    money::Cents,
    store::{ItemTally, ReceiptSnapshot},
    types::{
        Claim, ClaimId, Item, ItemId, NewItem, NewParticipant, NewReceipt, Participant,
        ParticipantId, PaymentStatus, Publication, Receipt, ReceiptId,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Result of a write: value plus the change events to publish
pub type Committed<T> = (T, Vec<ChangeEvent>);

/// Default number of deleted item and participant IDs remembered
pub const DEFAULT_TOMBSTONE_CAPACITY: usize = 10_000;

/// Recently deleted IDs, oldest evicted first.
///
/// A reference to a remembered ID is a `Conflict`. Once evicted it reads as
/// `NotFound`, which clients recover from the same way.
#[derive(Debug)]
struct Tombstones<K> {
    ids: HashSet<K>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Copy + Eq + Hash> Tombstones<K> {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn insert(&mut self, id: K) {
        if self.capacity == 0 || !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }

    fn contains(&self, id: &K) -> bool {
        self.ids.contains(id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

/// All rows known to the store
#[derive(Debug)]
pub struct Tables {
    sequence: u64,
    receipts: HashMap<ReceiptId, Receipt>,
    items: HashMap<ItemId, Item>,
    participants: HashMap<ParticipantId, Participant>,
    claims: HashMap<ClaimId, Claim>,
    claim_index: HashMap<(ItemId, ParticipantId), ClaimId>,
    removed_items: Tombstones<ItemId>,
    removed_participants: Tombstones<ParticipantId>,
    history: HashMap<ReceiptId, Vec<LedgerEvent>>,
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

impl Tables {
    /// Empty tables
    pub fn new() -> Self {
        Self::with_tombstone_capacity(DEFAULT_TOMBSTONE_CAPACITY)
    }

    /// Empty tables remembering at most `capacity` deleted IDs per kind
    pub fn with_tombstone_capacity(capacity: usize) -> Self {
        Self {
            sequence: 0,
            receipts: HashMap::new(),
            items: HashMap::new(),
            participants: HashMap::new(),
            claims: HashMap::new(),
            claim_index: HashMap::new(),
            removed_items: Tombstones::new(capacity),
            removed_participants: Tombstones::new(capacity),
            history: HashMap::new(),
        }
    }

    /// Last assigned commit sequence
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn audit(&mut self, sequence: u64, receipt_id: ReceiptId, kind: LedgerEventKind, at: DateTime<Utc>) {
        let log = self.history.entry(receipt_id).or_default();
        let previous_hash = log.last().map(|e| e.hash).unwrap_or([0u8; 32]);
        log.push(LedgerEvent::chained(sequence, receipt_id, kind, at, previous_hash));
    }

    // Lookups

    /// Fetch a receipt
    pub fn receipt(&self, receipt_id: ReceiptId) -> Result<&Receipt> {
        self.receipts
            .get(&receipt_id)
            .ok_or_else(|| Error::NotFound(format!("receipt {}", receipt_id)))
    }

    /// Fetch an item, distinguishing deleted items from unknown ones
    pub fn item(&self, item_id: ItemId) -> Result<&Item> {
        match self.items.get(&item_id) {
            Some(item) => Ok(item),
            None if self.removed_items.contains(&item_id) => Err(Error::Conflict(format!(
                "item {} was removed by the host",
                item_id
            ))),
            None => Err(Error::NotFound(format!("item {}", item_id))),
        }
    }

    /// Fetch a participant, distinguishing removed participants from unknown ones
    pub fn participant(&self, participant_id: ParticipantId) -> Result<&Participant> {
        match self.participants.get(&participant_id) {
            Some(participant) => Ok(participant),
            None if self.removed_participants.contains(&participant_id) => Err(Error::Conflict(
                format!("participant {} left the receipt", participant_id),
            )),
            None => Err(Error::NotFound(format!("participant {}", participant_id))),
        }
    }

    /// Active claim for a pair
    pub fn find_claim(&self, item_id: ItemId, participant_id: ParticipantId) -> Option<&Claim> {
        self.claim_index
            .get(&(item_id, participant_id))
            .and_then(|id| self.claims.get(id))
    }

    fn claims_on_item(&self, item_id: ItemId) -> Vec<&Claim> {
        let mut claims: Vec<&Claim> = self
            .claims
            .values()
            .filter(|c| c.item_id == item_id)
            .collect();
        claims.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        claims
    }

    /// Claims on the given items, grouped in the given item order
    pub fn list_claims(&self, item_ids: &[ItemId]) -> Vec<Claim> {
        let mut seen = HashSet::new();
        item_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .flat_map(|id| self.claims_on_item(*id))
            .cloned()
            .collect()
    }

    /// Claimed quantity on an item
    pub fn item_tally(&self, item_id: ItemId) -> Result<ItemTally> {
        let item = self.item(item_id)?;
        let claimed = self
            .claims_on_item(item_id)
            .iter()
            .map(|c| c.portion)
            .sum();
        Ok(ItemTally {
            quantity: item.quantity,
            claimed,
        })
    }

    fn items_of(&self, receipt_id: ReceiptId) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .items
            .values()
            .filter(|i| i.receipt_id == receipt_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
        items
    }

    fn participants_of(&self, receipt_id: ReceiptId) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self
            .participants
            .values()
            .filter(|p| p.receipt_id == receipt_id)
            .cloned()
            .collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        participants
    }

    /// Consistent view of a receipt
    pub fn snapshot(&self, receipt_id: ReceiptId) -> Result<ReceiptSnapshot> {
        let receipt = self.receipt(receipt_id)?.clone();
        let items = self.items_of(receipt_id);
        let item_ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();

        Ok(ReceiptSnapshot {
            sequence: self.sequence,
            receipt,
            participants: self.participants_of(receipt_id),
            claims: self.list_claims(&item_ids),
            items,
        })
    }

    /// Audit history of a receipt
    pub fn history(&self, receipt_id: ReceiptId) -> Result<Vec<LedgerEvent>> {
        self.receipt(receipt_id)?;
        Ok(self.history.get(&receipt_id).cloned().unwrap_or_default())
    }

    // Writes

    /// Create a draft receipt
    pub fn insert_receipt(&mut self, new: NewReceipt, now: DateTime<Utc>) -> Result<Committed<Receipt>> {
        new.validate()?;

        let sequence = self.next_sequence();
        let receipt = Receipt {
            id: ReceiptId::generate(),
            merchant_name: new.merchant_name,
            date: new.date,
            subtotal: new.subtotal,
            tax: new.tax,
            tip: new.tip,
            total: new.total,
            publication: Publication::Draft,
            owner: new.owner,
            created_at: now,
            version: sequence,
        };
        self.receipts.insert(receipt.id, receipt.clone());

        let event = ChangeEvent::new(sequence, receipt.id, ChangeType::Insert, Row::Receipt(receipt.clone()));
        Ok((receipt, vec![event]))
    }

    /// Set the publication flag
    pub fn set_publication(
        &mut self,
        receipt_id: ReceiptId,
        publication: Publication,
    ) -> Result<Committed<Receipt>> {
        self.receipt(receipt_id)?;
        let sequence = self.next_sequence();

        let receipt = self
            .receipts
            .get_mut(&receipt_id)
            .ok_or_else(|| Error::NotFound(format!("receipt {}", receipt_id)))?;
        receipt.publication = publication;
        receipt.version = sequence;
        let receipt = receipt.clone();

        let event = ChangeEvent::new(sequence, receipt_id, ChangeType::Update, Row::Receipt(receipt.clone()));
        Ok((receipt, vec![event]))
    }

    fn remove_claim(
        &mut self,
        claim_id: ClaimId,
        reason: UnclaimReason,
        now: DateTime<Utc>,
    ) -> Option<(Claim, ChangeEvent)> {
        let claim = self.claims.remove(&claim_id)?;
        self.claim_index.remove(&(claim.item_id, claim.participant_id));

        let sequence = self.next_sequence();
        self.audit(
            sequence,
            claim.receipt_id,
            LedgerEventKind::Unclaimed {
                claim_id: claim.id,
                item_id: claim.item_id,
                participant_id: claim.participant_id,
                portion: claim.portion,
                reason,
            },
            now,
        );

        let mut row = claim.clone();
        row.version = sequence;
        let event = ChangeEvent::new(sequence, claim.receipt_id, ChangeType::Delete, Row::Claim(row));
        Some((claim, event))
    }

    /// Replace the item list wholesale, cascading claim deletion
    pub fn replace_items(
        &mut self,
        receipt_id: ReceiptId,
        new_items: Vec<NewItem>,
        now: DateTime<Utc>,
    ) -> Result<Committed<Vec<Item>>> {
        self.receipt(receipt_id)?;
        for item in &new_items {
            item.validate()?;
        }

        let mut events = Vec::new();

        for old in self.items_of(receipt_id) {
            let claim_ids: Vec<ClaimId> = self.claims_on_item(old.id).iter().map(|c| c.id).collect();
            for claim_id in claim_ids {
                if let Some((_, event)) = self.remove_claim(claim_id, UnclaimReason::ItemRemoved, now) {
                    events.push(event);
                }
            }

            self.items.remove(&old.id);
            self.removed_items.insert(old.id);
            let sequence = self.next_sequence();
            let mut row = old;
            row.version = sequence;
            events.push(ChangeEvent::new(sequence, receipt_id, ChangeType::Delete, Row::Item(row)));
        }

        let mut items = Vec::with_capacity(new_items.len());
        for (position, new) in new_items.into_iter().enumerate() {
            let sequence = self.next_sequence();
            let item = Item {
                id: ItemId::generate(),
                receipt_id,
                name: new.name,
                unit_price: new.unit_price,
                quantity: new.quantity,
                position: position as u32,
                version: sequence,
            };
            self.items.insert(item.id, item.clone());
            events.push(ChangeEvent::new(sequence, receipt_id, ChangeType::Insert, Row::Item(item.clone())));
            items.push(item);
        }

        Ok((items, events))
    }

    /// Add a participant
    pub fn insert_participant(
        &mut self,
        new: NewParticipant,
        now: DateTime<Utc>,
    ) -> Result<Committed<Participant>> {
        new.validate()?;
        self.receipt(new.receipt_id)?;

        let sequence = self.next_sequence();
        let participant = Participant {
            id: ParticipantId::generate(),
            receipt_id: new.receipt_id,
            display_name: new.display_name.trim().to_string(),
            identity: new.identity,
            payment_status: PaymentStatus::Pending,
            paid_at: None,
            joined_at: now,
            version: sequence,
        };
        self.participants.insert(participant.id, participant.clone());

        let event = ChangeEvent::new(
            sequence,
            participant.receipt_id,
            ChangeType::Insert,
            Row::Participant(participant.clone()),
        );
        Ok((participant, vec![event]))
    }

    /// Remove a participant, cascading their claims
    pub fn remove_participant(
        &mut self,
        participant_id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<Committed<()>> {
        let participant = self.participant(participant_id)?.clone();
        let mut events = Vec::new();

        let mut claim_ids: Vec<(chrono::DateTime<Utc>, ClaimId)> = self
            .claims
            .values()
            .filter(|c| c.participant_id == participant_id)
            .map(|c| (c.created_at, c.id))
            .collect();
        claim_ids.sort();
        for (_, claim_id) in claim_ids {
            if let Some((_, event)) = self.remove_claim(claim_id, UnclaimReason::ParticipantRemoved, now) {
                events.push(event);
            }
        }

        self.participants.remove(&participant_id);
        self.removed_participants.insert(participant_id);
        let sequence = self.next_sequence();
        let mut row = participant;
        row.version = sequence;
        events.push(ChangeEvent::new(sequence, row.receipt_id, ChangeType::Delete, Row::Participant(row)));

        Ok(((), events))
    }

    /// Change payment status of a participant and their claims
    pub fn set_payment_status(
        &mut self,
        participant_id: ParticipantId,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<Committed<Participant>> {
        self.participant(participant_id)?;
        let sequence = self.next_sequence();

        let participant = self
            .participants
            .get_mut(&participant_id)
            .ok_or_else(|| Error::NotFound(format!("participant {}", participant_id)))?;
        participant.payment_status = status;
        participant.paid_at = match status {
            PaymentStatus::Paid => Some(now),
            _ => None,
        };
        participant.version = sequence;
        let participant = participant.clone();

        self.audit(
            sequence,
            participant.receipt_id,
            LedgerEventKind::PaymentMarked {
                participant_id,
                status,
            },
            now,
        );

        let mut events = vec![ChangeEvent::new(
            sequence,
            participant.receipt_id,
            ChangeType::Update,
            Row::Participant(participant.clone()),
        )];

        let mut claim_ids: Vec<ClaimId> = self
            .claims
            .values()
            .filter(|c| c.participant_id == participant_id)
            .map(|c| c.id)
            .collect();
        claim_ids.sort();
        for claim_id in claim_ids {
            let sequence = self.next_sequence();
            if let Some(claim) = self.claims.get_mut(&claim_id) {
                claim.status = status.into();
                claim.updated_at = now;
                claim.version = sequence;
                events.push(ChangeEvent::new(
                    sequence,
                    claim.receipt_id,
                    ChangeType::Update,
                    Row::Claim(claim.clone()),
                ));
            }
        }

        Ok((participant, events))
    }

    /// Check the no-overclaim invariant and upsert the pair's claim.
    pub fn upsert_claim(
        &mut self,
        item_id: ItemId,
        participant_id: ParticipantId,
        portion: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Committed<Claim>> {
        if portion <= Decimal::ZERO {
            return Err(Error::Configuration(format!(
                "Claim portion must be positive (got {})",
                portion
            )));
        }

        let item = self.item(item_id)?.clone();
        let participant = self.participant(participant_id)?.clone();
        if participant.receipt_id != item.receipt_id {
            return Err(Error::NotFound(format!(
                "participant {} is not on receipt {}",
                participant_id, item.receipt_id
            )));
        }

        let existing = self.find_claim(item_id, participant_id).cloned();
        let prior = existing.as_ref().map(|c| c.portion).unwrap_or(Decimal::ZERO);
        let claimed_by_others = self.item_tally(item_id)?.claimed - prior;
        let available = item.quantity - claimed_by_others;

        if portion > available {
            return Err(Error::Overclaim {
                item_id,
                requested: portion,
                available: available.max(Decimal::ZERO),
            });
        }

        let sequence = self.next_sequence();
        let amount_cents = Cents::round(item.unit_price.times(portion));

        let (claim, event_type) = match existing {
            Some(mut claim) => {
                claim.portion = portion;
                claim.amount_cents = amount_cents;
                claim.updated_at = now;
                claim.version = sequence;
                (claim, ChangeType::Update)
            }
            None => (
                Claim {
                    id: ClaimId::generate(),
                    receipt_id: item.receipt_id,
                    item_id,
                    participant_id,
                    portion,
                    amount_cents,
                    status: participant.payment_status.into(),
                    created_at: now,
                    updated_at: now,
                    version: sequence,
                },
                ChangeType::Insert,
            ),
        };

        self.claim_index.insert((item_id, participant_id), claim.id);
        self.claims.insert(claim.id, claim.clone());
        self.audit(
            sequence,
            claim.receipt_id,
            LedgerEventKind::Claimed {
                claim_id: claim.id,
                item_id,
                participant_id,
                portion,
                previous_portion: prior,
                amount_cents,
            },
            now,
        );

        let event = ChangeEvent::new(sequence, claim.receipt_id, event_type, Row::Claim(claim.clone()));
        Ok((claim, vec![event]))
    }

    /// Delete the claim an (item, participant) pair holds, if any
    pub fn delete_claim_for(
        &mut self,
        item_id: ItemId,
        participant_id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Committed<Option<Claim>> {
        match self.claim_index.get(&(item_id, participant_id)).copied() {
            Some(claim_id) => self.delete_claim(claim_id, now),
            None => (None, vec![]),
        }
    }

    /// Delete a claim if it exists
    pub fn delete_claim(&mut self, claim_id: ClaimId, now: DateTime<Utc>) -> Committed<Option<Claim>> {
        match self.remove_claim(claim_id, UnclaimReason::Released, now) {
            Some((claim, event)) => (Some(claim), vec![event]),
            None => (None, vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(quantity: u32) -> (Tables, ReceiptId, ItemId, ParticipantId, ParticipantId) {
        let mut tables = Tables::new();
        let now = Utc::now();
        let (receipt, _) = tables
            .insert_receipt(
                NewReceipt {
                    merchant_name: "Diner".into(),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        let (items, _) = tables
            .replace_items(receipt.id, vec![NewItem::new("Fries", Cents::new(400), quantity)], now)
            .unwrap();
        let mut join = |name: &str| {
            tables
                .insert_participant(
                    NewParticipant {
                        receipt_id: receipt.id,
                        display_name: name.into(),
                        identity: None,
                    },
                    now,
                )
                .unwrap()
                .0
                .id
        };
        let p1 = join("Ana");
        let p2 = join("Ben");
        (tables, receipt.id, items[0].id, p1, p2)
    }

    #[test]
    fn test_claim_then_overclaim() {
        let (mut tables, _, item, p1, p2) = setup(3);
        let now = Utc::now();

        tables.upsert_claim(item, p1, Decimal::from(2), now).unwrap();
        let err = tables.upsert_claim(item, p2, Decimal::from(2), now).unwrap_err();
        match err {
            Error::Overclaim { available, .. } => assert_eq!(available, Decimal::ONE),
            other => panic!("expected overclaim, got {other:?}"),
        }
        assert_eq!(tables.item_tally(item).unwrap().claimed, Decimal::from(2));
    }

    #[test]
    fn test_reclaim_updates_existing_claim() {
        let (mut tables, _, item, p1, _) = setup(3);
        let now = Utc::now();

        let (first, events) = tables.upsert_claim(item, p1, Decimal::ONE, now).unwrap();
        assert_eq!(events[0].event_type, ChangeType::Insert);

        // Re-claiming may use the caller's own prior portion
        let (second, events) = tables.upsert_claim(item, p1, Decimal::from(3), now).unwrap();
        assert_eq!(events[0].event_type, ChangeType::Update);
        assert_eq!(first.id, second.id);
        assert_eq!(second.amount_cents, Cents::new(1200));
        assert_eq!(tables.list_claims(&[item]).len(), 1);
    }

    #[test]
    fn test_replace_items_cascades_and_conflicts() {
        let (mut tables, receipt, item, p1, _) = setup(2);
        let now = Utc::now();
        tables.upsert_claim(item, p1, Decimal::ONE, now).unwrap();

        let (_, events) = tables
            .replace_items(receipt, vec![NewItem::new("Shake", Cents::new(600), 1)], now)
            .unwrap();
        // claim delete, item delete, item insert
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].table, crate::event::Table::Claims);
        assert!(tables.find_claim(item, p1).is_none());

        let err = tables.upsert_claim(item, p1, Decimal::ONE, now).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_delete_claim_for_pair() {
        let (mut tables, _, item, p1, p2) = setup(3);
        let now = Utc::now();
        tables.upsert_claim(item, p1, Decimal::ONE, now).unwrap();
        tables.upsert_claim(item, p2, Decimal::ONE, now).unwrap();

        let (removed, events) = tables.delete_claim_for(item, p1, now);
        assert_eq!(removed.unwrap().participant_id, p1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ChangeType::Delete);
        assert!(tables.find_claim(item, p1).is_none());
        assert!(tables.find_claim(item, p2).is_some());

        let (removed, events) = tables.delete_claim_for(item, p1, now);
        assert!(removed.is_none());
        assert!(events.is_empty());
    }

    #[test]
    fn test_tombstones_are_bounded() {
        let mut tables = Tables::with_tombstone_capacity(2);
        let now = Utc::now();
        let (receipt, _) = tables
            .insert_receipt(
                NewReceipt {
                    merchant_name: "Diner".into(),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        let mut retired = Vec::new();
        for round in 0..3 {
            let (items, _) = tables
                .replace_items(
                    receipt.id,
                    vec![NewItem::new(format!("Special {round}"), Cents::new(900), 1)],
                    now,
                )
                .unwrap();
            retired.push(items[0].id);
        }
        // The last batch is still live
        tables
            .replace_items(receipt.id, vec![NewItem::new("Soup", Cents::new(500), 1)], now)
            .unwrap();

        assert_eq!(tables.removed_items.len(), 2);
        assert!(matches!(tables.item(retired[0]), Err(Error::NotFound(_))));
        assert!(matches!(tables.item(retired[1]), Err(Error::Conflict(_))));
        assert!(matches!(tables.item(retired[2]), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_cross_receipt_claim_rejected() {
        let (mut tables, _, item, _, _) = setup(2);
        let now = Utc::now();
        let (other, _) = tables.insert_receipt(NewReceipt::default(), now).unwrap();
        let (stranger, _) = tables
            .insert_participant(
                NewParticipant {
                    receipt_id: other.id,
                    display_name: "Cy".into(),
                    identity: None,
                },
                now,
            )
            .unwrap();

        let err = tables.upsert_claim(item, stranger.id, Decimal::ONE, now).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_payment_status_propagates_to_claims() {
        let (mut tables, _, item, p1, _) = setup(2);
        let now = Utc::now();
        tables.upsert_claim(item, p1, Decimal::ONE, now).unwrap();

        let (participant, events) = tables.set_payment_status(p1, PaymentStatus::Paid, now).unwrap();
        assert!(participant.paid_at.is_some());
        assert_eq!(events.len(), 2);
        assert_eq!(tables.find_claim(item, p1).unwrap().status, crate::types::ClaimStatus::Paid);
    }

    #[test]
    fn test_sequences_strictly_increase() {
        let (mut tables, receipt, item, p1, p2) = setup(4);
        let now = Utc::now();
        tables.upsert_claim(item, p1, Decimal::ONE, now).unwrap();
        tables.upsert_claim(item, p2, Decimal::ONE, now).unwrap();
        tables.remove_participant(p2, now).unwrap();

        let history = tables.history(receipt).unwrap();
        assert_eq!(history.len(), 3);
        assert!(crate::event::verify_chain(&history));
        assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }
}
