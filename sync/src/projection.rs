//! Per-receipt projection of confirmed store state
//!
//! A projection is hydrated from one atomic snapshot and then kept current
//! by applying change-feed events. Applying an event twice, or an event
//! older than what the projection already holds, changes nothing.
//!
//! Only confirmed facts live here. Optimistic state is tracked separately in
//! [`crate::optimistic`] and never reaches the calculator.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tabsplit_ledger::{
    ChangeEvent, ChangeType, Claim, ClaimId, Item, ItemId, Participant, ParticipantId, Receipt,
    ReceiptSnapshot, ReceiptStatus, Row,
};
use tabsplit_settlement::{derive_status, settle, Settlement};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Item(ItemId),
    Participant(ParticipantId),
    Claim(ClaimId),
}

/// Outcome of applying one change event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The event changed the projection
    Changed,
    /// Already reflected, or older than what is held
    Stale,
    /// Event for another receipt
    Foreign,
}

/// Confirmed view of one receipt
#[derive(Debug, Clone)]
pub struct ReceiptProjection {
    receipt: Receipt,
    items: BTreeMap<ItemId, Item>,
    participants: BTreeMap<ParticipantId, Participant>,
    claims: BTreeMap<ClaimId, Claim>,
    tombstones: HashMap<RowKey, u64>,
    hydrated_at: u64,
    watermark: u64,
}

impl ReceiptProjection {
    /// Build from an atomic snapshot
    pub fn hydrate(snapshot: ReceiptSnapshot) -> Self {
        Self {
            receipt: snapshot.receipt,
            items: snapshot.items.into_iter().map(|i| (i.id, i)).collect(),
            participants: snapshot
                .participants
                .into_iter()
                .map(|p| (p.id, p))
                .collect(),
            claims: snapshot.claims.into_iter().map(|c| (c.id, c)).collect(),
            tombstones: HashMap::new(),
            hydrated_at: snapshot.sequence,
            watermark: snapshot.sequence,
        }
    }

    /// Apply one change event
    pub fn apply(&mut self, event: &ChangeEvent) -> Applied {
        if event.receipt_id != self.receipt.id {
            return Applied::Foreign;
        }
        if event.sequence <= self.hydrated_at {
            return Applied::Stale;
        }

        let changed = match (&event.row, event.event_type) {
            (Row::Receipt(receipt), ChangeType::Delete) => {
                trace!(receipt_id = %receipt.id, "Ignoring receipt delete");
                false
            }
            (Row::Receipt(receipt), _) => {
                if receipt.version > self.receipt.version {
                    self.receipt = receipt.clone();
                    true
                } else {
                    false
                }
            }
            (Row::Item(item), ChangeType::Delete) => {
                let removed = self.remove(RowKey::Item(item.id), item.version);
                if removed {
                    self.claims.retain(|_, c| c.item_id != item.id);
                }
                removed
            }
            (Row::Item(item), _) => upsert(
                &mut self.items,
                &self.tombstones,
                RowKey::Item(item.id),
                item.id,
                item,
                |i| i.version,
            ),
            (Row::Participant(participant), ChangeType::Delete) => {
                let removed = self.remove(RowKey::Participant(participant.id), participant.version);
                if removed {
                    self.claims.retain(|_, c| c.participant_id != participant.id);
                }
                removed
            }
            (Row::Participant(participant), _) => upsert(
                &mut self.participants,
                &self.tombstones,
                RowKey::Participant(participant.id),
                participant.id,
                participant,
                |p| p.version,
            ),
            (Row::Claim(claim), ChangeType::Delete) => {
                self.remove(RowKey::Claim(claim.id), claim.version)
            }
            (Row::Claim(claim), _) => {
                // A claim on a parent we already saw deleted stays dead
                if self.tombstones.contains_key(&RowKey::Item(claim.item_id))
                    || self
                        .tombstones
                        .contains_key(&RowKey::Participant(claim.participant_id))
                {
                    false
                } else {
                    upsert(
                        &mut self.claims,
                        &self.tombstones,
                        RowKey::Claim(claim.id),
                        claim.id,
                        claim,
                        |c| c.version,
                    )
                }
            }
        };

        self.watermark = self.watermark.max(event.sequence);
        if changed {
            Applied::Changed
        } else {
            Applied::Stale
        }
    }

    fn remove(&mut self, key: RowKey, version: u64) -> bool {
        let tombstone = self.tombstones.entry(key).or_insert(0);
        if *tombstone >= version {
            return false;
        }
        *tombstone = version;

        let removed = match key {
            RowKey::Item(id) => remove_older(&mut self.items, id, version, |i| i.version),
            RowKey::Participant(id) => {
                remove_older(&mut self.participants, id, version, |p| p.version)
            }
            RowKey::Claim(id) => remove_older(&mut self.claims, id, version, |c| c.version),
        };
        removed.unwrap_or(true)
    }

    /// Receipt row
    pub fn receipt(&self) -> &Receipt {
        &self.receipt
    }

    /// Items in receipt order
    pub fn items(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
        items
    }

    /// Participants in join order
    pub fn participants(&self) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self.participants.values().cloned().collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        participants
    }

    /// Active claims
    pub fn claims(&self) -> Vec<Claim> {
        self.claims.values().cloned().collect()
    }

    /// One item
    pub fn item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.get(&item_id)
    }

    /// Active claim for an (item, participant) pair
    pub fn claim_for(&self, item_id: ItemId, participant_id: ParticipantId) -> Option<&Claim> {
        self.claims
            .values()
            .find(|c| c.item_id == item_id && c.participant_id == participant_id)
    }

    /// Confirmed claimed quantity on an item
    pub fn claimed(&self, item_id: ItemId) -> Decimal {
        self.claims
            .values()
            .filter(|c| c.item_id == item_id)
            .map(|c| c.portion)
            .sum()
    }

    /// Highest commit sequence reflected
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Sequence of the snapshot this projection was built from
    pub fn hydrated_at(&self) -> u64 {
        self.hydrated_at
    }

    /// Settlement over confirmed claims
    pub fn settlement(&self) -> Settlement {
        settle(
            &self.receipt,
            &self.items(),
            &self.claims(),
            &self.participants(),
        )
    }

    /// Derived status over confirmed claims
    pub fn status(&self) -> ReceiptStatus {
        derive_status(
            &self.receipt,
            &self.items(),
            &self.claims(),
            &self.participants(),
        )
    }
}

fn upsert<K: Ord + Copy, V: Clone>(
    rows: &mut BTreeMap<K, V>,
    tombstones: &HashMap<RowKey, u64>,
    key: RowKey,
    id: K,
    row: &V,
    version: impl Fn(&V) -> u64,
) -> bool {
    if tombstones.get(&key).is_some_and(|deleted| *deleted >= version(row)) {
        return false;
    }
    match rows.get(&id) {
        Some(existing) if version(existing) >= version(row) => false,
        _ => {
            rows.insert(id, row.clone());
            true
        }
    }
}

/// Remove a row unless it is newer than the delete; `None` if absent
fn remove_older<K: Ord, V>(
    rows: &mut BTreeMap<K, V>,
    id: K,
    version: u64,
    row_version: impl Fn(&V) -> u64,
) -> Option<bool> {
    let existing = rows.get(&id)?;
    if row_version(existing) > version {
        return Some(false);
    }
    rows.remove(&id);
    Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tabsplit_ledger::{
        config::StoreConfig, BackingStore, Cents, MemoryStore, NewItem, NewParticipant,
        NewReceipt, Publication,
    };
    use tokio::sync::broadcast;

    struct Fixture {
        store: Arc<MemoryStore>,
        feed: broadcast::Receiver<ChangeEvent>,
        projection: ReceiptProjection,
        items: Vec<Item>,
        guests: Vec<Participant>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::spawn(&StoreConfig::default()));
        let receipt = store
            .insert_receipt(NewReceipt {
                merchant_name: "Dumpling House".into(),
                subtotal: Cents::new(2500),
                tax: Cents::new(150),
                tip: Cents::new(300),
                total: Cents::new(2950),
                ..Default::default()
            })
            .await
            .unwrap();
        let items = store
            .replace_items(
                receipt.id,
                vec![
                    NewItem::new("A", Cents::new(1000), 2),
                    NewItem::new("B", Cents::new(500), 1),
                ],
            )
            .await
            .unwrap();
        store
            .set_publication(receipt.id, Publication::Shared)
            .await
            .unwrap();

        let mut guests = Vec::new();
        for name in ["P1", "P2"] {
            guests.push(
                store
                    .insert_participant(NewParticipant {
                        receipt_id: receipt.id,
                        display_name: name.into(),
                        identity: None,
                    })
                    .await
                    .unwrap(),
            );
        }

        let feed = store.subscribe(receipt.id);
        let projection = ReceiptProjection::hydrate(store.snapshot(receipt.id).await.unwrap());

        Fixture {
            store,
            feed,
            projection,
            items,
            guests,
        }
    }

    fn drain(feed: &mut broadcast::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = feed.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_hydrate_shared_receipt() {
        let f = fixture().await;
        assert_eq!(f.projection.status(), ReceiptStatus::Shared);
        assert_eq!(f.projection.items().len(), 2);
        assert_eq!(f.projection.settlement().unclaimed.total, Cents::new(2950));
    }

    #[tokio::test]
    async fn test_apply_claims_and_replays() {
        let mut f = fixture().await;
        let (a, b) = (f.items[0].id, f.items[1].id);
        let (p1, p2) = (f.guests[0].id, f.guests[1].id);

        f.store.upsert_claim(a, p1, Decimal::ONE).await.unwrap();
        f.store.upsert_claim(a, p2, Decimal::ONE).await.unwrap();
        f.store.upsert_claim(b, p2, Decimal::ONE).await.unwrap();

        let events = drain(&mut f.feed);
        assert_eq!(events.len(), 3);
        for event in &events {
            assert_eq!(f.projection.apply(event), Applied::Changed);
        }
        for event in &events {
            assert_eq!(f.projection.apply(event), Applied::Stale);
        }

        assert_eq!(f.projection.status(), ReceiptStatus::FullyClaimed);
        let settlement = f.projection.settlement();
        assert_eq!(settlement.participant(p1).unwrap().total_owed(), Cents::new(1180));
        assert_eq!(settlement.participant(p2).unwrap().total_owed(), Cents::new(1770));
        assert_eq!(f.projection.watermark(), events[2].sequence);
    }

    #[tokio::test]
    async fn test_out_of_order_update_is_ignored() {
        let mut f = fixture().await;
        let (a, p1) = (f.items[0].id, f.guests[0].id);

        f.store.upsert_claim(a, p1, Decimal::ONE).await.unwrap();
        f.store.upsert_claim(a, p1, Decimal::from(2)).await.unwrap();
        let events = drain(&mut f.feed);

        f.projection.apply(&events[1]);
        assert_eq!(f.projection.apply(&events[0]), Applied::Stale);
        assert_eq!(f.projection.claimed(a), Decimal::from(2));
    }

    #[tokio::test]
    async fn test_delete_before_insert_stays_deleted() {
        let mut f = fixture().await;
        let (a, p1) = (f.items[0].id, f.guests[0].id);

        let claim = f.store.upsert_claim(a, p1, Decimal::ONE).await.unwrap();
        f.store.delete_claim(claim.id).await.unwrap();
        let events = drain(&mut f.feed);

        f.projection.apply(&events[1]);
        f.projection.apply(&events[0]);
        assert!(f.projection.claim_for(a, p1).is_none());
        assert_eq!(f.projection.status(), ReceiptStatus::Shared);
    }

    #[tokio::test]
    async fn test_participant_removal_cascades() {
        let mut f = fixture().await;
        let (a, p1) = (f.items[0].id, f.guests[0].id);

        f.store.upsert_claim(a, p1, Decimal::ONE).await.unwrap();
        f.store.remove_participant(p1).await.unwrap();

        for event in drain(&mut f.feed) {
            f.projection.apply(&event);
        }
        assert_eq!(f.projection.participants().len(), 1);
        assert_eq!(f.projection.claimed(a), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_item_replacement_cascades() {
        let mut f = fixture().await;
        let (a, p1) = (f.items[0].id, f.guests[0].id);
        let receipt_id = f.projection.receipt().id;

        f.store.upsert_claim(a, p1, Decimal::ONE).await.unwrap();
        f.store
            .replace_items(receipt_id, vec![NewItem::new("C", Cents::new(2500), 1)])
            .await
            .unwrap();

        for event in drain(&mut f.feed) {
            f.projection.apply(&event);
        }
        let items = f.projection.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "C");
        assert!(f.projection.claims().is_empty());
    }

    #[tokio::test]
    async fn test_events_at_or_below_snapshot_are_stale() {
        let mut f = fixture().await;
        let (a, p1) = (f.items[0].id, f.guests[0].id);
        let receipt_id = f.projection.receipt().id;

        f.store.upsert_claim(a, p1, Decimal::ONE).await.unwrap();
        let events = drain(&mut f.feed);

        let mut fresh = ReceiptProjection::hydrate(f.store.snapshot(receipt_id).await.unwrap());
        assert_eq!(fresh.apply(&events[0]), Applied::Stale);
        assert_eq!(fresh.claimed(a), Decimal::ONE);
    }
}
