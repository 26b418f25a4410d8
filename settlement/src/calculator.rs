//! Settlement calculator
//!
//! Always recomputes from the full claim set it is given, so the result does
//! not depend on the order in which claims were committed or observed.

use crate::apportion::apportion;
use crate::types::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tabsplit_ledger::{
    Cents, Claim, Item, ItemId, Participant, ParticipantId, PaymentStatus, Receipt,
};
use tracing::{debug, warn};

/// Compute who owes what on `receipt`.
///
/// Claims on items that are not in `items` are ignored. Degenerate receipts
/// (no item value or a zero declared total) give a zero-filled settlement.
pub fn settle(
    receipt: &Receipt,
    items: &[Item],
    claims: &[Claim],
    participants: &[Participant],
) -> Settlement {
    let items = ordered_items(items);
    let claims_by_item = group_claims(&items, claims);
    let payment = PaymentIndex::new(participants);

    let Some((exact_subtotals, exact_sum)) = exact_subtotals(&items) else {
        warn!(receipt_id = %receipt.id, "Item values out of range, settling as empty");
        return zero_filled(receipt, &items, &claims_by_item, &payment, participants);
    };

    if exact_sum <= Decimal::ZERO || receipt.total.is_zero() {
        return zero_filled(receipt, &items, &claims_by_item, &payment, participants);
    }

    let items_sum = Cents::round(exact_sum);
    let drift = receipt.subtotal - items_sum;
    if !drift.is_zero() {
        debug!(
            receipt_id = %receipt.id,
            declared = %receipt.subtotal,
            items_sum = %items_sum,
            "Declared subtotal differs from items"
        );
    }

    let item_subtotals = apportion(items_sum, &exact_subtotals);
    let item_taxes = apportion(receipt.tax, &exact_subtotals);
    let item_tips = apportion(receipt.tip, &exact_subtotals);

    let mut ledger = ParticipantLedger::new(participants);
    let mut per_item = Vec::with_capacity(items.len());
    let mut claimed = Breakdown::default();
    let mut unclaimed = Breakdown::default();

    for (index, item) in items.iter().enumerate() {
        let item_claims = claims_by_item
            .get(&item.id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let allocated = Breakdown::new(item_subtotals[index], item_taxes[index], item_tips[index]);
        let split = split_item(item, item_claims, allocated, &payment);

        for share in &split.claims {
            ledger.credit(share.participant_id, share.allocated, share.bucket);
            claimed += share.allocated;
        }
        unclaimed += split.unclaimed;

        per_item.push(ItemSettlement {
            item_id: item.id,
            name: item.name.clone(),
            quantity: item.quantity,
            claimed_portion: claimed_portion(item_claims),
            weight: exact_subtotals[index] / exact_sum,
            allocated,
            claims: split.claims,
            unclaimed: split.unclaimed,
        });
    }

    Settlement {
        receipt_id: receipt.id,
        items_sum,
        tax: receipt.tax,
        tip: receipt.tip,
        grand_total: items_sum + receipt.tax + receipt.tip,
        reconciliation_drift: drift,
        per_item,
        per_participant: ledger.finish(),
        claimed,
        unclaimed,
    }
}

struct ItemSplit {
    claims: Vec<ClaimAllocation>,
    unclaimed: Breakdown,
}

/// Partition one item's allocation across its claims and the unclaimed rest
fn split_item(
    item: &Item,
    claims: &[&Claim],
    allocated: Breakdown,
    payment: &PaymentIndex,
) -> ItemSplit {
    let portions: Decimal = claimed_portion(claims);
    let remainder = (item.quantity - portions).max(Decimal::ZERO);

    let mut weights: Vec<Decimal> = claims.iter().map(|c| c.portion).collect();
    weights.push(remainder);

    let items = apportion(allocated.items, &weights);
    let taxes = apportion(allocated.tax, &weights);
    let tips = apportion(allocated.tip, &weights);

    let shares = claims
        .iter()
        .enumerate()
        .map(|(index, claim)| ClaimAllocation {
            claim_id: claim.id,
            participant_id: claim.participant_id,
            portion: claim.portion,
            allocated: Breakdown::new(items[index], taxes[index], tips[index]),
            bucket: Bucket::classify(claim.status, payment.status(claim.participant_id)),
        })
        .collect();

    let last = claims.len();
    ItemSplit {
        claims: shares,
        unclaimed: Breakdown::new(items[last], taxes[last], tips[last]),
    }
}

fn zero_filled(
    receipt: &Receipt,
    items: &[&Item],
    claims_by_item: &BTreeMap<ItemId, Vec<&Claim>>,
    payment: &PaymentIndex,
    participants: &[Participant],
) -> Settlement {
    let mut ledger = ParticipantLedger::new(participants);

    let per_item = items
        .iter()
        .map(|item| {
            let item_claims = claims_by_item
                .get(&item.id)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let claims = item_claims
                .iter()
                .map(|claim| {
                    let bucket = Bucket::classify(claim.status, payment.status(claim.participant_id));
                    ledger.credit(claim.participant_id, Breakdown::default(), bucket);
                    ClaimAllocation {
                        claim_id: claim.id,
                        participant_id: claim.participant_id,
                        portion: claim.portion,
                        allocated: Breakdown::default(),
                        bucket,
                    }
                })
                .collect();

            ItemSettlement {
                item_id: item.id,
                name: item.name.clone(),
                quantity: item.quantity,
                claimed_portion: claimed_portion(item_claims),
                weight: Decimal::ZERO,
                allocated: Breakdown::default(),
                claims,
                unclaimed: Breakdown::default(),
            }
        })
        .collect();

    Settlement {
        receipt_id: receipt.id,
        items_sum: Cents::ZERO,
        tax: Cents::ZERO,
        tip: Cents::ZERO,
        grand_total: Cents::ZERO,
        reconciliation_drift: Cents::ZERO,
        per_item,
        per_participant: ledger.finish(),
        claimed: Breakdown::default(),
        unclaimed: Breakdown::default(),
    }
}

/// Exact item subtotals and their sum, `None` if either overflows
fn exact_subtotals(items: &[&Item]) -> Option<(Vec<Decimal>, Decimal)> {
    let mut subtotals = Vec::with_capacity(items.len());
    let mut sum = Decimal::ZERO;
    for item in items {
        let subtotal = item.unit_price.checked_times(item.quantity)?;
        sum = sum.checked_add(subtotal)?;
        subtotals.push(subtotal);
    }
    Some((subtotals, sum))
}

fn ordered_items(items: &[Item]) -> Vec<&Item> {
    let mut ordered: Vec<&Item> = items.iter().collect();
    ordered.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
    ordered.dedup_by_key(|item| item.id);
    ordered
}

/// Claims per item, oldest first, ignoring claims on unknown items
fn group_claims<'a>(items: &[&Item], claims: &'a [Claim]) -> BTreeMap<ItemId, Vec<&'a Claim>> {
    let mut grouped: BTreeMap<ItemId, Vec<&Claim>> =
        items.iter().map(|item| (item.id, Vec::new())).collect();

    for claim in claims.iter().filter(|c| c.portion > Decimal::ZERO) {
        if let Some(bucket) = grouped.get_mut(&claim.item_id) {
            bucket.push(claim);
        }
    }

    for bucket in grouped.values_mut() {
        bucket.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    }
    grouped
}

fn claimed_portion(claims: &[&Claim]) -> Decimal {
    claims.iter().map(|c| c.portion).sum()
}

/// Participant payment status by ID
pub(crate) struct PaymentIndex {
    statuses: BTreeMap<ParticipantId, PaymentStatus>,
}

impl PaymentIndex {
    pub(crate) fn new(participants: &[Participant]) -> Self {
        Self {
            statuses: participants
                .iter()
                .map(|p| (p.id, p.payment_status))
                .collect(),
        }
    }

    pub(crate) fn status(
        &self,
        participant_id: ParticipantId,
    ) -> Option<PaymentStatus> {
        self.statuses.get(&participant_id).copied()
    }
}

/// Accumulates per-participant totals in join order
struct ParticipantLedger {
    entries: Vec<ParticipantSettlement>,
    index: BTreeMap<ParticipantId, usize>,
}

impl ParticipantLedger {
    fn new(participants: &[Participant]) -> Self {
        let mut ordered: Vec<&Participant> = participants.iter().collect();
        ordered.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        ordered.dedup_by_key(|p| p.id);

        let entries: Vec<ParticipantSettlement> =
            ordered.into_iter().map(ParticipantSettlement::empty).collect();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.participant_id, i))
            .collect();

        Self { entries, index }
    }

    fn credit(&mut self, participant_id: ParticipantId, share: Breakdown, bucket: Bucket) {
        let slot = match self.index.get(&participant_id) {
            Some(slot) => *slot,
            None => {
                // Claimant missing from the participant list
                self.entries
                    .push(ParticipantSettlement::unknown(participant_id));
                self.index.insert(participant_id, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        self.entries[slot].credit(share, bucket);
    }

    fn finish(self) -> Vec<ParticipantSettlement> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tabsplit_ledger::{ClaimId, ClaimStatus, Publication, ReceiptId};

    fn at(seconds: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
    }

    fn receipt(subtotal: i64, tax: i64, tip: i64) -> Receipt {
        Receipt {
            id: ReceiptId::generate(),
            merchant_name: "Corner Bistro".to_string(),
            date: None,
            subtotal: Cents::new(subtotal),
            tax: Cents::new(tax),
            tip: Cents::new(tip),
            total: Cents::new(subtotal + tax + tip),
            publication: Publication::Shared,
            owner: None,
            created_at: at(0),
            version: 1,
        }
    }

    fn item(receipt: &Receipt, name: &str, price: i64, quantity: Decimal, position: u32) -> Item {
        Item {
            id: ItemId::generate(),
            receipt_id: receipt.id,
            name: name.to_string(),
            unit_price: Cents::new(price),
            quantity,
            position,
            version: 1,
        }
    }

    fn participant(receipt: &Receipt, name: &str, joined: i64) -> Participant {
        Participant {
            id: ParticipantId::generate(),
            receipt_id: receipt.id,
            display_name: name.to_string(),
            identity: None,
            payment_status: PaymentStatus::Pending,
            paid_at: None,
            joined_at: at(joined),
            version: 1,
        }
    }

    fn claim(item: &Item, participant: &Participant, portion: Decimal, created: i64) -> Claim {
        Claim {
            id: ClaimId::generate(),
            receipt_id: item.receipt_id,
            item_id: item.id,
            participant_id: participant.id,
            portion,
            amount_cents: Cents::round(item.unit_price.times(portion)),
            status: ClaimStatus::Unrequested,
            created_at: at(created),
            updated_at: at(created),
            version: 1,
        }
    }

    #[test]
    fn test_two_guest_dinner() {
        let r = receipt(2500, 150, 300);
        let a = item(&r, "A", 1000, Decimal::from(2), 0);
        let b = item(&r, "B", 500, Decimal::ONE, 1);
        let p1 = participant(&r, "P1", 1);
        let p2 = participant(&r, "P2", 2);
        let claims = vec![
            claim(&a, &p1, Decimal::ONE, 10),
            claim(&a, &p2, Decimal::ONE, 11),
            claim(&b, &p2, Decimal::ONE, 12),
        ];

        let s = settle(&r, &[a.clone(), b.clone()], &claims, &[p1.clone(), p2.clone()]);

        assert_eq!(s.items_sum, Cents::new(2500));
        assert_eq!(s.grand_total, Cents::new(2950));
        assert_eq!(s.reconciliation_drift, Cents::ZERO);

        let a_split = s.item(a.id).unwrap();
        assert_eq!(a_split.weight, Decimal::new(8, 1));
        assert_eq!(a_split.allocated.tax, Cents::new(120));
        assert_eq!(a_split.allocated.tip, Cents::new(240));

        let b_split = s.item(b.id).unwrap();
        assert_eq!(b_split.allocated.tax, Cents::new(30));
        assert_eq!(b_split.allocated.tip, Cents::new(60));

        let first = s.participant(p1.id).unwrap();
        assert_eq!(
            first.breakdown,
            Breakdown::new(Cents::new(1000), Cents::new(60), Cents::new(120))
        );
        assert_eq!(first.total_owed(), Cents::new(1180));

        let second = s.participant(p2.id).unwrap();
        assert_eq!(second.total_owed(), Cents::new(1770));
        assert_eq!(second.owed, Cents::new(1770));
        assert_eq!(second.paid, Cents::ZERO);

        assert_eq!(first.total_owed() + second.total_owed(), Cents::new(2950));
        assert!(s.unclaimed.is_zero());
    }

    #[test]
    fn test_no_claims_all_unclaimed() {
        let r = receipt(2500, 150, 300);
        let a = item(&r, "A", 1000, Decimal::from(2), 0);
        let b = item(&r, "B", 500, Decimal::ONE, 1);
        let p1 = participant(&r, "P1", 1);

        let s = settle(&r, &[a, b], &[], &[p1.clone()]);

        assert_eq!(s.unclaimed.total, Cents::new(2950));
        assert!(s.claimed.is_zero());
        assert_eq!(s.participant(p1.id).unwrap().total_owed(), Cents::ZERO);
    }

    #[test]
    fn test_partial_claim_leaves_unclaimed_bucket() {
        let r = receipt(3000, 0, 0);
        let wings = item(&r, "Wings", 1000, Decimal::from(3), 0);
        let p1 = participant(&r, "P1", 1);

        let s = settle(&r, &[wings.clone()], &[claim(&wings, &p1, Decimal::from(2), 5)], &[p1]);

        let split = s.item(wings.id).unwrap();
        assert_eq!(split.claimed_portion, Decimal::from(2));
        assert_eq!(split.claims[0].allocated.items, Cents::new(2000));
        assert_eq!(split.unclaimed.items, Cents::new(1000));
    }

    #[test]
    fn test_three_way_split_conserves_cents() {
        let r = receipt(1000, 1, 1);
        let pizza = item(&r, "Pizza", 1000, Decimal::ONE, 0);
        let people: Vec<Participant> = (0..3).map(|i| participant(&r, "guest", i)).collect();
        let third = Decimal::ONE / Decimal::from(3);
        let claims: Vec<Claim> = people
            .iter()
            .enumerate()
            .map(|(i, p)| claim(&pizza, p, third, i as i64))
            .collect();

        let s = settle(&r, &[pizza], &claims, &people);

        let shares: i64 = s
            .per_participant
            .iter()
            .map(|p| p.total_owed().as_i64())
            .sum();
        assert_eq!(shares + s.unclaimed.total.as_i64(), 1002);
        for p in &s.per_participant {
            assert!((333..=335).contains(&p.total_owed().as_i64()));
        }
        assert_eq!(s.allocated_total(), Cents::new(1002));
    }

    #[test]
    fn test_paid_participant_moves_to_paid_bucket() {
        let r = receipt(1000, 0, 0);
        let a = item(&r, "A", 1000, Decimal::ONE, 0);
        let mut p1 = participant(&r, "P1", 1);
        p1.payment_status = PaymentStatus::Paid;

        let s = settle(&r, &[a.clone()], &[claim(&a, &p1, Decimal::ONE, 1)], &[p1.clone()]);

        let totals = s.participant(p1.id).unwrap();
        assert_eq!(totals.paid, Cents::new(1000));
        assert_eq!(totals.owed, Cents::ZERO);
        assert_eq!(s.outstanding(), Cents::ZERO);
        assert_eq!(s.item(a.id).unwrap().claims[0].bucket, Bucket::Paid);
    }

    #[test]
    fn test_items_sum_is_authoritative() {
        // Host typed 24.00 but the items add up to 25.00
        let r = receipt(2400, 150, 300);
        let a = item(&r, "A", 1000, Decimal::from(2), 0);
        let b = item(&r, "B", 500, Decimal::ONE, 1);

        let s = settle(&r, &[a, b], &[], &[]);

        assert_eq!(s.items_sum, Cents::new(2500));
        assert_eq!(s.reconciliation_drift, Cents::new(-100));
        assert_eq!(s.allocated_total(), s.grand_total);
    }

    #[test]
    fn test_zero_total_is_zero_filled() {
        let mut r = receipt(0, 0, 0);
        r.total = Cents::ZERO;
        let a = item(&r, "Water", 0, Decimal::ONE, 0);
        let p1 = participant(&r, "P1", 1);

        let s = settle(&r, &[a.clone()], &[claim(&a, &p1, Decimal::ONE, 1)], &[p1.clone()]);

        assert_eq!(s.grand_total, Cents::ZERO);
        assert_eq!(s.per_item.len(), 1);
        assert_eq!(s.item(a.id).unwrap().claims.len(), 1);
        assert_eq!(s.participant(p1.id).unwrap().total_owed(), Cents::ZERO);
    }

    #[test]
    fn test_huge_tax_saturates() {
        let mut r = receipt(2500, 0, 300);
        r.tax = Cents::new(i64::MAX);
        r.total = r.subtotal + r.tax + r.tip;
        let a = item(&r, "A", 1000, Decimal::from(2), 0);
        let b = item(&r, "B", 500, Decimal::ONE, 1);
        let p1 = participant(&r, "P1", 1);

        let s = settle(
            &r,
            &[a.clone(), b.clone()],
            &[claim(&a, &p1, Decimal::from(2), 1), claim(&b, &p1, Decimal::ONE, 2)],
            &[p1.clone()],
        );

        assert_eq!(s.grand_total, Cents::new(i64::MAX));
        assert_eq!(s.items_sum, Cents::new(2500));
        assert_eq!(s.participant(p1.id).unwrap().total_owed(), Cents::new(i64::MAX));
        assert!(s.unclaimed.is_zero());
    }

    #[test]
    fn test_unrepresentable_items_are_zero_filled() {
        let r = receipt(1000, 100, 0);
        let huge = item(&r, "Huge", i64::MAX, Decimal::MAX, 0);
        let plain = item(&r, "Plain", 1000, Decimal::ONE, 1);
        let p1 = participant(&r, "P1", 1);

        let s = settle(
            &r,
            &[huge.clone(), plain.clone()],
            &[claim(&plain, &p1, Decimal::ONE, 1)],
            &[p1.clone()],
        );

        assert_eq!(s.grand_total, Cents::ZERO);
        assert_eq!(s.per_item.len(), 2);
        assert_eq!(s.participant(p1.id).unwrap().total_owed(), Cents::ZERO);
    }

    #[test]
    fn test_empty_receipt() {
        let r = receipt(0, 0, 0);
        let s = settle(&r, &[], &[], &[]);
        assert!(s.per_item.is_empty());
        assert!(s.per_participant.is_empty());
        assert_eq!(s.grand_total, Cents::ZERO);
    }

    #[test]
    fn test_claims_on_unknown_items_are_ignored() {
        let r = receipt(1000, 0, 0);
        let a = item(&r, "A", 1000, Decimal::ONE, 0);
        let gone = item(&r, "Gone", 700, Decimal::ONE, 1);
        let p1 = participant(&r, "P1", 1);

        let s = settle(&r, &[a.clone()], &[claim(&gone, &p1, Decimal::ONE, 1)], &[p1]);

        assert_eq!(s.claimed, Breakdown::default());
        assert_eq!(s.unclaimed.total, Cents::new(1000));
    }

    #[test]
    fn test_participants_in_join_order_with_strays_last() {
        let r = receipt(1000, 0, 0);
        let a = item(&r, "A", 1000, Decimal::from(2), 0);
        let early = participant(&r, "Early", 1);
        let late = participant(&r, "Late", 9);
        let stray = participant(&r, "Stray", 0);

        let s = settle(
            &r,
            &[a.clone()],
            &[claim(&a, &stray, Decimal::ONE, 1)],
            &[late.clone(), early.clone()],
        );

        let order: Vec<ParticipantId> = s.per_participant.iter().map(|p| p.participant_id).collect();
        assert_eq!(order, vec![early.id, late.id, stray.id]);
        assert_eq!(s.per_participant[2].total_owed(), Cents::new(500));
    }

    #[test]
    fn test_claim_order_does_not_matter() {
        let r = receipt(999, 77, 133);
        let a = item(&r, "A", 333, Decimal::from(3), 0);
        let p: Vec<Participant> = (0..3).map(|i| participant(&r, "guest", i)).collect();
        let claims: Vec<Claim> = p
            .iter()
            .enumerate()
            .map(|(i, p)| claim(&a, p, Decimal::ONE, i as i64))
            .collect();
        let mut reversed = claims.clone();
        reversed.reverse();

        assert_eq!(
            settle(&r, &[a.clone()], &claims, &p),
            settle(&r, &[a], &reversed, &p)
        );
    }
}
