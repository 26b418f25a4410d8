//! Receipt status derivation
//!
//! Status is a view over the publication flag, claims and payments. It is
//! recomputed on every read and never written back.

use crate::calculator::PaymentIndex;
use crate::types::Bucket;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tabsplit_ledger::{Claim, Item, ItemId, Participant, Publication, Receipt, ReceiptStatus};

/// Derive the lifecycle status of `receipt`.
///
/// Rules, first match wins:
///
/// - no items: `Draft`
/// - not published: `Draft` or `Ready`, following the host flag
/// - no claims: `Shared`
/// - every item fully claimed and every claim paid: `Settled`
/// - every item fully claimed: `FullyClaimed`
/// - otherwise: `PartiallyClaimed`
pub fn derive_status(
    receipt: &Receipt,
    items: &[Item],
    claims: &[Claim],
    participants: &[Participant],
) -> ReceiptStatus {
    if items.is_empty() {
        return ReceiptStatus::Draft;
    }

    match receipt.publication {
        Publication::Draft => return ReceiptStatus::Draft,
        Publication::Ready => return ReceiptStatus::Ready,
        Publication::Shared => {}
    }

    let mut claimed: BTreeMap<ItemId, Decimal> =
        items.iter().map(|item| (item.id, Decimal::ZERO)).collect();
    let active: Vec<&Claim> = claims
        .iter()
        .filter(|c| c.portion > Decimal::ZERO && claimed.contains_key(&c.item_id))
        .collect();

    if active.is_empty() {
        return ReceiptStatus::Shared;
    }

    for claim in &active {
        if let Some(total) = claimed.get_mut(&claim.item_id) {
            *total += claim.portion;
        }
    }

    let fully_claimed = items
        .iter()
        .all(|item| claimed.get(&item.id).copied().unwrap_or_default() >= item.quantity);
    if !fully_claimed {
        return ReceiptStatus::PartiallyClaimed;
    }

    let payment = PaymentIndex::new(participants);
    let all_paid = active
        .iter()
        .all(|c| Bucket::classify(c.status, payment.status(c.participant_id)) == Bucket::Paid);

    if all_paid {
        ReceiptStatus::Settled
    } else {
        ReceiptStatus::FullyClaimed
    }
}
