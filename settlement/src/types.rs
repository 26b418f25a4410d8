//! Settlement output types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use tabsplit_ledger::{
    Cents, ClaimId, ClaimStatus, ItemId, Participant, ParticipantId, PaymentStatus, ReceiptId,
};

/// Subtotal, tax and tip making up an amount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    /// Share of item prices
    pub items: Cents,

    /// Share of tax
    pub tax: Cents,

    /// Share of tip
    pub tip: Cents,

    /// `items + tax + tip`
    pub total: Cents,
}

impl Breakdown {
    /// Build from components
    pub fn new(items: Cents, tax: Cents, tip: Cents) -> Self {
        Self {
            items,
            tax,
            tip,
            total: items + tax + tip,
        }
    }

    /// Whether every component is zero
    pub fn is_zero(&self) -> bool {
        self.items.is_zero() && self.tax.is_zero() && self.tip.is_zero()
    }
}

impl Add for Breakdown {
    type Output = Breakdown;

    fn add(self, rhs: Breakdown) -> Breakdown {
        Breakdown::new(self.items + rhs.items, self.tax + rhs.tax, self.tip + rhs.tip)
    }
}

impl AddAssign for Breakdown {
    fn add_assign(&mut self, rhs: Breakdown) {
        *self = *self + rhs;
    }
}

/// Which side of the ledger a claim share sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Already paid
    Paid,
    /// Still owed
    Owed,
}

impl Bucket {
    /// A share is paid when either the claim or its participant is paid
    pub fn classify(claim_status: ClaimStatus, payment_status: Option<PaymentStatus>) -> Self {
        if claim_status == ClaimStatus::Paid || payment_status == Some(PaymentStatus::Paid) {
            Bucket::Paid
        } else {
            Bucket::Owed
        }
    }
}

/// One claim's share of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAllocation {
    /// Claim ID
    pub claim_id: ClaimId,

    /// Claimant
    pub participant_id: ParticipantId,

    /// Quantity units claimed
    pub portion: Decimal,

    /// Allocated amount
    pub allocated: Breakdown,

    /// Paid or owed
    pub bucket: Bucket,
}

/// How one item's amount is split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSettlement {
    /// Item ID
    pub item_id: ItemId,

    /// Line description
    pub name: String,

    /// Item quantity
    pub quantity: Decimal,

    /// Sum of claimed portions
    pub claimed_portion: Decimal,

    /// Share of the items sum, in `[0, 1]`
    pub weight: Decimal,

    /// Item subtotal plus its tax and tip share
    pub allocated: Breakdown,

    /// Per-claim shares, oldest claim first
    pub claims: Vec<ClaimAllocation>,

    /// Part nobody has claimed yet
    pub unclaimed: Breakdown,
}

/// What one participant owes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSettlement {
    /// Participant ID
    pub participant_id: ParticipantId,

    /// Name shown to others
    pub display_name: String,

    /// Payment status
    pub payment_status: PaymentStatus,

    /// Sum over the participant's claims
    pub breakdown: Breakdown,

    /// Part of the total already paid
    pub paid: Cents,

    /// Part of the total still owed
    pub owed: Cents,
}

impl ParticipantSettlement {
    pub(crate) fn empty(participant: &Participant) -> Self {
        Self {
            participant_id: participant.id,
            display_name: participant.display_name.clone(),
            payment_status: participant.payment_status,
            breakdown: Breakdown::default(),
            paid: Cents::ZERO,
            owed: Cents::ZERO,
        }
    }

    pub(crate) fn unknown(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            display_name: String::new(),
            payment_status: PaymentStatus::Pending,
            breakdown: Breakdown::default(),
            paid: Cents::ZERO,
            owed: Cents::ZERO,
        }
    }

    pub(crate) fn credit(&mut self, share: Breakdown, bucket: Bucket) {
        self.breakdown += share;
        match bucket {
            Bucket::Paid => self.paid += share.total,
            Bucket::Owed => self.owed += share.total,
        }
    }

    /// Total owed on the receipt, paid or not
    pub fn total_owed(&self) -> Cents {
        self.breakdown.total
    }
}

/// Point-in-time breakdown of who owes what
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Receipt ID
    pub receipt_id: ReceiptId,

    /// `Σ unit_price × quantity`, rounded once
    pub items_sum: Cents,

    /// Declared tax
    pub tax: Cents,

    /// Declared tip
    pub tip: Cents,

    /// `items_sum + tax + tip`
    pub grand_total: Cents,

    /// Declared subtotal minus `items_sum`
    pub reconciliation_drift: Cents,

    /// Per-item split, in receipt order
    pub per_item: Vec<ItemSettlement>,

    /// Per-participant totals, in join order
    pub per_participant: Vec<ParticipantSettlement>,

    /// Everything assigned to a claim
    pub claimed: Breakdown,

    /// Everything not yet claimed
    pub unclaimed: Breakdown,
}

impl Settlement {
    /// Look up one participant's totals
    pub fn participant(&self, participant_id: ParticipantId) -> Option<&ParticipantSettlement> {
        self.per_participant
            .iter()
            .find(|p| p.participant_id == participant_id)
    }

    /// Look up one item's split
    pub fn item(&self, item_id: ItemId) -> Option<&ItemSettlement> {
        self.per_item.iter().find(|i| i.item_id == item_id)
    }

    /// Sum of every item's allocation
    pub fn allocated_total(&self) -> Cents {
        self.per_item.iter().map(|i| i.allocated.total).sum()
    }

    /// Sum of the amounts still owed by participants
    pub fn outstanding(&self) -> Cents {
        self.per_participant.iter().map(|p| p.owed).sum()
    }
}
