//! Core types for the claim ledger
//!
//! All types are designed for:
//! - Exact arithmetic (integer cents for money, `Decimal` for quantities)
//! - Deterministic serialization (no floats anywhere)
//! - Derived lifecycle state (only the publication flag is stored)

use crate::{money::Cents, Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Largest quantity a single item may carry
pub const MAX_QUANTITY: u32 = 1_000_000;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new time-ordered identifier
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Receipt identifier
    ReceiptId
);
define_id!(
    /// Line item identifier
    ItemId
);
define_id!(
    /// Participant identifier (opaque to the engine)
    ParticipantId
);
define_id!(
    /// Claim identifier
    ClaimId
);

/// Host-controlled publication flag.
///
/// This is the only lifecycle fact that is ever written; everything past
/// `Shared` is derived from claims and payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Publication {
    /// Host is still editing
    Draft,
    /// Host marked the receipt ready but has not shared it
    Ready,
    /// Host published the receipt to guests
    Shared,
}

impl Publication {
    /// Whether guests can see the receipt
    pub fn is_shared(&self) -> bool {
        matches!(self, Publication::Shared)
    }
}

/// Receipt lifecycle status, always derived on read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// Not yet published
    Draft,
    /// Host-only pre-publish marker, behaves like `Draft`
    Ready,
    /// Published, nothing claimed
    Shared,
    /// Some quantity claimed
    PartiallyClaimed,
    /// Every item fully claimed, not everyone has paid
    FullyClaimed,
    /// Fully claimed and every claimant paid
    Settled,
}

impl ReceiptStatus {
    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            ReceiptStatus::Draft => "Draft",
            ReceiptStatus::Ready => "Ready",
            ReceiptStatus::Shared => "Shared",
            ReceiptStatus::PartiallyClaimed => "Partially claimed",
            ReceiptStatus::FullyClaimed => "Fully claimed",
            ReceiptStatus::Settled => "Settled",
        }
    }

    /// Whether the status is one of the pre-publish states
    pub fn is_unpublished(&self) -> bool {
        matches!(self, ReceiptStatus::Draft | ReceiptStatus::Ready)
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Participant payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Nothing asked yet
    Pending,
    /// Host asked for payment
    Requested,
    /// Participant paid
    Paid,
}

/// Claim payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Claimed, no payment request yet
    Unrequested,
    /// Payment requested
    Requested,
    /// Paid
    Paid,
}

impl From<PaymentStatus> for ClaimStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => ClaimStatus::Unrequested,
            PaymentStatus::Requested => ClaimStatus::Requested,
            PaymentStatus::Paid => ClaimStatus::Paid,
        }
    }
}

/// A shared bill fronted by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Receipt ID
    pub id: ReceiptId,

    /// Merchant name
    pub merchant_name: String,

    /// Date on the receipt
    pub date: Option<NaiveDate>,

    /// Declared subtotal
    pub subtotal: Cents,

    /// Declared tax
    pub tax: Cents,

    /// Declared tip
    pub tip: Cents,

    /// Declared total
    pub total: Cents,

    /// Publication flag (the only stored lifecycle fact)
    pub publication: Publication,

    /// Host identity reference
    pub owner: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Commit sequence of the last write
    pub version: u64,
}

/// One line on a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item ID
    pub id: ItemId,

    /// Owning receipt
    pub receipt_id: ReceiptId,

    /// Line description
    pub name: String,

    /// Price of one unit
    pub unit_price: Cents,

    /// Positive, possibly fractional, quantity
    pub quantity: Decimal,

    /// Sort order on the receipt
    pub position: u32,

    /// Commit sequence of the last write
    pub version: u64,
}

impl Item {
    /// `unit_price × quantity` in exact minor units
    pub fn exact_subtotal(&self) -> Decimal {
        self.unit_price.times(self.quantity)
    }
}

/// Someone splitting the receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant ID
    pub id: ParticipantId,

    /// Owning receipt
    pub receipt_id: ReceiptId,

    /// Name shown to others
    pub display_name: String,

    /// Identity provider reference, if signed in
    pub identity: Option<String>,

    /// Payment status
    pub payment_status: PaymentStatus,

    /// When the participant was marked paid
    pub paid_at: Option<DateTime<Utc>>,

    /// Join timestamp
    pub joined_at: DateTime<Utc>,

    /// Commit sequence of the last write
    pub version: u64,
}

/// A participant's share of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim ID
    pub id: ClaimId,

    /// Receipt of the claimed item
    pub receipt_id: ReceiptId,

    /// Claimed item
    pub item_id: ItemId,

    /// Claimant
    pub participant_id: ParticipantId,

    /// Quantity units covered (not a fraction of the item)
    pub portion: Decimal,

    /// `round(portion × unit_price)` cached at claim time
    pub amount_cents: Cents,

    /// Payment status of this claim
    pub status: ClaimStatus,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Commit sequence of the last write
    pub version: u64,
}

/// Host input for a new receipt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewReceipt {
    /// Merchant name
    pub merchant_name: String,
    /// Date on the receipt
    pub date: Option<NaiveDate>,
    /// Declared subtotal
    pub subtotal: Cents,
    /// Declared tax
    pub tax: Cents,
    /// Declared tip
    pub tip: Cents,
    /// Declared total
    pub total: Cents,
    /// Host identity reference
    pub owner: Option<String>,
}

impl NewReceipt {
    /// Reject negative or oversized declared amounts
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("subtotal", self.subtotal),
            ("tax", self.tax),
            ("tip", self.tip),
            ("total", self.total),
        ] {
            if value.is_negative() {
                return Err(Error::Configuration(format!(
                    "Receipt {} must not be negative (got {})",
                    field, value
                )));
            }
            if !value.is_within_limit() {
                return Err(Error::Configuration(format!(
                    "Receipt {} exceeds {} (got {})",
                    field,
                    Cents::MAX_AMOUNT,
                    value
                )));
            }
        }
        Ok(())
    }
}

/// Host input for one item row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    /// Line description
    pub name: String,
    /// Price of one unit
    pub unit_price: Cents,
    /// Positive quantity
    pub quantity: Decimal,
}

impl NewItem {
    /// Create a whole-unit item
    pub fn new(name: impl Into<String>, unit_price: Cents, quantity: u32) -> Self {
        Self {
            name: name.into(),
            unit_price,
            quantity: Decimal::from(quantity),
        }
    }

    /// Reject negative prices, non-positive quantities and lines too large
    /// to settle exactly
    pub fn validate(&self) -> Result<()> {
        if self.unit_price.is_negative() {
            return Err(Error::Configuration(format!(
                "Item {:?} has negative price {}",
                self.name, self.unit_price
            )));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(Error::Configuration(format!(
                "Item {:?} must have positive quantity (got {})",
                self.name, self.quantity
            )));
        }
        if self.quantity > Decimal::from(MAX_QUANTITY) {
            return Err(Error::Configuration(format!(
                "Item {:?} quantity {} exceeds {}",
                self.name, self.quantity, MAX_QUANTITY
            )));
        }
        let within_limit = self
            .unit_price
            .checked_times(self.quantity)
            .is_some_and(|subtotal| subtotal <= Cents::MAX_AMOUNT.to_decimal());
        if !within_limit {
            return Err(Error::Configuration(format!(
                "Item {:?} subtotal exceeds {}",
                self.name,
                Cents::MAX_AMOUNT
            )));
        }
        Ok(())
    }
}

/// Input for joining a receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParticipant {
    /// Receipt being joined
    pub receipt_id: ReceiptId,
    /// Name shown to others
    pub display_name: String,
    /// Identity provider reference
    pub identity: Option<String>,
}

impl NewParticipant {
    /// Reject blank display names
    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(Error::Configuration(
                "Participant display name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_receipt_rejects_negative_amounts() {
        let receipt = NewReceipt {
            merchant_name: "Cafe".into(),
            tax: Cents::new(-1),
            ..Default::default()
        };
        let err = receipt.validate().unwrap_err();
        assert!(err.to_string().contains("tax"));
    }

    #[test]
    fn test_new_item_validation() {
        assert!(NewItem::new("Soup", Cents::new(500), 1).validate().is_ok());
        assert!(NewItem::new("Refund", Cents::new(-500), 1).validate().is_err());
        assert!(NewItem::new("Nothing", Cents::new(500), 0).validate().is_err());
    }

    #[test]
    fn test_amount_limits() {
        let at_limit = NewReceipt {
            subtotal: Cents::MAX_AMOUNT,
            total: Cents::MAX_AMOUNT,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        let huge_tax = NewReceipt {
            tax: Cents::new(i64::MAX),
            ..Default::default()
        };
        let err = huge_tax.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("tax"));

        assert!(NewItem::new("Yacht", Cents::MAX_AMOUNT, 1).validate().is_ok());
        assert!(NewItem::new("Two yachts", Cents::MAX_AMOUNT, 2).validate().is_err());
        assert!(NewItem::new("Rice", Cents::new(1), MAX_QUANTITY).validate().is_ok());
        assert!(NewItem::new("More rice", Cents::new(1), MAX_QUANTITY + 1)
            .validate()
            .is_err());
        assert!(NewItem::new("Overflow", Cents::new(i64::MAX), MAX_QUANTITY)
            .validate()
            .is_err());
    }

    #[test]
    fn test_item_exact_subtotal_fractional_quantity() {
        let item = Item {
            id: ItemId::generate(),
            receipt_id: ReceiptId::generate(),
            name: "Cheese".into(),
            unit_price: Cents::new(999),
            quantity: Decimal::new(15, 1),
            position: 0,
            version: 0,
        };
        assert_eq!(item.exact_subtotal(), Decimal::new(14985, 1));
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ReceiptStatus::PartiallyClaimed.label(), "Partially claimed");
        assert!(ReceiptStatus::Ready.is_unpublished());
        assert!(!ReceiptStatus::Shared.is_unpublished());
    }

    #[test]
    fn test_claim_status_from_payment_status() {
        assert_eq!(ClaimStatus::from(PaymentStatus::Paid), ClaimStatus::Paid);
        assert_eq!(ClaimStatus::from(PaymentStatus::Pending), ClaimStatus::Unrequested);
    }
}
