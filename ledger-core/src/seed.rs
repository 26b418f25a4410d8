//! Seeding receipts from an extraction service
//!
//! Receipt OCR lives outside the engine. Its output is only seed data: the
//! declared totals are stored as the host's declared values, and settlement
//! always works from the items' own sum.

use crate::{
    host::HostSession,
    money::Cents,
    store::BackingStore,
    types::{Item, NewItem, NewReceipt, Receipt},
    Error, Result,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One line as reported by the extraction service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedItem {
    /// Line description
    pub name: String,
    /// Unit price as printed, e.g. `"4.50"`
    pub unit_price: String,
    /// Quantity, 1 when missing
    #[serde(default)]
    pub quantity: Option<Decimal>,
}

/// Output of the extraction service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedReceipt {
    /// Merchant name
    pub merchant_name: String,
    /// Date, if legible
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Lines
    pub items: Vec<ExtractedItem>,
    /// Printed subtotal
    #[serde(default)]
    pub subtotal: Option<String>,
    /// Printed tax
    #[serde(default)]
    pub tax: Option<String>,
    /// Printed tip
    #[serde(default)]
    pub tip: Option<String>,
    /// Printed total
    #[serde(default)]
    pub total: Option<String>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

fn parse_optional(field: Option<&str>) -> Result<Option<Cents>> {
    field.map(Cents::parse).transpose()
}

impl ExtractedReceipt {
    /// Parse the service's JSON payload
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Convert to host inputs.
    ///
    /// Missing subtotal falls back to the items' sum; missing total to
    /// subtotal + tax + tip.
    pub fn into_drafts(self, owner: Option<String>) -> Result<(NewReceipt, Vec<NewItem>)> {
        let items = self
            .items
            .into_iter()
            .map(|line| {
                let item = NewItem {
                    unit_price: Cents::parse(&line.unit_price)?,
                    quantity: line.quantity.unwrap_or(Decimal::ONE),
                    name: line.name,
                };
                item.validate()?;
                Ok(item)
            })
            .collect::<Result<Vec<_>>>()?;

        let items_sum = Cents::round(items.iter().map(|i| i.unit_price.times(i.quantity)).sum());
        let subtotal = parse_optional(self.subtotal.as_deref())?.unwrap_or(items_sum);
        let tax = parse_optional(self.tax.as_deref())?.unwrap_or_default();
        let tip = parse_optional(self.tip.as_deref())?.unwrap_or_default();
        let total = parse_optional(self.total.as_deref())?.unwrap_or(subtotal + tax + tip);

        if subtotal != items_sum {
            tracing::warn!(
                declared = %subtotal,
                items = %items_sum,
                "Extracted subtotal disagrees with item lines"
            );
        }

        let receipt = NewReceipt {
            merchant_name: self.merchant_name,
            date: self.date,
            subtotal,
            tax,
            tip,
            total,
            owner,
        };
        receipt.validate()?;

        Ok((receipt, items))
    }
}

/// Opaque receipt text-and-totals extraction service
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    /// Extract structured data from a receipt image
    async fn extract(&self, image: &[u8]) -> Result<ExtractedReceipt>;
}

impl<S: BackingStore + ?Sized> HostSession<S> {
    /// Create a draft receipt and its items from a receipt image
    pub async fn seed_from_extraction<E: ReceiptExtractor + ?Sized>(
        &self,
        extractor: &E,
        image: &[u8],
        owner: Option<String>,
    ) -> Result<(Receipt, Vec<Item>)> {
        if image.is_empty() {
            return Err(Error::Configuration("Receipt image is empty".to_string()));
        }

        let extracted = extractor.extract(image).await?;
        let (new_receipt, new_items) = extracted.into_drafts(owner)?;

        let receipt = self.create_receipt(new_receipt).await?;
        let items = self.replace_items(receipt.id, new_items).await?;
        Ok((receipt, items))
    }
}
