//! Single-writer in-memory backing store
//!
//! Every request goes through one actor task that owns the [`Tables`], so a
//! claim's overclaim check and its write happen in one serialized step,
//! exactly like a stored procedure on a server-side database. Change events
//! are published from the same task, which gives subscribers commit order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │         MemoryStore (Clone, one per client)          │
//! │      Sends messages to actor mailbox                 │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              StoreActor (Single Task)                │
//! │  Tables: receipts / items / participants / claims    │
//! │  check + write + audit append                        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ broadcast per receipt
//!                       ▼
//!               subscribed clients
//! ```

use crate::{
    config::StoreConfig,
    event::{ChangeEvent, LedgerEvent},
    store::{BackingStore, ItemTally, ReceiptSnapshot},
    tables::{Committed, Tables},
    types::{
        Claim, ClaimId, Item, ItemId, NewItem, NewParticipant, NewReceipt, Participant,
        ParticipantId, PaymentStatus, Publication, Receipt, ReceiptId,
    },
    Error, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T>>;
type Feeds = Arc<DashMap<ReceiptId, broadcast::Sender<ChangeEvent>>>;

/// Message sent to the store actor
#[derive(Debug)]
pub enum StoreMessage {
    /// Create a receipt
    InsertReceipt { receipt: NewReceipt, response: Reply<Receipt> },
    /// Fetch a receipt
    GetReceipt { receipt_id: ReceiptId, response: Reply<Receipt> },
    /// Change publication flag
    SetPublication {
        receipt_id: ReceiptId,
        publication: Publication,
        response: Reply<Receipt>,
    },
    /// Replace items wholesale
    ReplaceItems {
        receipt_id: ReceiptId,
        items: Vec<NewItem>,
        response: Reply<Vec<Item>>,
    },
    /// Fetch an item
    GetItem { item_id: ItemId, response: Reply<Item> },
    /// Add a participant
    InsertParticipant {
        participant: NewParticipant,
        response: Reply<Participant>,
    },
    /// Remove a participant
    RemoveParticipant {
        participant_id: ParticipantId,
        response: Reply<()>,
    },
    /// Change payment status
    SetPaymentStatus {
        participant_id: ParticipantId,
        status: PaymentStatus,
        response: Reply<Participant>,
    },
    /// Check-and-write a claim
    UpsertClaim {
        item_id: ItemId,
        participant_id: ParticipantId,
        portion: Decimal,
        response: Reply<Claim>,
    },
    /// Delete a claim
    DeleteClaim {
        claim_id: ClaimId,
        response: Reply<Option<Claim>>,
    },
    /// Delete a pair's claim in one step
    DeleteClaimFor {
        item_id: ItemId,
        participant_id: ParticipantId,
        response: Reply<Option<Claim>>,
    },
    /// Look up a pair's claim
    FindClaim {
        item_id: ItemId,
        participant_id: ParticipantId,
        response: Reply<Option<Claim>>,
    },
    /// List claims on items
    ListClaims {
        item_ids: Vec<ItemId>,
        response: Reply<Vec<Claim>>,
    },
    /// Claimed quantity on an item
    ItemTally { item_id: ItemId, response: Reply<ItemTally> },
    /// Atomic receipt snapshot
    Snapshot {
        receipt_id: ReceiptId,
        response: Reply<ReceiptSnapshot>,
    },
    /// Audit history
    History {
        receipt_id: ReceiptId,
        response: Reply<Vec<LedgerEvent>>,
    },
    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the tables
#[derive(Debug)]
pub struct StoreActor {
    tables: Tables,
    mailbox: mpsc::Receiver<StoreMessage>,
    feeds: Feeds,
}

impl StoreActor {
    fn new(mailbox: mpsc::Receiver<StoreMessage>, feeds: Feeds, tombstone_capacity: usize) -> Self {
        Self {
            tables: Tables::with_tombstone_capacity(tombstone_capacity),
            mailbox,
            feeds,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let StoreMessage::Shutdown = msg {
                tracing::info!(sequence = self.tables.sequence(), "Store actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
    }

    fn publish<T>(&self, committed: Result<Committed<T>>) -> Result<T> {
        let (value, events) = committed?;
        for event in events {
            tracing::debug!(
                sequence = event.sequence,
                receipt_id = %event.receipt_id,
                table = ?event.table,
                event_type = ?event.event_type,
                "Committed change"
            );
            if let Some(feed) = self.feeds.get(&event.receipt_id) {
                // No live subscribers is fine
                let _ = feed.send(event);
            }
        }
        Ok(value)
    }

    fn handle_message(&mut self, msg: StoreMessage) {
        let now = Utc::now();

        match msg {
            StoreMessage::InsertReceipt { receipt, response } => {
                let result = self.tables.insert_receipt(receipt, now);
                let _ = response.send(self.publish(result));
            }

            StoreMessage::GetReceipt { receipt_id, response } => {
                let _ = response.send(self.tables.receipt(receipt_id).cloned());
            }

            StoreMessage::SetPublication {
                receipt_id,
                publication,
                response,
            } => {
                let result = self.tables.set_publication(receipt_id, publication);
                let _ = response.send(self.publish(result));
            }

            StoreMessage::ReplaceItems {
                receipt_id,
                items,
                response,
            } => {
                let result = self.tables.replace_items(receipt_id, items, now);
                let _ = response.send(self.publish(result));
            }

            StoreMessage::GetItem { item_id, response } => {
                let _ = response.send(self.tables.item(item_id).cloned());
            }

            StoreMessage::InsertParticipant {
                participant,
                response,
            } => {
                let result = self.tables.insert_participant(participant, now);
                let _ = response.send(self.publish(result));
            }

            StoreMessage::RemoveParticipant {
                participant_id,
                response,
            } => {
                let result = self.tables.remove_participant(participant_id, now);
                let _ = response.send(self.publish(result));
            }

            StoreMessage::SetPaymentStatus {
                participant_id,
                status,
                response,
            } => {
                let result = self.tables.set_payment_status(participant_id, status, now);
                let _ = response.send(self.publish(result));
            }

            StoreMessage::UpsertClaim {
                item_id,
                participant_id,
                portion,
                response,
            } => {
                let result = self.tables.upsert_claim(item_id, participant_id, portion, now);
                let _ = response.send(self.publish(result));
            }

            StoreMessage::DeleteClaim { claim_id, response } => {
                let result = self.tables.delete_claim(claim_id, now);
                let _ = response.send(self.publish(Ok(result)));
            }

            StoreMessage::DeleteClaimFor {
                item_id,
                participant_id,
                response,
            } => {
                let result = self.tables.delete_claim_for(item_id, participant_id, now);
                let _ = response.send(self.publish(Ok(result)));
            }

            StoreMessage::FindClaim {
                item_id,
                participant_id,
                response,
            } => {
                let _ = response.send(Ok(self.tables.find_claim(item_id, participant_id).cloned()));
            }

            StoreMessage::ListClaims { item_ids, response } => {
                let _ = response.send(Ok(self.tables.list_claims(&item_ids)));
            }

            StoreMessage::ItemTally { item_id, response } => {
                let _ = response.send(self.tables.item_tally(item_id));
            }

            StoreMessage::Snapshot {
                receipt_id,
                response,
            } => {
                let _ = response.send(self.tables.snapshot(receipt_id));
            }

            StoreMessage::History {
                receipt_id,
                response,
            } => {
                let _ = response.send(self.tables.history(receipt_id));
            }

            StoreMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

/// Handle to the in-memory store actor
#[derive(Debug, Clone)]
pub struct MemoryStore {
    sender: mpsc::Sender<StoreMessage>,
    feeds: Feeds,
    feed_capacity: usize,
}

impl MemoryStore {
    /// Spawn the store actor on the current tokio runtime
    pub fn spawn(config: &StoreConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity); // Bounded channel for backpressure
        let feeds: Feeds = Arc::new(DashMap::new());
        let actor = StoreActor::new(rx, feeds.clone(), config.tombstone_capacity);

        tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            sender: tx,
            feeds,
            feed_capacity: config.feed_capacity,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> StoreMessage + Send) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Store mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Stop the actor; later requests fail with `Concurrency`
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(StoreMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Store mailbox closed".to_string()))
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn insert_receipt(&self, receipt: NewReceipt) -> Result<Receipt> {
        self.request(|response| StoreMessage::InsertReceipt { receipt, response })
            .await
    }

    async fn get_receipt(&self, receipt_id: ReceiptId) -> Result<Receipt> {
        self.request(|response| StoreMessage::GetReceipt {
            receipt_id,
            response,
        })
        .await
    }

    async fn set_publication(
        &self,
        receipt_id: ReceiptId,
        publication: Publication,
    ) -> Result<Receipt> {
        self.request(|response| StoreMessage::SetPublication {
            receipt_id,
            publication,
            response,
        })
        .await
    }

    async fn replace_items(&self, receipt_id: ReceiptId, items: Vec<NewItem>) -> Result<Vec<Item>> {
        self.request(|response| StoreMessage::ReplaceItems {
            receipt_id,
            items,
            response,
        })
        .await
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Item> {
        self.request(|response| StoreMessage::GetItem { item_id, response })
            .await
    }

    async fn insert_participant(&self, participant: NewParticipant) -> Result<Participant> {
        self.request(|response| StoreMessage::InsertParticipant {
            participant,
            response,
        })
        .await
    }

    async fn remove_participant(&self, participant_id: ParticipantId) -> Result<()> {
        self.request(|response| StoreMessage::RemoveParticipant {
            participant_id,
            response,
        })
        .await
    }

    async fn set_payment_status(
        &self,
        participant_id: ParticipantId,
        status: PaymentStatus,
    ) -> Result<Participant> {
        self.request(|response| StoreMessage::SetPaymentStatus {
            participant_id,
            status,
            response,
        })
        .await
    }

    async fn upsert_claim(
        &self,
        item_id: ItemId,
        participant_id: ParticipantId,
        portion: Decimal,
    ) -> Result<Claim> {
        self.request(|response| StoreMessage::UpsertClaim {
            item_id,
            participant_id,
            portion,
            response,
        })
        .await
    }

    async fn delete_claim(&self, claim_id: ClaimId) -> Result<Option<Claim>> {
        self.request(|response| StoreMessage::DeleteClaim { claim_id, response })
            .await
    }

    async fn delete_claim_for(
        &self,
        item_id: ItemId,
        participant_id: ParticipantId,
    ) -> Result<Option<Claim>> {
        self.request(|response| StoreMessage::DeleteClaimFor {
            item_id,
            participant_id,
            response,
        })
        .await
    }

    async fn find_claim(
        &self,
        item_id: ItemId,
        participant_id: ParticipantId,
    ) -> Result<Option<Claim>> {
        self.request(|response| StoreMessage::FindClaim {
            item_id,
            participant_id,
            response,
        })
        .await
    }

    async fn list_claims(&self, item_ids: &[ItemId]) -> Result<Vec<Claim>> {
        let item_ids = item_ids.to_vec();
        self.request(|response| StoreMessage::ListClaims { item_ids, response })
            .await
    }

    async fn item_tally(&self, item_id: ItemId) -> Result<ItemTally> {
        self.request(|response| StoreMessage::ItemTally { item_id, response })
            .await
    }

    async fn snapshot(&self, receipt_id: ReceiptId) -> Result<ReceiptSnapshot> {
        self.request(|response| StoreMessage::Snapshot {
            receipt_id,
            response,
        })
        .await
    }

    async fn history(&self, receipt_id: ReceiptId) -> Result<Vec<LedgerEvent>> {
        self.request(|response| StoreMessage::History {
            receipt_id,
            response,
        })
        .await
    }

    fn subscribe(&self, receipt_id: ReceiptId) -> broadcast::Receiver<ChangeEvent> {
        self.feeds
            .entry(receipt_id)
            .or_insert_with(|| broadcast::channel(self.feed_capacity).0)
            .subscribe()
    }
}
