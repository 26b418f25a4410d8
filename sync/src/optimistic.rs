//! Local mutations awaiting the store
//!
//! Every claim or unclaim a client sends is tracked here from the moment it
//! is issued. A mutation is `Unconfirmed` until the store acknowledges it,
//! then `Confirmed` until the change feed shows its effect, at which point
//! it is dropped. Rejected and timed-out mutations stay visible until the
//! client has shown them once.

use crate::projection::ReceiptProjection;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;
use tabsplit_ledger::{ItemId, ParticipantId};
use tokio::time::Instant;

/// Client-local mutation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(u64);

/// What the client asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Set the participant's portion of an item
    Claim {
        /// Item
        item_id: ItemId,
        /// Claimant
        participant_id: ParticipantId,
        /// Requested portion
        portion: Decimal,
    },
    /// Drop the participant's claim on an item
    Unclaim {
        /// Item
        item_id: ItemId,
        /// Claimant
        participant_id: ParticipantId,
    },
}

impl MutationKind {
    /// Item the mutation touches
    pub fn item_id(&self) -> ItemId {
        match self {
            MutationKind::Claim { item_id, .. } | MutationKind::Unclaim { item_id, .. } => *item_id,
        }
    }

    /// Participant the mutation touches
    pub fn participant_id(&self) -> ParticipantId {
        match self {
            MutationKind::Claim { participant_id, .. }
            | MutationKind::Unclaim { participant_id, .. } => *participant_id,
        }
    }
}

/// Where a mutation stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationState {
    /// Sent, no acknowledgement yet
    Unconfirmed,
    /// Acknowledged at this commit sequence, not yet seen on the feed
    Confirmed {
        /// Commit sequence of the acknowledged write, if it wrote anything
        sequence: Option<u64>,
    },
    /// Store refused it
    Rejected {
        /// Message for the participant
        reason: String,
    },
    /// Never acknowledged within the confirm timeout
    Reverted,
}

impl MutationState {
    /// Whether the mutation still shapes the optimistic overlay
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            MutationState::Unconfirmed | MutationState::Confirmed { .. }
        )
    }
}

/// One tracked mutation
#[derive(Debug, Clone)]
pub struct PendingMutation {
    /// Identifier
    pub id: MutationId,
    /// Requested change
    pub kind: MutationKind,
    /// Current state
    pub state: MutationState,
    /// When it was issued
    pub issued_at: Instant,
}

/// Tracks a client's in-flight mutations
#[derive(Debug)]
pub struct PendingMutations {
    next_id: u64,
    entries: BTreeMap<MutationId, PendingMutation>,
    confirm_timeout: Duration,
}

impl PendingMutations {
    /// Create a tracker; unconfirmed mutations revert after `confirm_timeout`
    pub fn new(confirm_timeout: Duration) -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
            confirm_timeout,
        }
    }

    /// Record a mutation as sent
    pub fn begin(&mut self, kind: MutationKind, now: Instant) -> MutationId {
        let id = MutationId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            PendingMutation {
                id,
                kind,
                state: MutationState::Unconfirmed,
                issued_at: now,
            },
        );
        id
    }

    /// Store acknowledged the mutation.
    ///
    /// Ignored once the mutation has been reverted; the feed decides from
    /// there.
    pub fn confirm(&mut self, id: MutationId, sequence: Option<u64>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if entry.state == MutationState::Unconfirmed {
                entry.state = MutationState::Confirmed { sequence };
            }
        }
    }

    /// Store refused the mutation
    pub fn reject(&mut self, id: MutationId, reason: impl Into<String>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state = MutationState::Rejected {
                reason: reason.into(),
            };
        }
    }

    /// Give up on a mutation
    pub fn revert(&mut self, id: MutationId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if entry.state.is_live() {
                entry.state = MutationState::Reverted;
            }
        }
    }

    /// Revert every unconfirmed mutation older than the confirm timeout
    pub fn expire(&mut self, now: Instant) -> Vec<MutationId> {
        let mut expired = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.state == MutationState::Unconfirmed
                && now.saturating_duration_since(entry.issued_at) >= self.confirm_timeout
            {
                entry.state = MutationState::Reverted;
                expired.push(entry.id);
            }
        }
        expired
    }

    /// Drop confirmed mutations whose effect the projection already shows
    pub fn reconcile(&mut self, projection: &ReceiptProjection) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let MutationState::Confirmed { sequence } = entry.state else {
                return true;
            };
            let item_id = entry.kind.item_id();
            let participant_id = entry.kind.participant_id();
            let visible = match entry.kind {
                MutationKind::Claim { .. } => match sequence {
                    Some(seq) => projection
                        .claim_for(item_id, participant_id)
                        .is_some_and(|c| c.version >= seq)
                        || projection.watermark() >= seq,
                    None => true,
                },
                MutationKind::Unclaim { .. } => {
                    projection.claim_for(item_id, participant_id).is_none()
                        || sequence.is_some_and(|seq| projection.watermark() >= seq)
                }
            };
            !visible
        });
        before - self.entries.len()
    }

    /// Remove rejected and reverted mutations
    pub fn clear_finished(&mut self) -> Vec<PendingMutation> {
        let finished: Vec<MutationId> = self
            .entries
            .values()
            .filter(|e| !e.state.is_live())
            .map(|e| e.id)
            .collect();
        finished
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    /// Look up a mutation
    pub fn get(&self, id: MutationId) -> Option<&PendingMutation> {
        self.entries.get(&id)
    }

    /// All tracked mutations, oldest first
    pub fn snapshot(&self) -> Vec<PendingMutation> {
        self.entries.values().cloned().collect()
    }

    /// Number of tracked mutations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claimed quantity on an item as the participant would expect to see it.
    ///
    /// For display only; settlement and status use the projection alone.
    pub fn optimistic_claimed(&self, projection: &ReceiptProjection, item_id: ItemId) -> Decimal {
        let mut portions: BTreeMap<ParticipantId, Decimal> = projection
            .claims()
            .into_iter()
            .filter(|c| c.item_id == item_id)
            .map(|c| (c.participant_id, c.portion))
            .collect();

        for entry in self.entries.values().filter(|e| e.state.is_live()) {
            match entry.kind {
                MutationKind::Claim {
                    item_id: target,
                    participant_id,
                    portion,
                } if target == item_id => {
                    portions.insert(participant_id, portion);
                }
                MutationKind::Unclaim {
                    item_id: target,
                    participant_id,
                } if target == item_id => {
                    portions.remove(&participant_id);
                }
                _ => {}
            }
        }

        portions.values().copied().sum()
    }
}
