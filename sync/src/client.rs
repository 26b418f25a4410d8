//! Sync client
//!
//! One client per connected device. The client subscribes to the receipt's
//! change feed, hydrates a projection from a snapshot, and then runs an
//! event loop that:
//!
//! 1. Applies feed events to the projection in commit order
//! 2. Re-hydrates when the feed reports that it lagged
//! 3. Reverts mutations the store never acknowledged
//!
//! Every change is published as a [`ReceiptView`] on a `watch` channel.

use crate::{
    config::SyncConfig,
    optimistic::{MutationId, MutationKind, PendingMutation, PendingMutations},
    projection::{Applied, ReceiptProjection},
    retry::with_retry,
    Error, Result,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tabsplit_ledger::{
    BackingStore, ChangeEvent, Claim, ClaimLedger, ItemId, ParticipantId, ReceiptId,
    ReceiptStatus, Unclaimed,
};
use tabsplit_settlement::Settlement;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, trace, warn};

/// What a device shows for a receipt
#[derive(Debug, Clone)]
pub struct ReceiptView {
    /// Highest commit sequence reflected
    pub sequence: u64,

    /// Derived status over confirmed claims
    pub status: ReceiptStatus,

    /// Settlement over confirmed claims
    pub settlement: Settlement,

    /// Local mutations not yet reconciled
    pub pending: Vec<PendingMutation>,

    /// Claimed quantity per item including local pending mutations
    pub optimistic_claimed: BTreeMap<ItemId, Decimal>,
}

impl ReceiptView {
    fn build(state: &State) -> Self {
        let optimistic_claimed = state
            .projection
            .items()
            .iter()
            .map(|item| {
                (
                    item.id,
                    state.pending.optimistic_claimed(&state.projection, item.id),
                )
            })
            .collect();

        Self {
            sequence: state.projection.watermark(),
            status: state.projection.status(),
            settlement: state.projection.settlement(),
            pending: state.pending.snapshot(),
            optimistic_claimed,
        }
    }
}

struct State {
    projection: ReceiptProjection,
    pending: PendingMutations,
}

struct Shared<S: ?Sized> {
    ledger: ClaimLedger<S>,
    receipt_id: ReceiptId,
    participant_id: ParticipantId,
    config: SyncConfig,
    state: Mutex<State>,
    view: watch::Sender<ReceiptView>,
}

impl<S: BackingStore + ?Sized> Shared<S> {
    fn publish(&self, state: &mut State) {
        self.view.send_replace(ReceiptView::build(state));
        // Rejected and reverted mutations are shown once
        state.pending.clear_finished();
    }

    fn apply(&self, event: &ChangeEvent) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.projection.apply(event) {
            Applied::Changed => {
                let reconciled = state.pending.reconcile(&state.projection);
                trace!(
                    receipt_id = %self.receipt_id,
                    sequence = event.sequence,
                    reconciled,
                    "Applied change"
                );
                self.publish(state);
            }
            Applied::Stale | Applied::Foreign => {
                trace!(sequence = event.sequence, "Skipped change");
            }
        }
    }

    fn begin(&self, kind: MutationKind) -> MutationId {
        let mut guard = self.state.lock();
        let id = guard.pending.begin(kind, Instant::now());
        self.publish(&mut guard);
        id
    }

    fn confirm(&self, id: MutationId, sequence: Option<u64>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.pending.confirm(id, sequence);
        state.pending.reconcile(&state.projection);
        self.publish(state);
    }

    fn reject(&self, id: MutationId, reason: String) {
        let mut guard = self.state.lock();
        guard.pending.reject(id, reason);
        self.publish(&mut guard);
    }

    fn revert(&self, id: MutationId) {
        let mut guard = self.state.lock();
        guard.pending.revert(id);
        self.publish(&mut guard);
    }

    fn expire(&self) {
        let mut guard = self.state.lock();
        let expired = guard.pending.expire(Instant::now());
        if !expired.is_empty() {
            info!(
                receipt_id = %self.receipt_id,
                count = expired.len(),
                "Reverted unacknowledged mutations"
            );
            self.publish(&mut guard);
        }
    }

    async fn refresh(&self) -> Result<()> {
        let store = self.ledger.store();
        let receipt_id = self.receipt_id;
        let snapshot =
            with_retry(&self.config.retry, "snapshot", move || store.snapshot(receipt_id)).await?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if snapshot.sequence >= state.projection.watermark() {
            debug!(
                receipt_id = %self.receipt_id,
                from = state.projection.watermark(),
                to = snapshot.sequence,
                "Re-hydrated projection"
            );
            state.projection = ReceiptProjection::hydrate(snapshot);
        }
        state.pending.reconcile(&state.projection);
        self.publish(state);
        Ok(())
    }
}

/// Live, self-updating view of one receipt for one participant
pub struct SyncClient<S: BackingStore + ?Sized + 'static> {
    shared: Arc<Shared<S>>,
    view: watch::Receiver<ReceiptView>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: BackingStore + ?Sized + 'static> fmt::Debug for SyncClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncClient")
            .field("receipt_id", &self.shared.receipt_id)
            .field("participant_id", &self.shared.participant_id)
            .field("sequence", &self.view.borrow().sequence)
            .finish()
    }
}

impl<S: BackingStore + ?Sized + 'static> SyncClient<S> {
    /// Connect to a receipt as `participant_id`.
    ///
    /// Subscribes before taking the snapshot, so no commit can fall between
    /// the two.
    pub async fn connect(
        ledger: ClaimLedger<S>,
        receipt_id: ReceiptId,
        participant_id: ParticipantId,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;

        let store = ledger.store();
        let feed = store.subscribe(receipt_id);
        let snapshot =
            with_retry(&config.retry, "snapshot", move || store.snapshot(receipt_id)).await?;

        if !snapshot.participants.iter().any(|p| p.id == participant_id) {
            return Err(Error::Ledger(tabsplit_ledger::Error::NotFound(format!(
                "Participant {} is not on receipt {}",
                participant_id, receipt_id
            ))));
        }

        let state = State {
            projection: ReceiptProjection::hydrate(snapshot),
            pending: PendingMutations::new(config.confirm_timeout()),
        };
        let (view_tx, view_rx) = watch::channel(ReceiptView::build(&state));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            %receipt_id,
            %participant_id,
            sequence = view_rx.borrow().sequence,
            "Sync client connected"
        );

        let shared = Arc::new(Shared {
            ledger,
            receipt_id,
            participant_id,
            config,
            state: Mutex::new(state),
            view: view_tx,
        });

        let task = tokio::spawn(run(Arc::clone(&shared), feed, shutdown_rx));

        Ok(Self {
            shared,
            view: view_rx,
            shutdown: shutdown_tx,
            task: Mutex::new(Some(task)),
        })
    }

    /// Receipt this client follows
    pub fn receipt_id(&self) -> ReceiptId {
        self.shared.receipt_id
    }

    /// Participant this client acts as
    pub fn participant_id(&self) -> ParticipantId {
        self.shared.participant_id
    }

    /// Subscribe to view updates
    pub fn subscribe(&self) -> watch::Receiver<ReceiptView> {
        self.view.clone()
    }

    /// Latest view
    pub fn current(&self) -> ReceiptView {
        self.view.borrow().clone()
    }

    /// Wait until the view satisfies `condition`
    pub async fn wait_until(
        &self,
        condition: impl FnMut(&ReceiptView) -> bool,
    ) -> Result<ReceiptView> {
        let mut view = self.view.clone();
        let matched = view.wait_for(condition).await.map_err(|_| Error::FeedClosed)?;
        Ok(matched.clone())
    }

    /// Claim `portion` units of an item.
    ///
    /// The claim shows up in [`ReceiptView::optimistic_claimed`] immediately;
    /// settlement and status only change once the feed delivers the commit.
    /// On overclaim the projection is refreshed before the error is returned.
    pub async fn claim(&self, item_id: ItemId, portion: Decimal) -> Result<Claim> {
        let participant_id = self.shared.participant_id;
        let id = self.shared.begin(MutationKind::Claim {
            item_id,
            participant_id,
            portion,
        });

        let ledger = &self.shared.ledger;
        let attempt = with_retry(&self.shared.config.retry, "claim", move || {
            ledger.claim(item_id, participant_id, portion)
        });

        match self.acknowledged(id, attempt).await? {
            Ok(claim) => {
                self.shared.confirm(id, Some(claim.version));
                Ok(claim)
            }
            Err(err) => Err(self.rejected(id, err).await),
        }
    }

    /// Drop this participant's claim on an item. Unclaiming twice is fine.
    pub async fn unclaim(&self, item_id: ItemId) -> Result<Unclaimed> {
        let participant_id = self.shared.participant_id;
        let id = self.shared.begin(MutationKind::Unclaim {
            item_id,
            participant_id,
        });

        let ledger = &self.shared.ledger;
        let attempt = with_retry(&self.shared.config.retry, "unclaim", move || {
            ledger.unclaim(item_id, participant_id)
        });

        match self.acknowledged(id, attempt).await? {
            Ok(unclaimed) => {
                self.shared.confirm(id, None);
                Ok(unclaimed)
            }
            Err(err) => Err(self.rejected(id, err).await),
        }
    }

    async fn acknowledged<T>(
        &self,
        id: MutationId,
        attempt: impl std::future::Future<Output = Result<T>>,
    ) -> Result<Result<T>> {
        let limit = self.shared.config.confirm_timeout();
        match tokio::time::timeout(limit, attempt).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                warn!(
                    receipt_id = %self.shared.receipt_id,
                    waited_ms = limit.as_millis() as u64,
                    "Mutation not acknowledged, reverting"
                );
                self.shared.revert(id);
                Err(Error::Timeout {
                    waited_ms: limit.as_millis() as u64,
                })
            }
        }
    }

    async fn rejected(&self, id: MutationId, err: Error) -> Error {
        self.shared.reject(id, err.user_message());
        if err.needs_refresh() {
            info!(
                receipt_id = %self.shared.receipt_id,
                "{}: {}",
                err.user_message(),
                err
            );
            if let Err(refresh_err) = self.shared.refresh().await {
                warn!("Refresh after rejection failed: {}", refresh_err);
            }
        }
        err
    }

    /// Re-read the receipt from the store
    pub async fn refresh(&self) -> Result<()> {
        self.shared.refresh().await
    }

    /// Current settlement over confirmed claims
    pub fn settlement(&self) -> Settlement {
        self.view.borrow().settlement.clone()
    }

    /// Current derived status
    pub fn status(&self) -> ReceiptStatus {
        self.view.borrow().status
    }

    /// Whether the event loop is still running
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the event loop and wait for it to exit
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                error!("Sync loop ended abnormally: {}", err);
            }
        }
    }
}

impl<S: BackingStore + ?Sized + 'static> Drop for SyncClient<S> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn run<S: BackingStore + ?Sized + 'static>(
    shared: Arc<Shared<S>>,
    feed: broadcast::Receiver<ChangeEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut feed = BroadcastStream::new(feed);
    let mut ticker = tokio::time::interval(shared.config.expiry_tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(receipt_id = %shared.receipt_id, "Sync loop stopping");
                    break;
                }
            }

            next = feed.next() => match next {
                Some(Ok(event)) => shared.apply(&event),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(
                        receipt_id = %shared.receipt_id,
                        skipped,
                        "Change feed lagged, re-hydrating"
                    );
                    if let Err(err) = shared.refresh().await {
                        error!(receipt_id = %shared.receipt_id, "Re-hydration failed: {}", err);
                    }
                }
                None => {
                    warn!(receipt_id = %shared.receipt_id, "Change feed closed");
                    break;
                }
            },

            _ = ticker.tick() => shared.expire(),
        }
    }
}
