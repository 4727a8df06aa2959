//! The reconciliation engine: one sync cycle per tick.
//!
//! A cycle drains the outbound queue, then pulls every syncable collection
//! in a fixed order. Per collection the remote answers with either a delta
//! (merged item by item) or a full snapshot (adopted, merged, or answered
//! with a bootstrap push, depending on which side holds data). Errors
//! abort the whole cycle, not just the collection: the partially advanced
//! cursors self-heal on the next successful cycle.
//!
//! All mutable sync state lives on [`SyncEngine`]; one instance per
//! process, shared by reference.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use tillsync_engine::{merge, shape, DeltaPayload, Item, MergeReport};

use crate::collections;
use crate::config::Config;
use crate::error::{NetworkErrorClass, StoreError, SyncError};
use crate::events::{EventBus, SyncEvent};
use crate::queue::SyncQueue;
use crate::remote::{PushPayload, RemoteClient};
use crate::state::SyncState;
use crate::status::SyncStatus;
use crate::store::{now_iso, CollectionStore};

/// Item field marking where an order was placed.
const SOURCE_FIELD: &str = "source";
/// Orders placed through the public storefront; these drive notifications.
const STOREFRONT_SOURCE: &str = "storefront";

/// Result of asking for a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A cycle was already in flight; nothing was touched.
    Skipped,
    /// A cycle ran to its end (which may still mean the pull failed).
    Completed(CycleSummary),
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    pub pull_ok: bool,
    pub pull_error: Option<String>,
    pub flushed: usize,
    pub queue_remaining: usize,
}

pub(crate) struct RetryState {
    pub(crate) attempt: u32,
    pub(crate) scheduled: bool,
}

/// The sync engine instance: owns every piece of mutable sync state.
pub struct SyncEngine {
    config: Config,
    store: CollectionStore,
    remote: Option<RemoteClient>,
    queue: Mutex<SyncQueue>,
    state: Mutex<SyncState>,
    status: Mutex<SyncStatus>,
    events: EventBus,
    /// Guards against overlapping cycles; `try_lock` failure means skip.
    cycle_guard: Mutex<()>,
    pub(crate) retry: Mutex<RetryState>,
    pub(crate) last_alert_at: Mutex<Option<std::time::Instant>>,
}

impl SyncEngine {
    pub async fn new(config: Config) -> Self {
        let store = CollectionStore::new(&config.data_dir);
        let remote = RemoteClient::from_config(&config);
        let queue = SyncQueue::load(&config.data_dir, config.queue_max).await;
        let state = SyncState::load(&config.data_dir).await;
        let status = SyncStatus {
            queue_remaining: queue.len(),
            ..SyncStatus::default()
        };

        Self {
            config,
            store,
            remote,
            queue: Mutex::new(queue),
            state: Mutex::new(state),
            status: Mutex::new(status),
            events: EventBus::new(),
            cycle_guard: Mutex::new(()),
            retry: Mutex::new(RetryState {
                attempt: 0,
                scheduled: false,
            }),
            last_alert_at: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Current status snapshot with the `online` flag freshly computed.
    pub async fn status(&self) -> SyncStatus {
        let mut status = self.status.lock().await.clone();
        status.update_online(self.is_configured(), self.config.pull_interval);
        status
    }

    /// Run one full cycle: drain the queue, then pull every collection.
    ///
    /// If a cycle is already in flight the call returns
    /// [`CycleOutcome::Skipped`] immediately without touching anything.
    pub async fn run_cycle(self: &Arc<Self>) -> CycleOutcome {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            debug!("sync cycle already in flight; skipping");
            return CycleOutcome::Skipped;
        };

        let mut summary = CycleSummary::default();

        if let Some(remote) = self.remote.clone() {
            let report = {
                let mut queue = self.queue.lock().await;
                queue.flush(&remote).await
            };
            summary.flushed = report.flushed;
            summary.queue_remaining = report.remaining;
            {
                let mut status = self.status.lock().await;
                if report.flushed > 0 {
                    status.record_push_ok(&now_iso());
                }
                if report.failed {
                    status.record_push_error("queue flush failed");
                }
                status.queue_remaining = report.remaining;
            }

            match self.pull_collections(&remote).await {
                Ok(()) => {
                    summary.pull_ok = true;
                    self.reset_retry().await;
                }
                Err(err) => {
                    let class = err.network_class();
                    summary.pull_error = Some(err.to_string());
                    self.status
                        .lock()
                        .await
                        .record_pull_error(err.to_string(), class);
                    warn!(%err, ?class, "pull failed; cycle aborted");
                    if class == Some(NetworkErrorClass::Dns) {
                        self.schedule_retry().await;
                    }
                }
            }
        } else {
            debug!("sync not configured; cycle is a no-op");
        }

        {
            let mut status = self.status.lock().await;
            status.update_online(self.is_configured(), self.config.pull_interval);
            status.persist(self.store.data_dir()).await;
        }
        self.events.emit(SyncEvent::SyncCompleted(summary.clone()));
        CycleOutcome::Completed(summary)
    }

    /// Pull and reconcile every syncable collection in roster order.
    /// The first error aborts the remaining collections.
    async fn pull_collections(&self, remote: &RemoteClient) -> Result<(), SyncError> {
        let now = now_iso();
        let mut storefront_orders = 0usize;

        for name in collections::SYNC_COLLECTIONS {
            let since = {
                let state = self.state.lock().await;
                state.since(name).map(str::to_owned)
            };

            let payload = remote.pull(name, since.as_deref()).await?;
            if DeltaPayload::is_delta(&payload) {
                let delta = DeltaPayload::from_value(&payload);
                storefront_orders += self.apply_delta(name, &delta).await?;
            } else {
                storefront_orders += self
                    .apply_snapshot(name, since.is_none(), payload)
                    .await?;
            }

            self.state.lock().await.record(name, &now);
        }

        {
            let mut status = self.status.lock().await;
            status.record_pull_ok(&now);
            if storefront_orders > 0 {
                status.record_new_orders(&now, storefront_orders);
            }
        }
        if storefront_orders > 0 {
            self.maybe_alert(storefront_orders).await;
        }
        self.state.lock().await.save(self.store.data_dir()).await;
        Ok(())
    }

    /// Merge a delta response into the local collection. Returns the
    /// number of newly arrived storefront orders.
    async fn apply_delta(&self, name: &str, delta: &DeltaPayload) -> Result<usize, SyncError> {
        let mut doc = self.store.read(name).await?;
        let report = merge::apply_delta(&mut doc, delta);
        self.store.write(name, &doc).await?;
        Ok(self.emit_order_events(name, delta, &report))
    }

    /// Reconcile a full/snapshot response.
    async fn apply_snapshot(
        &self,
        name: &str,
        initial: bool,
        payload: Value,
    ) -> Result<usize, SyncError> {
        let local = self.store.read_value(name).await?;
        let remote_has = shape::has_data(&payload);
        let local_has = shape::has_data(&local);

        if remote_has && local_has {
            // Both sides hold data: merge the snapshot like a delta batch.
            let mut doc = shape::normalize_or_default(&local);
            let delta = DeltaPayload::from_document(shape::normalize_or_default(&payload));
            let report = merge::apply_delta(&mut doc, &delta);
            self.store.write(name, &doc).await?;
            let storefront = self.emit_order_events(name, &delta, &report);

            if initial {
                // First contact: the merged result may hold local-only
                // records the remote has never seen. Send it back.
                let data = serde_json::to_value(&doc).map_err(StoreError::from)?;
                self.push_or_enqueue(name, PushPayload::full(data)).await;
            }
            Ok(storefront)
        } else if !remote_has && local_has && collections::is_bootstrap(name) {
            // First-device-wins bootstrap of an empty remote.
            debug!(collection = name, "remote empty; bootstrapping from local data");
            self.push_or_enqueue(name, PushPayload::full(local)).await;
            Ok(0)
        } else if remote_has || !local_has {
            // Remote-only data, or both sides empty: adopt the remote.
            self.store.write_value(name, &payload).await?;
            Ok(0)
        } else {
            // Local-only data on a non-bootstrap collection: keep local.
            Ok(0)
        }
    }

    /// Raise typed events for the `orders` collection and count new
    /// storefront arrivals.
    fn emit_order_events(&self, name: &str, delta: &DeltaPayload, report: &MergeReport) -> usize {
        if name != "orders" {
            return 0;
        }

        let mut storefront = 0usize;
        for item in &delta.items {
            let Some(id) = item.id() else { continue };
            if report.inserted.contains(&id) {
                if item.str_field(SOURCE_FIELD) == Some(STOREFRONT_SOURCE) {
                    storefront += 1;
                }
                self.events.emit(SyncEvent::NewOrder(item.clone()));
            } else if report.replaced.contains(&id) {
                self.events.emit(SyncEvent::UpdatedOrder(item.clone()));
            }
        }
        storefront
    }

    /// Push a payload, parking it in the queue when the remote cannot be
    /// reached (transient or application failure alike).
    pub(crate) async fn push_or_enqueue(&self, collection: &str, payload: PushPayload) {
        let Some(remote) = &self.remote else { return };

        match remote.push(collection, &payload).await {
            Ok(()) => {
                self.status.lock().await.record_push_ok(&now_iso());
            }
            Err(err) => {
                warn!(collection, %err, "push failed; payload queued");
                let (dropped, depth) = {
                    let mut queue = self.queue.lock().await;
                    let dropped = queue.enqueue(collection, payload).await;
                    (dropped, queue.len())
                };
                {
                    let mut status = self.status.lock().await;
                    status.record_push_error(err.to_string());
                    status.queue_remaining = depth;
                }
                if dropped > 0 {
                    self.events.emit(SyncEvent::QueueOverflow { dropped });
                }
            }
        }
    }

    // ----- local write-through API -------------------------------------
    //
    // Mutations write locally first, then push the change as a delta so
    // other replicas see it without waiting for their own pull. A failed
    // push parks the payload in the queue; local data is never blocked on
    // the network.

    /// Create an item locally and push it as a delta.
    pub async fn create_item(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Item, SyncError> {
        let item = self.store.add_item(collection, fields).await?;
        if collections::is_synced(collection) {
            self.push_or_enqueue(collection, PushPayload::delta(vec![item.clone()], vec![]))
                .await;
        }
        Ok(item)
    }

    /// Update an item locally and push the new version as a delta.
    pub async fn update_item(
        &self,
        collection: &str,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<Item, SyncError> {
        let item = self.store.update_item(collection, id, changes).await?;
        if collections::is_synced(collection) {
            self.push_or_enqueue(collection, PushPayload::delta(vec![item.clone()], vec![]))
                .await;
        }
        Ok(item)
    }

    /// Delete an item locally and push its tombstone.
    pub async fn delete_item(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Item>, SyncError> {
        let removal = self.store.remove_item(collection, id).await?;
        if collections::is_synced(collection) {
            self.push_or_enqueue(
                collection,
                PushPayload::delta(vec![], vec![removal.tombstone.clone()]),
            )
            .await;
        }
        Ok(removal.item)
    }
}
