//! Sync engine state machine.

use crate::cache::{now_ms, LocalCache};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, NoopObserver, SyncObserver};
use crate::remote::RemoteStore;
use crate::subscription::{ChangeHandler, SubscriptionManager};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use partsync_protocol::{
    merge_with_policy, needs_remote_update, new_op_id, same_snapshot, CollectionKey,
    ConflictPolicy, Record, RemoteEnvelope, RemoteSnapshot, SyncEvent, SyncReason, SyncStatus,
};
use partsync_storage::DurableStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, info_span, warn, Instrument};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, no session has run yet.
    Idle,
    /// Engine is waiting for the remote store to become ready.
    WaitingForCloud,
    /// Engine is pulling, merging and pushing collections.
    Reconciling,
    /// Engine is re-attaching live listeners.
    Subscribing,
    /// Engine has completed a sync session.
    Synced,
    /// The last session failed.
    Error,
}

impl SyncState {
    /// Returns true if a session is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::WaitingForCloud | SyncState::Reconciling | SyncState::Subscribing
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sessions that ended in `done`.
    pub cycles_completed: u64,
    /// Sessions that ended in `error`.
    pub cycles_failed: u64,
    /// Collections written to the remote store.
    pub keys_pushed: u64,
    /// Live pushes that changed the local snapshot.
    pub pushes_applied: u64,
    /// Live pushes recognized as echoes of our own writes.
    pub echoes_skipped: u64,
    /// Completion time of the last successful session, epoch millis.
    pub last_sync_at: Option<i64>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Trigger of the last session.
    pub last_reason: Option<SyncReason>,
}

pub(crate) struct EngineInner<R: RemoteStore + 'static> {
    pub(crate) config: SyncConfig,
    pub(crate) remote: Arc<R>,
    pub(crate) cache: LocalCache,
    pub(crate) subscriptions: SubscriptionManager<R>,
    pub(crate) events: EventBus,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    conflict_policy: RwLock<ConflictPolicy>,
    in_flight: Mutex<Option<watch::Receiver<Option<bool>>>>,
    last_op_ids: RwLock<HashMap<CollectionKey, String>>,
    pub(crate) schedule_generation: AtomicU64,
}

/// The sync engine reconciles the local cache with a remote realtime store.
///
/// Cloning the engine yields another handle to the same instance.
pub struct SyncEngine<R: RemoteStore + 'static> {
    pub(crate) inner: Arc<EngineInner<R>>,
}

impl<R: RemoteStore + 'static> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RemoteStore + 'static> SyncEngine<R> {
    /// Creates a new sync engine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn new(
        config: SyncConfig,
        remote: Arc<R>,
        store: Arc<dyn DurableStore>,
    ) -> SyncResult<Self> {
        Self::with_observer(config, remote, store, Arc::new(NoopObserver))
    }

    /// Creates a new sync engine that reports events to `observer`.
    pub fn with_observer(
        config: SyncConfig,
        remote: Arc<R>,
        store: Arc<dyn DurableStore>,
        observer: Arc<dyn SyncObserver>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let cache = LocalCache::new(store, config.persistence);
        let subscriptions =
            SubscriptionManager::new(Arc::clone(&remote), config.remote_root.clone());
        let events = EventBus::new(config.event_capacity, observer);
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                remote,
                cache,
                subscriptions,
                events,
                state: RwLock::new(SyncState::Idle),
                stats: RwLock::new(SyncStats::default()),
                conflict_policy: RwLock::new(ConflictPolicy::LastWriteWins),
                in_flight: Mutex::new(None),
                last_op_ids: RwLock::new(HashMap::new()),
                schedule_generation: AtomicU64::new(0),
            }),
        })
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Gets the remote store.
    pub fn remote(&self) -> &Arc<R> {
        &self.inner.remote
    }

    /// Gets the local cache.
    pub fn cache(&self) -> &LocalCache {
        &self.inner.cache
    }

    /// Gets the subscription manager.
    pub fn subscriptions(&self) -> &SubscriptionManager<R> {
        &self.inner.subscriptions
    }

    /// Returns a receiver for subsequent events.
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.inner.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Sets the conflict policy.
    pub fn set_conflict_policy(&self, policy: ConflictPolicy) {
        *self.inner.conflict_policy.write() = policy;
    }

    /// Gets the conflict policy.
    pub fn conflict_policy(&self) -> ConflictPolicy {
        *self.inner.conflict_policy.read()
    }

    /// Returns true if a session is running.
    pub fn is_syncing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Returns the in-memory snapshot for `key`.
    pub fn snapshot(&self, key: &CollectionKey) -> Option<Vec<Record>> {
        self.inner.cache.session(key)
    }

    /// Warms the cache from the durable store, then runs a startup sync.
    ///
    /// Warm-loaded snapshots are merged over by the first successful pull.
    pub async fn start(&self) -> bool {
        if self.inner.cache.is_durable() {
            let warmed = self.inner.cache.warm(&self.inner.config.collections).await;
            if !warmed.is_empty() {
                info!(count = warmed.len(), "warmed cache from durable store");
                self.inner.events.emit(SyncEvent::data_updated(warmed));
            }
        }
        self.sync_all(SyncReason::Startup).await
    }

    /// Runs a sync session and returns whether it completed.
    ///
    /// Only one session runs at a time. A call made while a session is in
    /// flight joins it and returns its outcome, whatever its reason.
    pub async fn sync_all(&self, reason: SyncReason) -> bool {
        let leader = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(rx) => Err(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Ok(tx)
                }
            }
        };

        let tx = match leader {
            Ok(tx) => tx,
            Err(mut rx) => {
                debug!(reason = %reason, "joining in-flight sync");
                let outcome = rx
                    .wait_for(Option::is_some)
                    .await
                    .map(|outcome| outcome.unwrap_or(false));
                return outcome.unwrap_or(false);
            }
        };

        // the session outlives a dropped caller
        let inner = Arc::clone(&self.inner);
        let session = tokio::spawn(async move {
            let _slot = InFlightSlot(&*inner);
            let span = info_span!("sync_session", reason = %reason);
            let ok = run_session(&inner, reason).instrument(span).await;
            let _ = tx.send(Some(ok));
            ok
        });
        session.await.unwrap_or(false)
    }

    /// Replaces a collection: writes it remotely, then locally.
    ///
    /// Requires a ready remote store.
    pub async fn save_collection(
        &self,
        key: &CollectionKey,
        records: Vec<Record>,
    ) -> SyncResult<()> {
        let inner = &self.inner;
        if !inner.remote.is_connected() {
            return Err(SyncError::NotConnected);
        }
        if !inner.remote.is_ready() {
            return Err(SyncError::NotAuthenticated);
        }

        let _guard = inner.cache.lock_key(key).await;
        push(inner, key, records.clone()).await?;
        inner.cache.set(key, records).await;
        inner.events.emit(SyncEvent::data_updated(vec![key.clone()]));
        Ok(())
    }

    /// Attaches live listeners for every tracked collection.
    pub fn subscribe_all(&self) -> SyncResult<()> {
        subscribe_all(&self.inner)
    }

    /// Detaches every live listener.
    pub fn unsubscribe_all(&self) {
        self.inner.subscriptions.unsubscribe_all();
    }
}

/// Clears the in-flight marker when the session task ends, even on panic.
struct InFlightSlot<'a, R: RemoteStore + 'static>(&'a EngineInner<R>);

impl<R: RemoteStore + 'static> Drop for InFlightSlot<'_, R> {
    fn drop(&mut self) {
        *self.0.in_flight.lock() = None;
    }
}

impl<R: RemoteStore + 'static> EngineInner<R> {
    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn policy(&self) -> ConflictPolicy {
        *self.conflict_policy.read()
    }

    fn handle_error(&self, reason: SyncReason, error: &str) {
        self.set_state(SyncState::Error);
        {
            let mut stats = self.stats.write();
            stats.cycles_failed += 1;
            stats.last_error = Some(error.to_string());
        }
        self.events.emit(SyncEvent::failed(reason, error));
    }
}

async fn run_session<R: RemoteStore + 'static>(
    inner: &Arc<EngineInner<R>>,
    reason: SyncReason,
) -> bool {
    info!("sync started");
    inner.stats.write().last_reason = Some(reason);
    inner.events.emit(SyncEvent::status(SyncStatus::Start, reason));

    inner.set_state(SyncState::WaitingForCloud);
    let timeout = inner.config.ready_timeout;
    if !inner.remote.wait_for_cloud_ready(timeout).await {
        let error = SyncError::ReadinessTimeout(timeout);
        warn!(error = %error, "sync aborted");
        inner.handle_error(reason, &error.to_string());
        return false;
    }

    inner.set_state(SyncState::Reconciling);
    let mut changed = Vec::new();
    let mut failures = Vec::new();
    for key in &inner.config.collections {
        match reconcile_key(inner, key).await {
            Ok(true) => changed.push(key.clone()),
            Ok(false) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "collection skipped");
                failures.push(format!("{}: {}", key, e));
            }
        }
    }

    inner.set_state(SyncState::Subscribing);
    if let Err(e) = subscribe_all(inner) {
        failures.push(e.to_string());
    }

    inner.events.emit(SyncEvent::data_updated(changed));

    if !failures.is_empty() {
        let error = failures.join("; ");
        warn!(error = %error, "sync finished with errors");
        inner.handle_error(reason, &error);
        return false;
    }

    inner.set_state(SyncState::Synced);
    {
        let mut stats = inner.stats.write();
        stats.cycles_completed += 1;
        stats.last_sync_at = Some(now_ms());
        stats.last_error = None;
    }
    inner.events.emit(SyncEvent::status(SyncStatus::Done, reason));
    info!("sync done");
    true
}

/// Pull, merge, push if stale, commit. Returns whether the local snapshot
/// changed.
async fn reconcile_key<R: RemoteStore + 'static>(
    inner: &Arc<EngineInner<R>>,
    key: &CollectionKey,
) -> SyncResult<bool> {
    let _guard = inner.cache.lock_key(key).await;
    let path = key.remote_path(&inner.config.remote_root);

    let value = inner.remote.read(&path).await?;
    let remote = RemoteSnapshot::decode(value.as_ref());
    let local = inner.cache.get(key).await;

    let outcome =
        merge_with_policy(local.as_deref(), Some(&remote.records[..]), inner.policy());
    debug!(
        key = %key,
        records = outcome.records.len(),
        from_local = outcome.report.from_local,
        dropped = outcome.report.dropped,
        "merged"
    );

    let remote_view = remote.exists.then_some(&remote.records[..]);
    if (remote.exists || !outcome.records.is_empty())
        && needs_remote_update(remote_view, &outcome.records)
    {
        push(inner, key, outcome.records.clone()).await?;
    }

    let changed = match &local {
        Some(local) => !same_snapshot(local, &outcome.records),
        None => !outcome.records.is_empty(),
    };
    inner.cache.set(key, outcome.records).await;
    Ok(changed)
}

/// Writes `records` as the envelope for `key`.
async fn push<R: RemoteStore + 'static>(
    inner: &EngineInner<R>,
    key: &CollectionKey,
    records: Vec<Record>,
) -> SyncResult<()> {
    let device = &inner.config.device_id;
    let op_id = new_op_id(device, key);
    let envelope = RemoteEnvelope::new(records, now_ms(), device.as_str(), op_id.as_str());
    let value = envelope.to_value()?;

    // recorded first: the remote may echo the write before it returns
    inner.last_op_ids.write().insert(key.clone(), op_id);
    let path = key.remote_path(&inner.config.remote_root);
    inner.remote.write(&path, value).await?;

    inner.stats.write().keys_pushed += 1;
    debug!(key = %key, "pushed");
    Ok(())
}

fn subscribe_all<R: RemoteStore + 'static>(inner: &Arc<EngineInner<R>>) -> SyncResult<()> {
    let handler: Arc<dyn ChangeHandler> = Arc::new(CacheMergeHandler {
        engine: Arc::downgrade(inner),
    });
    inner
        .subscriptions
        .subscribe_all(&inner.config.collections, handler)
}

/// Default change handler: merges a pushed value into the cache.
struct CacheMergeHandler<R: RemoteStore + 'static> {
    engine: Weak<EngineInner<R>>,
}

#[async_trait]
impl<R: RemoteStore + 'static> ChangeHandler for CacheMergeHandler<R> {
    async fn on_change(&self, key: &CollectionKey, value: Option<Value>) -> SyncResult<()> {
        let Some(inner) = self.engine.upgrade() else {
            return Ok(());
        };
        let remote = RemoteSnapshot::decode(value.as_ref());

        let is_echo = remote.op_id.as_deref().is_some_and(|op_id| {
            inner.last_op_ids.read().get(key).map(String::as_str) == Some(op_id)
                && remote.is_echo_of(&inner.config.device_id, op_id)
        });
        if is_echo {
            inner.stats.write().echoes_skipped += 1;
            debug!(key = %key, "skipping echo of own write");
            return Ok(());
        }

        let _guard = inner.cache.lock_key(key).await;
        let local = inner.cache.get(key).await;
        let merged =
            merge_with_policy(local.as_deref(), Some(&remote.records[..]), inner.policy()).records;
        let changed = match &local {
            Some(local) => !same_snapshot(local, &merged),
            None => !merged.is_empty(),
        };
        if !changed {
            return Ok(());
        }

        inner.cache.set(key, merged).await;
        inner.stats.write().pushes_applied += 1;
        debug!(key = %key, "applied live push");
        inner.events.emit(SyncEvent::data_updated(vec![key.clone()]));
        Ok(())
    }
}
