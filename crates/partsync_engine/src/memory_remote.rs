//! In-memory realtime database for testing.

use crate::error::{SyncError, SyncResult};
use crate::remote::{ListenerId, RemoteStore, ValueCallback};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// An in-process realtime database.
///
/// Values live in a path map. A new listener immediately receives the
/// current value at its path. Listeners then fire synchronously, in
/// install order, on every write to their exact path, including writes
/// made by the listening device itself.
///
/// Connectivity, authentication, per-path failures and latency can be
/// driven from tests.
pub struct MemoryRemoteStore {
    values: RwLock<HashMap<String, Value>>,
    listeners: RwLock<Vec<(ListenerId, String, ValueCallback)>>,
    next_listener: AtomicU64,
    authenticated: watch::Sender<bool>,
    connected: watch::Sender<bool>,
    failing_reads: RwLock<HashSet<String>>,
    failing_writes: RwLock<HashSet<String>>,
    latency: RwLock<Option<Duration>>,
    reads: AtomicU64,
    writes: AtomicU64,
    disposals: AtomicU64,
}

impl MemoryRemoteStore {
    /// Creates an authenticated, connected store.
    pub fn new() -> Self {
        Self::with_state(true, true)
    }

    /// Creates a store that is neither authenticated nor connected.
    pub fn offline() -> Self {
        Self::with_state(false, false)
    }

    fn with_state(authenticated: bool, connected: bool) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            authenticated: watch::Sender::new(authenticated),
            connected: watch::Sender::new(connected),
            failing_reads: RwLock::new(HashSet::new()),
            failing_writes: RwLock::new(HashSet::new()),
            latency: RwLock::new(None),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            disposals: AtomicU64::new(0),
        }
    }

    /// Sets the authentication state.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.send_replace(authenticated);
    }

    /// Sets the connection state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.send_replace(connected);
    }

    /// Makes reads of `path` fail.
    pub fn fail_reads(&self, path: impl Into<String>) {
        self.failing_reads.write().insert(path.into());
    }

    /// Makes writes to `path` fail.
    pub fn fail_writes(&self, path: impl Into<String>) {
        self.failing_writes.write().insert(path.into());
    }

    /// Clears injected failures.
    pub fn clear_failures(&self) {
        self.failing_reads.write().clear();
        self.failing_writes.write().clear();
    }

    /// Delays every read and write by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Stores a value as another device would, notifying listeners.
    pub fn put(&self, path: &str, value: Value) {
        self.values.write().insert(path.to_string(), value.clone());
        self.notify(path, Some(value));
    }

    /// Returns the value stored at `path`.
    pub fn value(&self, path: &str) -> Option<Value> {
        self.values.read().get(path).cloned()
    }

    /// Returns the number of listeners on `path`.
    pub fn listener_count(&self, path: &str) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|(_, p, _)| p == path)
            .count()
    }

    /// Returns the number of installed listeners.
    pub fn total_listeners(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns the number of `read` calls.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Returns the number of `write` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of `dispose` calls.
    pub fn dispose_count(&self) -> u64 {
        self.disposals.load(Ordering::SeqCst)
    }

    fn notify(&self, path: &str, value: Option<Value>) {
        let callbacks: Vec<ValueCallback> = self
            .listeners
            .read()
            .iter()
            .filter(|(_, p, _)| p == path)
            .map(|(_, _, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(value.clone());
        }
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn is_ready(&self) -> bool {
        *self.authenticated.borrow() && *self.connected.borrow()
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn wait_for_cloud_ready(&self, timeout: Duration) -> bool {
        let mut authenticated = self.authenticated.subscribe();
        let mut connected = self.connected.subscribe();
        let ready = async {
            loop {
                let is_authenticated = *authenticated.borrow_and_update();
                let is_connected = *connected.borrow_and_update();
                if is_authenticated && is_connected {
                    return true;
                }
                tokio::select! {
                    changed = authenticated.changed() => if changed.is_err() { return false },
                    changed = connected.changed() => if changed.is_err() { return false },
                }
            }
        };
        tokio::time::timeout(timeout, ready).await.unwrap_or(false)
    }

    async fn read(&self, path: &str) -> SyncResult<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        if self.failing_reads.read().contains(path) {
            return Err(SyncError::remote_read(path, "injected failure"));
        }
        Ok(self.value(path))
    }

    async fn write(&self, path: &str, value: Value) -> SyncResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        if self.failing_writes.read().contains(path) {
            return Err(SyncError::remote_write(path, "injected failure"));
        }
        self.put(path, value);
        Ok(())
    }

    fn on_value_change(&self, path: &str, callback: ValueCallback) -> SyncResult<ListenerId> {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        // holding the value lock keeps a concurrent put from notifying
        // ahead of the initial value
        let values = self.values.read();
        self.listeners
            .write()
            .push((id, path.to_string(), Arc::clone(&callback)));
        callback(values.get(path).cloned());
        Ok(id)
    }

    fn dispose(&self, id: ListenerId) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().retain(|(lid, _, _)| *lid != id);
    }

    fn connection_changes(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn read_write_round_trip() {
        let remote = MemoryRemoteStore::new();
        assert_eq!(remote.read("data/users").await.unwrap(), None);

        remote.write("data/users", json!([1, 2])).await.unwrap();
        assert_eq!(remote.read("data/users").await.unwrap(), Some(json!([1, 2])));
        assert_eq!(remote.read_count(), 2);
        assert_eq!(remote.write_count(), 1);
    }

    #[tokio::test]
    async fn offline_io_fails() {
        let remote = MemoryRemoteStore::new();
        remote.set_connected(false);
        assert!(matches!(
            remote.read("data/users").await,
            Err(SyncError::NotConnected)
        ));
        assert!(remote.write("data/users", json!(1)).await.is_err());
        assert!(remote.value("data/users").is_none());
    }

    #[tokio::test]
    async fn injected_failures() {
        let remote = MemoryRemoteStore::new();
        remote.fail_reads("data/parts");
        remote.fail_writes("data/users");

        assert!(matches!(
            remote.read("data/parts").await,
            Err(SyncError::RemoteRead { .. })
        ));
        assert!(matches!(
            remote.write("data/users", json!(1)).await,
            Err(SyncError::RemoteWrite { .. })
        ));

        remote.clear_failures();
        assert!(remote.read("data/parts").await.is_ok());
    }

    #[test]
    fn listeners_fire_on_their_path() {
        let remote = MemoryRemoteStore::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = remote
            .on_value_change(
                "data/users",
                Arc::new(move |value: Option<Value>| sink.write().push(value)),
            )
            .unwrap();

        remote.put("data/parts", json!(1));
        remote.put("data/users", json!(2));
        assert_eq!(*seen.read(), vec![None, Some(json!(2))]);

        remote.dispose(id);
        remote.put("data/users", json!(3));
        assert_eq!(seen.read().len(), 2);
        assert_eq!(remote.total_listeners(), 0);
    }

    #[test]
    fn new_listener_receives_current_value() {
        let remote = MemoryRemoteStore::new();
        remote.put("data/users", json!([{"id": "u1"}]));
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = Arc::clone(&seen);

        remote
            .on_value_change(
                "data/users",
                Arc::new(move |value: Option<Value>| sink.write().push(value)),
            )
            .unwrap();

        assert_eq!(*seen.read(), vec![Some(json!([{"id": "u1"}]))]);
        assert_eq!(remote.read_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_wait_times_out() {
        let remote = MemoryRemoteStore::offline();
        assert!(!remote.is_ready());
        assert!(!remote.wait_for_cloud_ready(Duration::from_secs(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_wait_sees_login() {
        let remote = Arc::new(MemoryRemoteStore::offline());
        let waiter = {
            let remote = Arc::clone(&remote);
            tokio::spawn(async move { remote.wait_for_cloud_ready(Duration::from_secs(10)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        remote.set_connected(true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        remote.set_authenticated(true);

        assert!(waiter.await.unwrap());
        assert!(remote.is_ready());
    }

    #[tokio::test]
    async fn connection_changes_are_observable() {
        let remote = MemoryRemoteStore::new();
        let mut rx = remote.connection_changes();
        remote.set_connected(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }
}
