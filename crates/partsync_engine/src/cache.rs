//! Session cache with an optional durable mirror.

use crate::config::PersistenceMode;
use partsync_protocol::{CollectionKey, Record};
use partsync_storage::{DurableStore, InMemoryStore, NullStore};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Current wall-clock time in epoch millis.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// What the durable mirror holds for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    /// Last-known records.
    pub records: Vec<Record>,
    /// When the snapshot was cached, epoch millis.
    pub updated_at: i64,
}

impl PersistedSnapshot {
    /// Decodes a stored entry.
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Encodes the snapshot for storage.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// In-process snapshots of every tracked collection.
///
/// Reads are served from memory. Writes update memory first and then
/// mirror the snapshot into the durable store on a blocking worker thread;
/// mirror failures are logged and never surfaced.
///
/// Each key also has an async lock that callers hold across a whole
/// read-merge-write cycle.
pub struct LocalCache {
    session: RwLock<HashMap<CollectionKey, PersistedSnapshot>>,
    store: Arc<dyn DurableStore>,
    locks: Mutex<HashMap<CollectionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl LocalCache {
    /// Creates a cache mirrored into `store`.
    ///
    /// In [`PersistenceMode::OnlineOnly`] the store is replaced by a
    /// [`NullStore`].
    pub fn new(store: Arc<dyn DurableStore>, persistence: PersistenceMode) -> Self {
        let store: Arc<dyn DurableStore> = match persistence {
            PersistenceMode::Durable => store,
            PersistenceMode::OnlineOnly => Arc::new(NullStore::new()),
        };
        Self {
            session: RwLock::new(HashMap::new()),
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a cache backed by an [`InMemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), PersistenceMode::Durable)
    }

    /// Returns true if snapshots are actually persisted.
    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }

    /// Returns the durable store.
    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Returns the in-memory snapshot for `key` without any I/O.
    pub fn session(&self, key: &CollectionKey) -> Option<Vec<Record>> {
        self.session.read().get(key).map(|s| s.records.clone())
    }

    /// Returns when the in-memory snapshot for `key` was last written.
    pub fn last_updated(&self, key: &CollectionKey) -> Option<i64> {
        self.session.read().get(key).map(|s| s.updated_at)
    }

    /// Returns the keys with an in-memory snapshot.
    pub fn keys(&self) -> Vec<CollectionKey> {
        let mut keys: Vec<_> = self.session.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the snapshot for `key`, loading it from the durable store on
    /// a miss.
    pub async fn get(&self, key: &CollectionKey) -> Option<Vec<Record>> {
        if let Some(records) = self.session(key) {
            return Some(records);
        }
        let snapshot = self.load(key).await?;
        let records = snapshot.records.clone();
        self.session
            .write()
            .entry(key.clone())
            .or_insert(snapshot);
        Some(records)
    }

    /// Replaces the snapshot for `key` and mirrors it.
    pub async fn set(&self, key: &CollectionKey, records: Vec<Record>) {
        let snapshot = PersistedSnapshot {
            records,
            updated_at: now_ms(),
        };
        self.session.write().insert(key.clone(), snapshot.clone());
        self.persist(key, &snapshot).await;
    }

    /// Loads durable snapshots for `keys` that have no in-memory copy yet.
    ///
    /// Returns the keys that were loaded.
    pub async fn warm(&self, keys: &[CollectionKey]) -> Vec<CollectionKey> {
        let mut loaded = Vec::new();
        for key in keys {
            if self.session.read().contains_key(key) {
                continue;
            }
            if let Some(snapshot) = self.load(key).await {
                debug!(key = %key, records = snapshot.records.len(), "warmed from durable store");
                self.session
                    .write()
                    .entry(key.clone())
                    .or_insert(snapshot);
                loaded.push(key.clone());
            }
        }
        loaded
    }

    /// Drops every in-memory snapshot. The durable mirror is untouched.
    pub fn clear_session(&self) {
        self.session.write().clear();
    }

    /// Acquires the read-merge-write lock for `key`.
    pub async fn lock_key(&self, key: &CollectionKey) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    async fn load(&self, key: &CollectionKey) -> Option<PersistedSnapshot> {
        let store = Arc::clone(&self.store);
        let name = key.to_string();
        let bytes = match tokio::task::spawn_blocking(move || store.get(&name)).await {
            Ok(Ok(bytes)) => bytes?,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "durable read failed");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "durable read task failed");
                return None;
            }
        };
        match PersistedSnapshot::decode(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding unreadable cached snapshot");
                None
            }
        }
    }

    async fn persist(&self, key: &CollectionKey, snapshot: &PersistedSnapshot) {
        if !self.store.is_durable() {
            return;
        }
        let bytes = match snapshot.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "snapshot encoding failed");
                return;
            }
        };
        let store = Arc::clone(&self.store);
        let name = key.to_string();
        match tokio::task::spawn_blocking(move || store.put(&name, &bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(key = %key, error = %e, "durable write failed"),
            Err(e) => warn!(key = %key, error = %e, "durable write task failed"),
        }
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("keys", &self.keys())
            .field("durable", &self.is_durable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partsync_storage::StoreConfig;
    use std::time::Duration;

    fn key(name: &str) -> CollectionKey {
        CollectionKey::new(name).unwrap()
    }

    fn records(ids: &[&str]) -> Vec<Record> {
        ids.iter().map(|id| Record::with_id(*id).touched(1)).collect()
    }

    #[tokio::test]
    async fn set_then_session_read() {
        let cache = LocalCache::in_memory();
        assert!(cache.session(&key("users")).is_none());

        cache.set(&key("users"), records(&["1", "2"])).await;
        assert_eq!(cache.session(&key("users")).unwrap().len(), 2);
        assert!(cache.last_updated(&key("users")).is_some());
        assert_eq!(cache.keys(), vec![key("users")]);
    }

    #[tokio::test]
    async fn writes_are_mirrored() {
        let store = Arc::new(InMemoryStore::new());
        let cache = LocalCache::new(store.clone(), PersistenceMode::Durable);
        cache.set(&key("parts"), records(&["p1"])).await;

        let bytes = store.get("parts").unwrap().unwrap();
        let snapshot = PersistedSnapshot::decode(&bytes).unwrap();
        assert_eq!(snapshot.records, records(&["p1"]));
    }

    #[tokio::test]
    async fn get_falls_back_to_durable_store() {
        let store = Arc::new(InMemoryStore::new());
        let snapshot = PersistedSnapshot {
            records: records(&["s1"]),
            updated_at: 5,
        };
        store.put("suppliers", &snapshot.encode().unwrap()).unwrap();

        let cache = LocalCache::new(store, PersistenceMode::Durable);
        assert!(cache.session(&key("suppliers")).is_none());
        assert_eq!(cache.get(&key("suppliers")).await, Some(records(&["s1"])));
        assert!(cache.session(&key("suppliers")).is_some());
        assert_eq!(cache.get(&key("parts")).await, None);
    }

    #[tokio::test]
    async fn online_only_skips_durable_io() {
        let store = Arc::new(InMemoryStore::new());
        let cache = LocalCache::new(store.clone(), PersistenceMode::OnlineOnly);
        assert!(!cache.is_durable());

        cache.set(&key("users"), records(&["1"])).await;
        assert!(store.is_empty());
        assert_eq!(cache.session(&key("users")), Some(records(&["1"])));
    }

    #[tokio::test]
    async fn persist_failures_are_swallowed() {
        let store = Arc::new(InMemoryStore::with_config(StoreConfig::new().with_quota_bytes(4)));
        let cache = LocalCache::new(store.clone(), PersistenceMode::Durable);

        cache.set(&key("users"), records(&["1", "2", "3"])).await;
        assert_eq!(cache.session(&key("users")).unwrap().len(), 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn warm_loads_missing_keys_only() {
        let store = Arc::new(InMemoryStore::new());
        for (name, ids) in [("users", &["u1"][..]), ("parts", &["p1", "p2"][..])] {
            let snapshot = PersistedSnapshot {
                records: records(ids),
                updated_at: 1,
            };
            store.put(name, &snapshot.encode().unwrap()).unwrap();
        }
        store.put("technicians", b"not json").unwrap();

        let cache = LocalCache::new(store, PersistenceMode::Durable);
        cache.set(&key("users"), records(&["fresh"])).await;

        let loaded = cache
            .warm(&[key("users"), key("parts"), key("technicians"), key("solicitations")])
            .await;
        assert_eq!(loaded, vec![key("parts")]);
        assert_eq!(cache.session(&key("users")), Some(records(&["fresh"])));
        assert_eq!(cache.session(&key("parts")).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn key_lock_serializes_writers() {
        let cache = Arc::new(LocalCache::in_memory());
        let guard = cache.lock_key(&key("users")).await;

        let contender = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let _guard = cache.lock_key(&key("users")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // other keys are independent
        let _other = cache.lock_key(&key("parts")).await;

        drop(guard);
        contender.await.unwrap();
    }

    #[test]
    fn clock_is_positive() {
        assert!(now_ms() > 0);
    }
}
