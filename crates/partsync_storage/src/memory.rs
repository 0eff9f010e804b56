//! In-memory store for testing.

use crate::backend::{entry_size, validate_key, DurableStore, StoreConfig};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory durable store.
///
/// Nothing survives the process, but quota accounting behaves exactly like
/// [`super::FileStore`], which makes this store suitable for:
/// - Unit tests
/// - Integration tests of the sync engine
///
/// # Example
///
/// ```rust
/// use partsync_storage::{DurableStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.put("users", b"[]").unwrap();
/// assert_eq!(store.get("users").unwrap().as_deref(), Some(&b"[]"[..]));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    config: StoreConfig,
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates an empty store with the default quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with `config`.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl DurableStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let mut entries = self.entries.write();
        let current: u64 = entries.iter().map(|(k, v)| entry_size(k, v.len())).sum();
        let old = entries
            .get(key)
            .map_or(0, |v| entry_size(key, v.len()));
        self.config
            .check_quota(current, old, entry_size(key, value.len()))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn usage_bytes(&self) -> u64 {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| entry_size(k, v.len()))
            .sum()
    }

    fn quota_bytes(&self) -> Option<u64> {
        self.config.quota_bytes
    }
}
