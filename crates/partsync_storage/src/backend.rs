//! Durable store trait and shared configuration.

use crate::error::{StorageError, StorageResult};

/// Default quota, matching a typical browser origin allowance.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// A per-device key/value store.
///
/// Stores are **opaque byte stores**. They do not interpret the values they
/// hold; the sync layer owns the encoding of cached snapshots.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `put` for a key
/// - A failed `put` leaves the previous value in place
/// - `usage_bytes` never exceeds the configured quota
/// - Stores must be `Send + Sync`; they are shared with blocking worker threads
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
/// - [`super::NullStore`] - For online-only deployments
pub trait DurableStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The write would exceed the quota
    /// - An I/O error occurs
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Returns true if a value was present.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Lists stored keys in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the key listing cannot be read.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Returns the bytes currently held, counting keys and values.
    fn usage_bytes(&self) -> u64;

    /// Returns the configured quota, if any.
    fn quota_bytes(&self) -> Option<u64>;

    /// Returns true if writes are actually persisted.
    fn is_durable(&self) -> bool {
        true
    }
}

/// Configuration shared by the persistent stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Upper bound on stored bytes. `None` disables the check.
    pub quota_bytes: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            quota_bytes: Some(DEFAULT_QUOTA_BYTES),
        }
    }
}

impl StoreConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the quota.
    #[must_use]
    pub fn with_quota_bytes(mut self, quota: u64) -> Self {
        self.quota_bytes = Some(quota);
        self
    }

    /// Removes the quota.
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.quota_bytes = None;
        self
    }

    /// Checks a write that changes usage from `current` by replacing
    /// `old_entry` bytes with `new_entry` bytes.
    pub(crate) fn check_quota(
        &self,
        current: u64,
        old_entry: u64,
        new_entry: u64,
    ) -> StorageResult<()> {
        let Some(quota) = self.quota_bytes else {
            return Ok(());
        };
        let needed = current.saturating_sub(old_entry).saturating_add(new_entry);
        if needed > quota {
            return Err(StorageError::QuotaExceeded { needed, quota });
        }
        Ok(())
    }
}

/// Bytes an entry counts against the quota.
pub(crate) fn entry_size(key: &str, value_len: usize) -> u64 {
    (key.len() + value_len) as u64
}

pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quota() {
        assert_eq!(StoreConfig::default().quota_bytes, Some(5 * 1024 * 1024));
        assert_eq!(StoreConfig::new().unbounded().quota_bytes, None);
    }

    #[test]
    fn quota_accounts_for_replacement() {
        let config = StoreConfig::new().with_quota_bytes(10);
        assert!(config.check_quota(8, 0, 2).is_ok());
        assert!(config.check_quota(8, 0, 3).is_err());
        // replacing a 5-byte entry with a 7-byte one
        assert!(config.check_quota(8, 5, 7).is_ok());
    }

    #[test]
    fn unbounded_never_fails() {
        let config = StoreConfig::new().unbounded();
        assert!(config.check_quota(u64::MAX, 0, u64::MAX).is_ok());
    }
}
