//! Store that discards everything.

use crate::backend::DurableStore;
use crate::error::StorageResult;

/// A store that accepts writes without performing any I/O.
///
/// Used when a deployment runs online-only: every write reports success and
/// every read finds nothing, so the remote store stays the only copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl NullStore {
    /// Creates a null store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DurableStore for NullStore {
    fn get(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn put(&self, _key: &str, _value: &[u8]) -> StorageResult<()> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> StorageResult<bool> {
        Ok(false)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn usage_bytes(&self) -> u64 {
        0
    }

    fn quota_bytes(&self) -> Option<u64> {
        None
    }

    fn is_durable(&self) -> bool {
        false
    }
}
