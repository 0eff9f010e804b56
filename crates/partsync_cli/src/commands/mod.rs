//! CLI command implementations.

pub mod clear;
pub mod export;
pub mod import;
pub mod inspect;
pub mod merge;

use partsync_engine::PersistedSnapshot;
use partsync_storage::{DurableStore, FileStore};
use std::path::Path;

/// Opens the cache directory at `path`, which must already exist.
pub(crate) fn open_existing(path: &Path) -> Result<FileStore, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No cache found at {:?}", path).into());
    }
    Ok(FileStore::open(path)?)
}

/// Reads and decodes the snapshot stored under `key`.
pub(crate) fn read_snapshot(
    store: &dyn DurableStore,
    key: &str,
) -> Result<Option<PersistedSnapshot>, Box<dyn std::error::Error>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(PersistedSnapshot::decode(&bytes)?)),
        None => Ok(None),
    }
}
