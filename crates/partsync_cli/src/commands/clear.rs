//! Clear command implementation.

use super::open_existing;
use partsync_storage::DurableStore;
use std::path::Path;
use tracing::info;

/// Runs the clear command.
pub fn run(path: &Path, key: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    info!("Clearing cache at {:?}", path);

    let store = open_existing(path)?;
    let removed = clear(&store, key)?;

    println!("✓ Removed {} snapshot(s)", removed.len());
    for key in &removed {
        println!("  {}", key);
    }
    Ok(())
}

/// Removes the snapshot under `key`, or every snapshot when `key` is `None`.
///
/// Returns the removed keys. Clearing a key that is not cached is not an
/// error.
pub fn clear(
    store: &dyn DurableStore,
    key: Option<&str>,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let keys = match key {
        Some(key) => vec![key.to_string()],
        None => store.keys()?,
    };

    let mut removed = Vec::new();
    for key in keys {
        if store.remove(&key)? {
            removed.push(key);
        }
    }
    Ok(removed)
}
