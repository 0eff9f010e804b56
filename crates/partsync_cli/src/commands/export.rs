//! Export command implementation.

use super::{open_existing, read_snapshot};
use partsync_engine::PersistedSnapshot;
use partsync_storage::DurableStore;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Backup file layout: collection key to cached snapshot.
pub type Backup = BTreeMap<String, PersistedSnapshot>;

/// Runs the export command.
pub fn run(
    path: &Path,
    output_path: &Path,
    key: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Exporting cache at {:?}", path);

    let store = open_existing(path)?;
    let backup = export(&store, key)?;
    fs::write(output_path, serde_json::to_vec_pretty(&backup)?)?;

    let records: usize = backup.values().map(|s| s.records.len()).sum();
    println!("✓ Export created successfully");
    println!("  Path: {:?}", output_path);
    println!("  Collections: {}", backup.len());
    println!("  Records: {}", records);

    Ok(())
}

/// Collects the snapshots to export.
///
/// Unreadable entries are skipped, except for an explicitly requested key.
pub fn export(
    store: &dyn DurableStore,
    key: Option<&str>,
) -> Result<Backup, Box<dyn std::error::Error>> {
    let mut backup = Backup::new();

    if let Some(key) = key {
        let snapshot =
            read_snapshot(store, key)?.ok_or_else(|| format!("No snapshot cached for {key}"))?;
        backup.insert(key.to_string(), snapshot);
        return Ok(backup);
    }

    for key in store.keys()? {
        match read_snapshot(store, &key) {
            Ok(Some(snapshot)) => {
                backup.insert(key, snapshot);
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "skipping unreadable entry"),
        }
    }
    Ok(backup)
}
