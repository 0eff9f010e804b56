//! Import command implementation.

use super::export::Backup;
use super::read_snapshot;
use partsync_engine::PersistedSnapshot;
use partsync_protocol::{merge, CollectionKey};
use partsync_storage::{DurableStore, FileStore};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Outcome of an import.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Keys written without a previous snapshot, or replaced with `--force`.
    pub written: usize,
    /// Keys merged into an existing snapshot.
    pub merged: usize,
}

/// Runs the import command.
pub fn run(path: &Path, input_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Importing {:?} into {:?}", input_path, path);

    let backup: Backup = serde_json::from_slice(&fs::read(input_path)?)?;
    let store = FileStore::open(path)?;
    let stats = import(&store, backup, force)?;

    println!("✓ Import finished");
    println!("  Path: {:?}", path);
    println!("  Written: {}", stats.written);
    println!("  Merged: {}", stats.merged);

    Ok(())
}

/// Stores every snapshot of `backup`.
///
/// A snapshot already cached under the same key is merged with the
/// imported one, newest version per record winning, unless `force` is set.
/// All keys are validated before anything is written.
pub fn import(
    store: &dyn DurableStore,
    backup: Backup,
    force: bool,
) -> Result<ImportStats, Box<dyn std::error::Error>> {
    for key in backup.keys() {
        CollectionKey::new(key.as_str())?;
    }

    let mut stats = ImportStats::default();
    for (key, imported) in backup {
        let existing = if force {
            None
        } else {
            read_snapshot(store, &key)?
        };

        let snapshot = match existing {
            Some(existing) => {
                debug!(key = %key, "merging with cached snapshot");
                stats.merged += 1;
                let records = merge(Some(&existing.records[..]), Some(&imported.records[..]));
                PersistedSnapshot {
                    records,
                    updated_at: existing.updated_at.max(imported.updated_at),
                }
            }
            None => {
                stats.written += 1;
                imported
            }
        };
        store.put(&key, &snapshot.encode()?)?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use partsync_protocol::Record;
    use partsync_storage::InMemoryStore;
    use serde_json::json;

    fn snapshot(records: Vec<Record>, updated_at: i64) -> PersistedSnapshot {
        PersistedSnapshot {
            records,
            updated_at,
        }
    }

    fn cached(store: &InMemoryStore, key: &str) -> PersistedSnapshot {
        read_snapshot(store, key).unwrap().unwrap()
    }

    #[test]
    fn merges_with_existing_snapshot() {
        let store = InMemoryStore::new();
        let existing = snapshot(
            vec![
                Record::with_id("1").with("v", "cached").touched(300),
                Record::with_id("2").touched(1),
            ],
            10,
        );
        store.put("users", &existing.encode().unwrap()).unwrap();

        let mut backup = Backup::new();
        backup.insert(
            "users".into(),
            snapshot(
                vec![
                    Record::with_id("1").with("v", "backup").touched(100),
                    Record::with_id("3").touched(1),
                ],
                20,
            ),
        );
        backup.insert("parts".into(), snapshot(vec![Record::with_id("p1")], 5));

        let stats = import(&store, backup, false).unwrap();
        assert_eq!(stats, ImportStats { written: 1, merged: 1 });

        let users = cached(&store, "users");
        assert_eq!(users.records.len(), 3);
        assert_eq!(users.updated_at, 20);
        let first = users
            .records
            .iter()
            .find(|r| r.get("id") == Some(&json!("1")))
            .unwrap();
        assert_eq!(first.get("v"), Some(&json!("cached")));
        assert_eq!(cached(&store, "parts").records.len(), 1);
    }

    #[test]
    fn force_replaces_existing_snapshot() {
        let store = InMemoryStore::new();
        let existing = snapshot(vec![Record::with_id("1"), Record::with_id("2")], 10);
        store.put("users", &existing.encode().unwrap()).unwrap();

        let mut backup = Backup::new();
        backup.insert("users".into(), snapshot(vec![Record::with_id("9")], 1));

        let stats = import(&store, backup, true).unwrap();
        assert_eq!(stats, ImportStats { written: 1, merged: 0 });
        assert_eq!(cached(&store, "users").records, vec![Record::with_id("9")]);
    }

    #[test]
    fn invalid_key_writes_nothing() {
        let store = InMemoryStore::new();
        let mut backup = Backup::new();
        backup.insert("".into(), snapshot(vec![], 1));
        backup.insert("users".into(), snapshot(vec![], 1));

        assert!(import(&store, backup, false).is_err());
        assert!(store.is_empty());
    }
}
