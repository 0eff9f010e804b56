//! Inspect command implementation.

use super::{open_existing, read_snapshot};
use partsync_storage::DurableStore;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

/// Cache inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Cache directory.
    pub path: String,
    /// Bytes used by all entries.
    pub usage_bytes: u64,
    /// Storage quota, if any.
    pub quota_bytes: Option<u64>,
    /// Per-collection details.
    pub collections: Vec<CollectionStats>,
}

/// Statistics for a single cached collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection key.
    pub key: String,
    /// Number of records, `None` if the entry could not be decoded.
    pub records: Option<usize>,
    /// When the snapshot was cached, epoch millis.
    pub updated_at: Option<i64>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let result = inspect(&store, path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics for every entry in `store`.
pub fn inspect(
    store: &dyn DurableStore,
    path: &Path,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut collections = Vec::new();
    for key in store.keys()? {
        let stats = match read_snapshot(store, &key) {
            Ok(snapshot) => CollectionStats {
                records: snapshot.as_ref().map(|s| s.records.len()),
                updated_at: snapshot.map(|s| s.updated_at),
                key,
            },
            Err(e) => {
                warn!(key = %key, error = %e, "unreadable entry");
                CollectionStats {
                    key,
                    records: None,
                    updated_at: None,
                }
            }
        };
        collections.push(stats);
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        usage_bytes: store.usage_bytes(),
        quota_bytes: store.quota_bytes(),
        collections,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("partsync Cache Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Used:  {}", format_size(result.usage_bytes));
    match result.quota_bytes {
        Some(quota) => println!("  Quota: {}", format_size(quota)),
        None => println!("  Quota: unbounded"),
    }
    println!();
    println!("Collections:");
    if result.collections.is_empty() {
        println!("  (none)");
    }
    for col in &result.collections {
        match (col.records, col.updated_at) {
            (Some(records), Some(updated_at)) => {
                println!("  {} - {} records, cached at {}", col.key, records, updated_at)
            }
            _ => println!("  {} - unreadable", col.key),
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
