//! Merge command implementation.

use partsync_protocol::{merge_with_policy, ConflictPolicy, MergeOutcome, RemoteSnapshot};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

/// Runs the merge command, printing the merged records as JSON.
pub fn run(local_path: &Path, remote_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let local = read_json(local_path)?;
    let remote = read_json(remote_path)?;

    let outcome = merge_values(&local, &remote);
    let report = &outcome.report;
    info!(
        from_remote = report.from_remote,
        from_local = report.from_local,
        local_only = report.local_only,
        dropped = report.dropped,
        "merged"
    );

    println!("{}", serde_json::to_string_pretty(&outcome.records)?);
    Ok(())
}

/// Merges two collection values with last-write-wins.
///
/// Each side may be a bare array, an id-keyed object or a remote envelope.
pub fn merge_values(local: &Value, remote: &Value) -> MergeOutcome {
    let local = RemoteSnapshot::decode(Some(local));
    let remote = RemoteSnapshot::decode(Some(remote));
    merge_with_policy(
        Some(&local.records[..]),
        Some(&remote.records[..]),
        ConflictPolicy::LastWriteWins,
    )
}

fn read_json(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&text)?)
}
