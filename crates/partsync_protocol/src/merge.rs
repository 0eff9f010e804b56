//! Last-write-wins reconciliation of two versions of a collection.
//!
//! The merge engine is the single rule every sync path goes through: bulk
//! pulls, live pushes and offline tooling all resolve records the same
//! way, which is what makes their interleavings converge.

use crate::conflict::{Conflict, ConflictPolicy, ConflictResolution};
use crate::record::Record;
use std::collections::HashMap;

/// Counters describing how a merge resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Records whose surviving version came from the remote side.
    pub from_remote: usize,
    /// Records whose surviving version came from the local side.
    pub from_local: usize,
    /// Local records with no remote counterpart.
    pub local_only: usize,
    /// Id-less records dropped from either input.
    pub dropped: usize,
    /// Shared ids whose versions differed.
    pub conflicts: Vec<Conflict>,
}

/// Result of [`merge_with_policy`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// The merged collection.
    pub records: Vec<Record>,
    /// How the merge resolved.
    pub report: MergeReport,
}

/// Merges a local and a remote version of a collection.
///
/// Absent inputs are treated as empty. Records without an id are dropped.
/// For an id present on both sides the version with the strictly greater
/// `updatedAt` survives; on a tie the remote version wins.
///
/// The output holds the union of ids. Remote records come first in remote
/// order, followed by local-only records in local order; callers must not
/// rely on that order.
///
/// # Example
///
/// ```rust
/// use partsync_protocol::{merge, Record};
///
/// let local = vec![Record::with_id("1").with("v", "a").touched(100)];
/// let remote = vec![Record::with_id("1").with("v", "b").touched(200)];
///
/// let merged = merge(Some(&local[..]), Some(&remote[..]));
/// assert_eq!(merged, remote);
/// ```
pub fn merge(local: Option<&[Record]>, remote: Option<&[Record]>) -> Vec<Record> {
    merge_with_policy(local, remote, ConflictPolicy::LastWriteWins).records
}

/// Merges two versions of a collection under an explicit conflict policy.
pub fn merge_with_policy(
    local: Option<&[Record]>,
    remote: Option<&[Record]>,
    policy: ConflictPolicy,
) -> MergeOutcome {
    let mut report = MergeReport::default();

    let (remote_order, mut remote_map) = index_by_id(remote.unwrap_or_default(), &mut report);
    let (local_order, mut local_map) = index_by_id(local.unwrap_or_default(), &mut report);

    let mut records = Vec::with_capacity(remote_order.len() + local_order.len());

    for id in &remote_order {
        let Some(remote) = remote_map.remove(id) else {
            continue;
        };
        match local_map.remove(id) {
            None => {
                report.from_remote += 1;
                records.push(remote);
            }
            Some(local) if local == remote => {
                report.from_remote += 1;
                records.push(remote);
            }
            Some(local) => {
                let resolution = policy.resolve(&local, &remote);
                report.conflicts.push(Conflict {
                    id: id.clone(),
                    local_updated_at: local.updated_at(),
                    remote_updated_at: remote.updated_at(),
                    resolution,
                });
                match resolution {
                    ConflictResolution::KeepLocal => {
                        report.from_local += 1;
                        records.push(local);
                    }
                    ConflictResolution::AcceptRemote => {
                        report.from_remote += 1;
                        records.push(remote);
                    }
                }
            }
        }
    }

    for id in &local_order {
        if let Some(local) = local_map.remove(id) {
            report.from_local += 1;
            report.local_only += 1;
            records.push(local);
        }
    }

    MergeOutcome { records, report }
}

/// Indexes one side by id, dropping id-less records.
///
/// Duplicate ids within one side collapse to the newest copy; on equal
/// timestamps the later entry wins.
fn index_by_id(
    records: &[Record],
    report: &mut MergeReport,
) -> (Vec<String>, HashMap<String, Record>) {
    let mut order = Vec::with_capacity(records.len());
    let mut map: HashMap<String, Record> = HashMap::with_capacity(records.len());

    for record in records {
        let Some(id) = record.id() else {
            report.dropped += 1;
            continue;
        };
        let id = id.into_owned();
        match map.get_mut(&id) {
            Some(existing) => {
                if !existing.is_newer_than(record) {
                    *existing = record.clone();
                }
            }
            None => {
                order.push(id.clone());
                map.insert(id, record.clone());
            }
        }
    }

    (order, map)
}

/// Returns true if `merged` differs from what the remote currently holds.
///
/// Comparison is by id and content, independent of order. A remote holding
/// id-less or duplicated records always needs an update.
pub fn needs_remote_update(remote: Option<&[Record]>, merged: &[Record]) -> bool {
    let remote = remote.unwrap_or_default();
    if remote.len() != merged.len() {
        return true;
    }

    let mut by_id: HashMap<String, &Record> = HashMap::with_capacity(remote.len());
    for record in remote {
        match record.id() {
            Some(id) => {
                if by_id.insert(id.into_owned(), record).is_some() {
                    return true;
                }
            }
            None => return true,
        }
    }

    merged.iter().any(|record| match record.id() {
        Some(id) => by_id.get(&*id).map_or(true, |remote| *remote != record),
        None => true,
    })
}

/// Returns true if two snapshots hold the same records, ignoring order.
pub fn same_snapshot(a: &[Record], b: &[Record]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if a.iter().chain(b.iter()).any(|r| !r.has_id()) {
        return a == b;
    }
    let by_id: HashMap<_, _> = b
        .iter()
        .filter_map(|r| r.id().map(|id| (id.into_owned(), r)))
        .collect();
    if by_id.len() != b.len() {
        return a == b;
    }
    a.iter().all(|record| {
        record
            .id()
            .and_then(|id| by_id.get(&*id))
            .is_some_and(|other| *other == record)
    })
}
