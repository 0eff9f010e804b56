//! # partsync protocol
//!
//! Record model and reconciliation rules shared by every partsync component.
//!
//! This crate provides:
//! - [`Record`] and [`CollectionKey`] for the tracked collections
//! - The last-write-wins merge engine ([`merge`], [`merge_with_policy`])
//! - [`ConflictPolicy`] for resolving records present on both sides
//! - [`RemoteEnvelope`] / [`RemoteSnapshot`], the remote storage layout
//! - [`SyncEvent`], the notifications collaborators react to
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - Records without an id never survive a merge
//! - A shared id resolves to the greater `updatedAt`; ties go to the remote copy
//! - Merging is order-independent for a fixed set of record versions

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod envelope;
mod error;
mod events;
mod key;
mod merge;
mod record;

pub use conflict::{Conflict, ConflictPolicy, ConflictResolution};
pub use envelope::{new_op_id, RemoteEnvelope, RemoteSnapshot};
pub use error::{ProtocolError, ProtocolResult};
pub use events::{SyncEvent, SyncReason, SyncStatus};
pub use key::{sanitize_key, CollectionKey};
pub use merge::{
    merge, merge_with_policy, needs_remote_update, same_snapshot, MergeOutcome, MergeReport,
};
pub use record::{decode_records, Record};
