//! # partsync engine
//!
//! Offline-first synchronization between a local cache and a remote
//! realtime store.
//!
//! This crate provides:
//! - Sync state machine (idle → waiting for cloud → reconciling → subscribing → synced)
//! - Readiness gating with a bounded wait
//! - Per-collection pull, merge, push and commit
//! - Live listeners with at most one per collection and echo suppression
//! - A two-tier local cache (session memory over a [`partsync_storage::DurableStore`])
//! - Debounced and reconnect-triggered syncs
//! - [`MemoryRemoteStore`], an in-process remote for tests and tooling
//!
//! ## Architecture
//!
//! A sync session is **pull-merge-push** per collection:
//! 1. Wait until the remote is connected and authenticated
//! 2. Read the remote envelope and merge it with the cached snapshot
//! 3. Write the merged snapshot back only if the remote is missing records
//!    or holds older versions
//! 4. Commit the merged snapshot to the cache
//!
//! Afterwards every collection gets a live listener that merges pushed
//! values into the cache.
//!
//! ## Key Invariants
//!
//! - At most one session runs at a time; concurrent callers share its outcome
//! - No remote read or write happens before readiness is confirmed
//! - Each session emits exactly one `data:updated` event
//! - A collection never has more than one live listener
//! - A failed collection does not stop the others

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod events;
mod memory_remote;
mod remote;
mod scheduler;
mod state;
mod subscription;

pub use cache::{LocalCache, PersistedSnapshot};
pub use config::{PersistenceMode, SyncConfig, DEFAULT_DEBOUNCE, DEFAULT_READY_TIMEOUT};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, NoopObserver, SyncObserver};
pub use memory_remote::MemoryRemoteStore;
pub use remote::{ListenerId, RemoteStore, Subscription, ValueCallback};
pub use scheduler::ConnectivityWatch;
pub use state::{SyncEngine, SyncState, SyncStats};
pub use subscription::{ChangeHandler, SubscriptionManager};
