//! # partsync Storage
//!
//! Durable per-device key/value stores backing the local cache.
//!
//! Stores are **opaque byte stores** - they do not interpret the data they
//! hold. The sync engine decides how cached snapshots are encoded.
//!
//! ## Design Principles
//!
//! - Stores are simple key/value maps (get, put, remove, keys)
//! - Every persistent store enforces a byte quota
//! - Must be `Send + Sync`; writes run on blocking worker threads
//! - A failed write never clobbers the previous value
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral use
//! - [`FileStore`] - One file per key in a directory
//! - [`NullStore`] - Online-only mode; writes succeed without I/O
//!
//! ## Example
//!
//! ```rust
//! use partsync_storage::{DurableStore, InMemoryStore, StoreConfig};
//!
//! let store = InMemoryStore::with_config(StoreConfig::new().with_quota_bytes(64));
//! store.put("parts", b"[]").unwrap();
//! assert!(store.put("parts", &[0u8; 128]).unwrap_err().is_quota());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod null;

pub use backend::{DurableStore, StoreConfig, DEFAULT_QUOTA_BYTES};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use null::NullStore;
