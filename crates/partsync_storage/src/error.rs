//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write would push the store past its quota.
    #[error("quota exceeded: {needed} bytes needed, {quota} bytes allowed")]
    QuotaExceeded {
        /// Bytes the store would hold after the write.
        needed: u64,
        /// Configured quota.
        quota: u64,
    },

    /// A key cannot be stored.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

impl StorageError {
    /// Returns true if the failure came from the quota check.
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}
