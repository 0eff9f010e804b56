//! Error types for the sync engine.

use partsync_protocol::ProtocolError;
use partsync_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store did not become ready in time.
    #[error("cloud not ready after {0:?}")]
    ReadinessTimeout(Duration),

    /// Reading a remote path failed.
    #[error("remote read failed at {path}: {message}")]
    RemoteRead {
        /// Remote path.
        path: String,
        /// Error message.
        message: String,
    },

    /// Writing a remote path failed.
    #[error("remote write failed at {path}: {message}")]
    RemoteWrite {
        /// Remote path.
        path: String,
        /// Error message.
        message: String,
    },

    /// Installing or running a live listener failed.
    #[error("subscription error for {key}: {message}")]
    Subscription {
        /// Collection key.
        key: String,
        /// Error message.
        message: String,
    },

    /// Not connected to the remote store.
    #[error("not connected to remote store")]
    NotConnected,

    /// The remote session is not authenticated.
    #[error("not authenticated with remote store")]
    NotAuthenticated,

    /// Local durable storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Invalid record or key data.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration rejected during validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Creates a remote read error.
    pub fn remote_read(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a remote write error.
    pub fn remote_write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteWrite {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a subscription error.
    pub fn subscription(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ReadinessTimeout(_)
                | SyncError::RemoteRead { .. }
                | SyncError::RemoteWrite { .. }
                | SyncError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::ReadinessTimeout(Duration::from_secs(10)).is_retryable());
        assert!(SyncError::remote_read("data/users", "offline").is_retryable());
        assert!(SyncError::remote_write("data/users", "denied").is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::NotAuthenticated.is_retryable());
        assert!(!SyncError::InvalidConfig("no collections".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to remote store");

        let err = SyncError::remote_write("data/parts", "permission denied");
        assert!(err.to_string().contains("data/parts"));
        assert!(err.to_string().contains("permission denied"));

        let err = SyncError::ReadinessTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "cloud not ready after 10s");
    }

    #[test]
    fn protocol_errors_convert() {
        let err: SyncError = ProtocolError::InvalidKey(String::new()).into();
        assert!(matches!(err, SyncError::Protocol(_)));
    }
}
