//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or decoding protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A collection key is empty or otherwise unusable as a remote path.
    #[error("invalid collection key: {0:?}")]
    InvalidKey(String),

    /// Unknown sync reason or status name.
    #[error("unknown {kind}: {value:?}")]
    UnknownVariant {
        /// What was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::InvalidKey(String::new());
        assert_eq!(err.to_string(), "invalid collection key: \"\"");

        let err = ProtocolError::UnknownVariant {
            kind: "sync reason",
            value: "later".into(),
        };
        assert!(err.to_string().contains("sync reason"));
        assert!(err.to_string().contains("later"));
    }
}
