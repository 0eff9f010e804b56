//! Collection keys and remote path handling.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters a realtime-database path segment may not contain.
const FORBIDDEN: [char; 6] = ['.', '#', '$', '[', ']', '/'];

/// Name of a tracked collection ("users", "solicitations", ...).
///
/// Keys are non-empty. Their remote path segment is the sanitized form
/// (see [`sanitize_key`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionKey(String);

impl CollectionKey {
    /// User accounts.
    pub const USERS: &'static str = "users";
    /// Field technicians.
    pub const TECHNICIANS: &'static str = "technicians";
    /// Parts suppliers.
    pub const SUPPLIERS: &'static str = "suppliers";
    /// Parts catalog.
    pub const PARTS: &'static str = "parts";
    /// Parts requests awaiting or past approval.
    pub const SOLICITATIONS: &'static str = "solicitations";
    /// Export metadata log.
    pub const EXPORT_LOG: &'static str = "export_log";
    /// Stored export artifacts.
    pub const EXPORT_FILES: &'static str = "export_files";

    /// Creates a key, rejecting empty names.
    pub fn new(name: impl Into<String>) -> ProtocolResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProtocolError::InvalidKey(name));
        }
        Ok(Self(name))
    }

    /// The collections an application tracks unless configured otherwise.
    pub fn defaults() -> Vec<Self> {
        [
            Self::USERS,
            Self::TECHNICIANS,
            Self::SUPPLIERS,
            Self::PARTS,
            Self::SOLICITATIONS,
            Self::EXPORT_LOG,
            Self::EXPORT_FILES,
        ]
        .into_iter()
        .map(|name| Self(name.to_string()))
        .collect()
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the path segment used on the remote store.
    pub fn sanitized(&self) -> String {
        sanitize_key(&self.0)
    }

    /// Returns the full remote path under `root`.
    pub fn remote_path(&self, root: &str) -> String {
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            self.sanitized()
        } else {
            format!("{}/{}", root, self.sanitized())
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CollectionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CollectionKey {
    type Error = ProtocolError;

    fn try_from(value: String) -> ProtocolResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for CollectionKey {
    type Error = ProtocolError;

    fn try_from(value: &str) -> ProtocolResult<Self> {
        Self::new(value)
    }
}

impl From<CollectionKey> for String {
    fn from(key: CollectionKey) -> Self {
        key.0
    }
}

/// Replaces characters that are illegal in a realtime-database path segment.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_keys() {
        assert!(CollectionKey::new("").is_err());
        assert!(CollectionKey::new("   ").is_err());
        assert!(CollectionKey::new("users").is_ok());
    }

    #[test]
    fn sanitizes_forbidden_characters() {
        assert_eq!(sanitize_key("users"), "users");
        assert_eq!(sanitize_key("a.b#c$d[e]f/g"), "a_b_c_d_e_f_g");
    }

    #[test]
    fn remote_paths() {
        let key = CollectionKey::new("export.files").unwrap();
        assert_eq!(key.remote_path("data"), "data/export_files");
        assert_eq!(key.remote_path("data/"), "data/export_files");
        assert_eq!(key.remote_path(""), "export_files");
    }

    #[test]
    fn defaults_cover_application_collections() {
        let keys = CollectionKey::defaults();
        assert_eq!(keys.len(), 7);
        assert!(keys.iter().any(|k| k.as_str() == CollectionKey::USERS));
        assert!(keys.iter().any(|k| k.as_str() == CollectionKey::SOLICITATIONS));
    }

    #[test]
    fn serde_validates() {
        let key: CollectionKey = serde_json::from_str("\"parts\"").unwrap();
        assert_eq!(key.as_str(), "parts");
        assert!(serde_json::from_str::<CollectionKey>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"parts\"");
    }
}
