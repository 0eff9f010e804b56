//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use partsync_protocol::CollectionKey;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default wait for cloud readiness.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default quiet period for [`crate::SyncEngine::schedule_sync`].
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Whether the local cache mirrors snapshots into a durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceMode {
    /// Snapshots are persisted for warm reload.
    #[default]
    Durable,
    /// Local durable writes report success without I/O.
    OnlineOnly,
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Device ID, recorded on every remote write.
    pub device_id: String,
    /// Tracked collections, reconciled in order.
    pub collections: Vec<CollectionKey>,
    /// Upper bound on the readiness wait.
    pub ready_timeout: Duration,
    /// Quiet period for scheduled syncs.
    pub debounce: Duration,
    /// Local persistence mode.
    pub persistence: PersistenceMode,
    /// Remote path prefix for collection envelopes.
    pub remote_root: String,
    /// Buffer size of the event channel.
    pub event_capacity: usize,
}

impl SyncConfig {
    /// Creates a new sync configuration with default collections.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            collections: CollectionKey::defaults(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            debounce: DEFAULT_DEBOUNCE,
            persistence: PersistenceMode::Durable,
            remote_root: "data".to_string(),
            event_capacity: 64,
        }
    }

    /// Generates a fresh device id of the form `device_<uuid>`.
    pub fn generate_device_id() -> String {
        format!("device_{}", uuid::Uuid::new_v4().simple())
    }

    /// Sets the tracked collections.
    pub fn with_collections(mut self, collections: Vec<CollectionKey>) -> Self {
        self.collections = collections;
        self
    }

    /// Sets the readiness timeout.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Sets the debounce period.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the persistence mode.
    pub fn with_persistence(mut self, persistence: PersistenceMode) -> Self {
        self.persistence = persistence;
        self
    }

    /// Shorthand for [`PersistenceMode::OnlineOnly`].
    pub fn online_only(self) -> Self {
        self.with_persistence(PersistenceMode::OnlineOnly)
    }

    /// Sets the remote path prefix.
    pub fn with_remote_root(mut self, root: impl Into<String>) -> Self {
        self.remote_root = root.into();
        self
    }

    /// Sets the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device_id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("device id is empty".into()));
        }
        if self.collections.is_empty() {
            return Err(SyncError::InvalidConfig("no collections configured".into()));
        }
        let mut seen = HashSet::new();
        for key in &self.collections {
            if !seen.insert(key.sanitized()) {
                return Err(SyncError::InvalidConfig(format!(
                    "duplicate collection {}",
                    key
                )));
            }
        }
        if self.ready_timeout.is_zero() {
            return Err(SyncError::InvalidConfig("ready timeout is zero".into()));
        }
        if self.event_capacity == 0 {
            return Err(SyncError::InvalidConfig("event capacity is zero".into()));
        }
        Ok(())
    }

    /// Parses a JSON configuration document.
    ///
    /// ```json
    /// { "deviceId": "device_1", "collections": ["users", "parts"],
    ///   "readyTimeoutMs": 10000, "debounceMs": 2000,
    ///   "onlineOnly": false, "remoteRoot": "data" }
    /// ```
    ///
    /// Every field is optional; a missing `deviceId` is generated.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let file: ConfigFile = serde_json::from_str(json)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        let device_id = file.device_id.unwrap_or_else(Self::generate_device_id);
        let mut config = Self::new(device_id);

        if let Some(collections) = file.collections {
            config.collections = collections
                .into_iter()
                .map(CollectionKey::new)
                .collect::<Result<_, _>>()?;
        }
        if let Some(ms) = file.ready_timeout_ms {
            config.ready_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.debounce_ms {
            config.debounce = Duration::from_millis(ms);
        }
        if file.online_only {
            config.persistence = PersistenceMode::OnlineOnly;
        }
        if let Some(root) = file.remote_root {
            config.remote_root = root;
        }
        if let Some(capacity) = file.event_capacity {
            config.event_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: &Path) -> SyncResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SyncError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Self::generate_device_id())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    device_id: Option<String>,
    collections: Option<Vec<String>>,
    ready_timeout_ms: Option<u64>,
    debounce_ms: Option<u64>,
    #[serde(default)]
    online_only: bool,
    remote_root: Option<String>,
    event_capacity: Option<usize>,
}
