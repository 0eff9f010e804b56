//! Notifications emitted to collaborators.

use crate::error::ProtocolError;
use crate::key::CollectionKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Why a sync session was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncReason {
    /// The user asked for it.
    Manual,
    /// A reconnect or scheduled trigger.
    Auto,
    /// Application start.
    Startup,
}

impl SyncReason {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncReason::Manual => "manual",
            SyncReason::Auto => "auto",
            SyncReason::Startup => "startup",
        }
    }

    /// Returns true for user-initiated sessions.
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, SyncReason::Manual)
    }
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncReason {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SyncReason::Manual),
            "auto" => Ok(SyncReason::Auto),
            "startup" => Ok(SyncReason::Startup),
            other => Err(ProtocolError::UnknownVariant {
                kind: "sync reason",
                value: other.to_string(),
            }),
        }
    }
}

/// Phase reported by a `sync:status` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// A session started.
    Start,
    /// A session completed successfully.
    Done,
    /// A session failed; previously loaded data stays usable.
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStatus::Start => "start",
            SyncStatus::Done => "done",
            SyncStatus::Error => "error",
        })
    }
}

/// An event collaborators may react to.
///
/// These are the only two notifications the sync layer publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// `sync:status` — session progress.
    #[serde(rename = "sync:status")]
    Status {
        /// Session phase.
        status: SyncStatus,
        /// Session trigger.
        reason: SyncReason,
        /// Failure description for [`SyncStatus::Error`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// `data:updated` — collections whose local snapshot changed.
    #[serde(rename = "data:updated")]
    DataUpdated {
        /// Changed collection keys.
        keys: Vec<CollectionKey>,
    },
}

impl SyncEvent {
    /// Creates a status event.
    pub fn status(status: SyncStatus, reason: SyncReason) -> Self {
        SyncEvent::Status {
            status,
            reason,
            error: None,
        }
    }

    /// Creates an error status event.
    pub fn failed(reason: SyncReason, error: impl Into<String>) -> Self {
        SyncEvent::Status {
            status: SyncStatus::Error,
            reason,
            error: Some(error.into()),
        }
    }

    /// Creates a data-updated event.
    pub fn data_updated(keys: Vec<CollectionKey>) -> Self {
        SyncEvent::DataUpdated { keys }
    }

    /// Returns the event name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::Status { .. } => "sync:status",
            SyncEvent::DataUpdated { .. } => "data:updated",
        }
    }

    /// Returns the status if this is a `sync:status` event.
    pub fn as_status(&self) -> Option<SyncStatus> {
        match self {
            SyncEvent::Status { status, .. } => Some(*status),
            SyncEvent::DataUpdated { .. } => None,
        }
    }
}
