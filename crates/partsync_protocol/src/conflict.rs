//! Conflict detection and resolution.

use crate::record::Record;

/// A record present on both sides of a merge with differing content.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// Record id.
    pub id: String,
    /// Local `updatedAt`.
    pub local_updated_at: i64,
    /// Remote `updatedAt`.
    pub remote_updated_at: i64,
    /// How the conflict was resolved.
    pub resolution: ConflictResolution,
}

impl Conflict {
    /// Returns true if both versions carry the same whole-millisecond
    /// timestamp.
    pub fn is_tie(&self) -> bool {
        self.local_updated_at == self.remote_updated_at
    }
}

/// Resolution for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep local version.
    KeepLocal,
    /// Accept remote version.
    AcceptRemote,
}

/// Policy for automatic conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Greater `updatedAt` wins; ties go to the remote copy.
    #[default]
    LastWriteWins,
    /// Server always wins.
    ServerWins,
    /// Client always wins.
    ClientWins,
}

impl ConflictPolicy {
    /// Picks the surviving version of a record present on both sides.
    pub fn resolve(&self, local: &Record, remote: &Record) -> ConflictResolution {
        match self {
            ConflictPolicy::LastWriteWins => {
                if local.is_newer_than(remote) {
                    ConflictResolution::KeepLocal
                } else {
                    ConflictResolution::AcceptRemote
                }
            }
            ConflictPolicy::ServerWins => ConflictResolution::AcceptRemote,
            ConflictPolicy::ClientWins => ConflictResolution::KeepLocal,
        }
    }

    /// Returns the policy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::LastWriteWins => "last-write-wins",
            ConflictPolicy::ServerWins => "server-wins",
            ConflictPolicy::ClientWins => "client-wins",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: i64) -> Record {
        Record::with_id("1").touched(ts)
    }

    #[test]
    fn last_write_wins_prefers_newer() {
        let policy = ConflictPolicy::LastWriteWins;
        assert_eq!(policy.resolve(&at(200), &at(100)), ConflictResolution::KeepLocal);
        assert_eq!(policy.resolve(&at(100), &at(200)), ConflictResolution::AcceptRemote);
    }

    #[test]
    fn last_write_wins_tie_goes_remote() {
        assert_eq!(
            ConflictPolicy::LastWriteWins.resolve(&at(5), &at(5)),
            ConflictResolution::AcceptRemote
        );
    }

    #[test]
    fn fixed_side_policies() {
        assert_eq!(
            ConflictPolicy::ServerWins.resolve(&at(900), &at(1)),
            ConflictResolution::AcceptRemote
        );
        assert_eq!(
            ConflictPolicy::ClientWins.resolve(&at(1), &at(900)),
            ConflictResolution::KeepLocal
        );
    }

    #[test]
    fn default_policy() {
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::LastWriteWins);
        assert_eq!(ConflictPolicy::default().as_str(), "last-write-wins");
    }
}
