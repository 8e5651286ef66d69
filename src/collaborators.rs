//! External collaborators
//!
//! The orchestrator consumes these and implements none of them: opening
//! sessions, running backups and restores, reading backup history, and
//! managing logins all belong to the surrounding tooling. They are traits so
//! a run can be driven against real servers or against [`crate::simulated`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::{NodeAddress, NodeFuture, NodeHandle, SharedNode};

/// Kind of a backup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Full,
    Differential,
    Log,
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupKind::Full => "Full",
            BackupKind::Differential => "Differential",
            BackupKind::Log => "Log",
        };
        f.write_str(s)
    }
}

/// One backup file produced by the backup engine or listed in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub database: String,
    pub kind: BackupKind,
    pub path: String,
    pub first_lsn: u64,
    pub last_lsn: u64,
    pub finished_at: DateTime<Utc>,
}

/// Whether a chain can seed a mirror without a gap.
///
/// The chain must start with a full backup and end in a log backup; a chain
/// ending in a full or differential backup leaves the mirror behind the
/// primary's log.
pub fn chain_is_seedable(chain: &[BackupArtifact]) -> Result<(), String> {
    match (chain.first(), chain.last()) {
        (None, _) | (_, None) => Err("no backup history".to_string()),
        (Some(first), _) if first.kind != BackupKind::Full => Err(format!(
            "backup chain starts with a {} backup, not a Full backup",
            first.kind
        )),
        (_, Some(last)) if last.kind != BackupKind::Log => Err(format!(
            "backup chain ends in a {} backup; a Log backup is required to seed a mirror",
            last.kind
        )),
        _ => Ok(()),
    }
}

/// Options for a restore issued while seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Overwrite an existing database of the same name.
    pub with_replace: bool,
    /// Leave the database RESTORING so it can become a mirror.
    pub no_recovery: bool,
}

/// Opens sessions to server instances.
pub trait SessionProvider: Send + Sync {
    fn open<'a>(&'a self, address: &'a NodeAddress) -> NodeFuture<'a, SharedNode>;
}

/// Runs backups and restores.
pub trait BackupEngine: Send + Sync {
    /// Take one backup of `database` on `node` into `shared_path`.
    fn backup<'a>(
        &'a self,
        node: &'a dyn NodeHandle,
        database: &'a str,
        kind: BackupKind,
        shared_path: &'a str,
    ) -> NodeFuture<'a, BackupArtifact>;

    /// Restore `artifacts` in order onto `node`.
    fn restore<'a>(
        &'a self,
        node: &'a dyn NodeHandle,
        artifacts: &'a [BackupArtifact],
        options: RestoreOptions,
    ) -> NodeFuture<'a, ()>;

    /// Whether `node` can read and write `path`.
    fn share_accessible<'a>(&'a self, node: &'a dyn NodeHandle, path: &'a str)
        -> NodeFuture<'a, bool>;
}

/// Reads `msdb` backup history.
pub trait BackupHistory: Send + Sync {
    /// Most recent full backup followed by every later log backup, oldest first.
    fn last_backup_chain<'a>(
        &'a self,
        node: &'a dyn NodeHandle,
        database: &'a str,
    ) -> NodeFuture<'a, Vec<BackupArtifact>>;
}

/// Creates server logins.
pub trait LoginManager: Send + Sync {
    /// Create a login for `identity` on `node` unless it exists.
    fn ensure_login<'a>(&'a self, node: &'a dyn NodeHandle, identity: &'a str)
        -> NodeFuture<'a, ()>;
}

/// The full set of collaborators a run needs.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionProvider>,
    pub backups: Arc<dyn BackupEngine>,
    pub history: Arc<dyn BackupHistory>,
    pub logins: Arc<dyn LoginManager>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(kind: BackupKind, lsn: u64) -> BackupArtifact {
        BackupArtifact {
            database: "orders".into(),
            kind,
            path: format!("\\\\share\\orders_{}.bak", lsn),
            first_lsn: lsn,
            last_lsn: lsn + 10,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_chain_ending_in_log_is_seedable() {
        let chain = vec![artifact(BackupKind::Full, 1), artifact(BackupKind::Log, 11)];
        assert!(chain_is_seedable(&chain).is_ok());
    }

    #[test]
    fn test_chain_ending_in_full_is_rejected() {
        let chain = vec![artifact(BackupKind::Full, 1)];
        let err = chain_is_seedable(&chain).unwrap_err();
        assert!(err.contains("ends in a Full backup"));
    }

    #[test]
    fn test_chain_ending_in_differential_is_rejected() {
        let chain = vec![
            artifact(BackupKind::Full, 1),
            artifact(BackupKind::Differential, 11),
        ];
        assert!(chain_is_seedable(&chain).is_err());
    }

    #[test]
    fn test_empty_or_headless_chain_is_rejected() {
        assert!(chain_is_seedable(&[]).is_err());
        assert!(chain_is_seedable(&[artifact(BackupKind::Log, 1)]).is_err());
    }
}
