//! Seeding decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collaborators::BackupArtifact;
use crate::node::{NodeAddress, Role};

/// How the initial copy reaches a new replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedingMode {
    /// Backup on the Primary, restore WITH NORECOVERY on the replica.
    #[default]
    Manual,
    /// The engine streams the initial copy itself.
    Automatic,
}

/// Where restored data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeedSource {
    /// Nothing to restore.
    None,
    /// A RESTORING copy left by an earlier run is reused as-is.
    ReuseRestoring,
    /// Most recent full+log chain from the Primary's backup history.
    LastBackupChain { artifacts: Vec<BackupArtifact> },
    /// Backups the caller took beforehand.
    BackupSet { artifacts: Vec<BackupArtifact> },
    /// A fresh full+log backup, taken once per run, into the shared path.
    FreshBackup { shared_path: String },
}

impl SeedSource {
    /// Artifacts known at planning time.
    pub fn artifacts(&self) -> Option<&[BackupArtifact]> {
        match self {
            SeedSource::LastBackupChain { artifacts } | SeedSource::BackupSet { artifacts } => {
                Some(artifacts.as_slice())
            }
            _ => None,
        }
    }
}

/// Planning verdict for one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SeedVerdict {
    /// Proceed with the actions in the decision.
    Ready,
    /// Already part of this topology; nothing to seed.
    Converged,
    /// This replica cannot proceed; the others are unaffected.
    Blocked { reason: String },
}

/// What must happen on one replica before it can be partnered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedingDecision {
    pub replica: NodeAddress,
    pub role: Role,
    pub needs_backup: bool,
    pub needs_restore: bool,
    /// Drop the existing copy first (only under `force`).
    pub drop_existing: bool,
    pub mode: SeedingMode,
    pub source: SeedSource,
    pub verdict: SeedVerdict,
}

impl SeedingDecision {
    fn base(replica: &NodeAddress, role: Role, mode: SeedingMode) -> Self {
        Self {
            replica: replica.clone(),
            role,
            needs_backup: false,
            needs_restore: false,
            drop_existing: false,
            mode,
            source: SeedSource::None,
            verdict: SeedVerdict::Ready,
        }
    }

    /// Nothing to seed, nothing to block.
    pub fn nothing(replica: &NodeAddress, role: Role, mode: SeedingMode) -> Self {
        Self::base(replica, role, mode)
    }

    pub fn converged(replica: &NodeAddress, role: Role, mode: SeedingMode) -> Self {
        Self {
            verdict: SeedVerdict::Converged,
            ..Self::base(replica, role, mode)
        }
    }

    pub fn reuse_restoring(replica: &NodeAddress, mode: SeedingMode) -> Self {
        Self {
            source: SeedSource::ReuseRestoring,
            ..Self::base(replica, Role::Mirror, mode)
        }
    }

    pub fn blocked(replica: &NodeAddress, role: Role, mode: SeedingMode, reason: impl Into<String>) -> Self {
        Self {
            verdict: SeedVerdict::Blocked {
                reason: reason.into(),
            },
            ..Self::base(replica, role, mode)
        }
    }

    /// Restore from `source`, optionally replacing an existing copy.
    pub fn restore(replica: &NodeAddress, mode: SeedingMode, source: SeedSource, drop_existing: bool) -> Self {
        Self {
            needs_backup: matches!(source, SeedSource::FreshBackup { .. }),
            needs_restore: true,
            drop_existing,
            source,
            ..Self::base(replica, Role::Mirror, mode)
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.verdict, SeedVerdict::Blocked { .. })
    }

    pub fn is_converged(&self) -> bool {
        self.verdict == SeedVerdict::Converged
    }

    pub fn blocked_reason(&self) -> Option<&str> {
        match &self.verdict {
            SeedVerdict::Blocked { reason } => Some(reason.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for SeedingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.verdict {
            SeedVerdict::Blocked { reason } => write!(f, "blocked: {}", reason),
            SeedVerdict::Converged => write!(f, "already converged"),
            SeedVerdict::Ready => {
                let mut parts = Vec::new();
                if self.drop_existing {
                    parts.push("drop existing copy".to_string());
                }
                if self.needs_backup {
                    parts.push("take fresh full+log backup".to_string());
                }
                if self.needs_restore {
                    let from = match &self.source {
                        SeedSource::LastBackupChain { artifacts } => {
                            format!("last backup chain ({} files)", artifacts.len())
                        }
                        SeedSource::BackupSet { artifacts } => {
                            format!("supplied backup set ({} files)", artifacts.len())
                        }
                        SeedSource::FreshBackup { shared_path } => format!("fresh backup in {}", shared_path),
                        _ => "backup".to_string(),
                    };
                    parts.push(format!("restore WITH NORECOVERY from {}", from));
                }
                if self.source == SeedSource::ReuseRestoring {
                    parts.push("reuse restoring copy".to_string());
                }
                if parts.is_empty() {
                    if self.mode == SeedingMode::Automatic && self.role == Role::Mirror {
                        parts.push("engine seeding".to_string());
                    } else {
                        parts.push("nothing to seed".to_string());
                    }
                }
                write!(f, "{}", parts.join(", "))
            }
        }
    }
}
