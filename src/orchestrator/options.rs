//! Run options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collaborators::BackupArtifact;
use crate::endpoint::EndpointSettings;
use crate::seeding::{SeedingMode, SeedingOptions};

fn default_max_parallel() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_seeding_timeout_secs() -> u64 {
    3600
}

/// Everything a caller can steer about one run.
///
/// Passed explicitly into every run; nothing is read from process-wide state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Replace unaffiliated database copies on replicas.
    #[serde(default)]
    pub force: bool,

    /// Plan and report, but issue no statements.
    #[serde(default)]
    pub dry_run: bool,

    /// Seed from the Primary's most recent full+log chain.
    #[serde(default)]
    pub use_last_backup: bool,

    #[serde(default)]
    pub seeding_mode: SeedingMode,

    /// Pre-taken backups, oldest first.
    #[serde(default)]
    pub backup_set: Vec<BackupArtifact>,

    /// Location fresh backups are written to.
    #[serde(default)]
    pub shared_path: Option<String>,

    #[serde(default)]
    pub endpoint: EndpointSettings,

    /// Mirrors worked on at the same time.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Bound on each individual node call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Bound on each backup or restore.
    #[serde(default = "default_seeding_timeout_secs")]
    pub seeding_timeout_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            dry_run: false,
            use_last_backup: false,
            seeding_mode: SeedingMode::default(),
            backup_set: Vec::new(),
            shared_path: None,
            endpoint: EndpointSettings::default(),
            max_parallel: default_max_parallel(),
            call_timeout_secs: default_call_timeout_secs(),
            seeding_timeout_secs: default_seeding_timeout_secs(),
        }
    }
}

impl RunOptions {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn seeding_timeout(&self) -> Duration {
        Duration::from_secs(self.seeding_timeout_secs)
    }

    pub fn seeding_options(&self) -> SeedingOptions {
        SeedingOptions {
            use_last_backup: self.use_last_backup,
            force: self.force,
            mode: self.seeding_mode,
            backup_set: self.backup_set.clone(),
            shared_path: self.shared_path.clone(),
        }
    }
}
