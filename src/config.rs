//! Configuration file
//!
//! One JSON document holds the desired topology, the run options and,
//! optionally, an inventory of server snapshots. With an inventory the CLI
//! drives the bundled [`SimulatedCluster`] instead of live servers, which is
//! how runs are rehearsed.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::RunOptions;
use crate::simulated::{ServerSnapshot, SimulatedCluster};
use crate::topology::ReplicaTopology;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub topology: ReplicaTopology,

    #[serde(default)]
    pub options: RunOptions,

    /// Server snapshots for offline rehearsal.
    #[serde(default)]
    pub inventory: Vec<ServerSnapshot>,
}

impl Config {
    /// Load and validate configuration from file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let topology = &self.topology;
        if topology.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database must not be empty".into()));
        }
        if topology.mirrors.is_empty() {
            return Err(ConfigError::Invalid("at least one mirror is required".into()));
        }

        let mut mirrors = BTreeSet::new();
        for mirror in &topology.mirrors {
            let key = mirror.address.to_string().to_ascii_lowercase();
            if key == topology.primary.to_string().to_ascii_lowercase() {
                return Err(ConfigError::Invalid(format!(
                    "{} is both primary and mirror",
                    mirror.address
                )));
            }
            if !mirrors.insert(key) {
                return Err(ConfigError::Invalid(format!(
                    "mirror {} is listed twice",
                    mirror.address
                )));
            }
        }
        if let Some(witness) = &topology.witness {
            if topology.has_mirror(&witness.address.to_string()) {
                return Err(ConfigError::Invalid(format!(
                    "witness {} is also listed as a mirror",
                    witness.address
                )));
            }
        }

        if self.options.max_parallel == 0 {
            return Err(ConfigError::Invalid("max_parallel must be > 0".into()));
        }
        if self.options.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("call_timeout_secs must be > 0".into()));
        }
        if self.options.seeding_timeout_secs == 0 {
            return Err(ConfigError::Invalid("seeding_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Simulated cluster built from the inventory, if one is configured.
    pub fn simulated_cluster(&self) -> Option<SimulatedCluster> {
        if self.inventory.is_empty() {
            return None;
        }
        Some(SimulatedCluster::from_snapshots(self.inventory.iter().cloned()))
    }
}
