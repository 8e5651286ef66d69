//! CLI argument definitions using clap
//!
//! Commands:
//! - mirrorctl validate --config <path>
//! - mirrorctl plan --config <path>
//! - mirrorctl setup --config <path> [--force] [--use-last-backup] [--dry-run]
//! - mirrorctl status --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mirrorctl - brings SQL Server instances into a database mirroring topology
#[derive(Parser, Debug)]
#[command(name = "mirrorctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Overrides applied on top of the options in the config file.
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct RunFlags {
    /// Replace unaffiliated copies of the database on replicas
    #[arg(long)]
    pub force: bool,

    /// Seed from the primary's most recent full+log backup chain
    #[arg(long)]
    pub use_last_backup: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the topology without writing anything
    Validate {
        /// Path to configuration file
        #[arg(long, default_value = "./mirrorctl.json")]
        config: PathBuf,
    },

    /// Show what setup would do, per replica
    Plan {
        /// Path to configuration file
        #[arg(long, default_value = "./mirrorctl.json")]
        config: PathBuf,

        #[command(flatten)]
        flags: RunFlags,
    },

    /// Validate, seed, provision endpoints and establish partnerships
    Setup {
        /// Path to configuration file
        #[arg(long, default_value = "./mirrorctl.json")]
        config: PathBuf,

        #[command(flatten)]
        flags: RunFlags,

        /// Report planned steps without issuing any statement
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the current mirroring state of every member
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./mirrorctl.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setup_flags() {
        let cli = Cli::parse_from([
            "mirrorctl",
            "setup",
            "--config",
            "topology.json",
            "--force",
            "--dry-run",
        ]);
        match cli.command {
            Command::Setup {
                config,
                flags,
                dry_run,
            } => {
                assert_eq!(config, PathBuf::from("topology.json"));
                assert!(flags.force);
                assert!(!flags.use_last_backup);
                assert!(dry_run);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["mirrorctl", "validate"]);
        match cli.command {
            Command::Validate { config } => assert_eq!(config, PathBuf::from("./mirrorctl.json")),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
