//! Config and CLI Tests
//!
//! A config file with an inventory drives every command end to end against
//! the simulated cluster it describes.

mod common;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use tempfile::NamedTempFile;

use common::*;
use mirrorctl::cli::{run_command, Cli, CliErrorCode, Command, RunFlags};
use mirrorctl::config::{Config, ConfigError};
use mirrorctl::simulated::ServerSnapshot;
use mirrorctl::{ReplicaTopology, RunOptions};

fn config(mirror_snapshot: ServerSnapshot) -> Config {
    Config {
        topology: ReplicaTopology::new(addr("sql-a"), DATABASE)
            .with_mirror(addr("sql-b"))
            .with_witness(addr("sql-w")),
        options: RunOptions {
            use_last_backup: true,
            ..RunOptions::default()
        },
        inventory: vec![primary("sql-a"), mirror_snapshot, witness("sql-w")],
    }
}

fn write_config(config: &Config) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string_pretty(config).unwrap().as_bytes())
        .unwrap();
    file
}

fn path(file: &NamedTempFile) -> PathBuf {
    file.path().to_path_buf()
}

// =============================================================================
// Config
// =============================================================================

/// The inventory survives a round trip through the file.
#[tokio::test]
async fn test_config_file_drives_simulated_run() {
    let file = write_config(&config(mirror("sql-b")));
    let loaded = Config::load(file.path()).unwrap();
    assert_eq!(loaded.inventory.len(), 3);

    let cluster = loaded.simulated_cluster().unwrap();
    let report = orchestrator(&cluster)
        .setup_topology(&loaded.topology, &loaded.options)
        .await
        .unwrap();

    assert!(failures(&report).is_empty(), "{:?}", failures(&report));
    assert!(cluster
        .database(&addr("sql-a"), DATABASE)
        .unwrap()
        .has_witness(&addr("sql-w")));
}

#[test]
fn test_config_rejects_mirror_equal_to_primary() {
    let mut config = config(mirror("sql-b"));
    config.topology = ReplicaTopology::new(addr("sql-a"), DATABASE).with_mirror(addr("SQL-A"));
    let file = write_config(&config);

    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

// =============================================================================
// Argument parsing
// =============================================================================

#[test]
fn test_parse_setup_flags() {
    let cli = Cli::try_parse_from([
        "mirrorctl",
        "setup",
        "--config",
        "topology.json",
        "--force",
        "--dry-run",
    ])
    .unwrap();

    match cli.command {
        Command::Setup {
            config,
            flags,
            dry_run,
        } => {
            assert_eq!(config, Path::new("topology.json"));
            assert!(flags.force);
            assert!(!flags.use_last_backup);
            assert!(dry_run);
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_validate_takes_no_run_flags() {
    assert!(Cli::try_parse_from(["mirrorctl", "validate", "--force"]).is_err());
}

// =============================================================================
// Commands
// =============================================================================

#[test]
fn test_validate_command() {
    let file = write_config(&config(mirror("sql-b")));
    run_command(Command::Validate { config: path(&file) }).unwrap();
}

#[test]
fn test_validate_command_rejects_edition_mismatch() {
    let file = write_config(&config(ServerSnapshot::new("sql-b", "Standard Edition")));

    let err = run_command(Command::Validate { config: path(&file) }).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ValidationFailed);
}

#[test]
fn test_plan_and_status_commands() {
    let file = write_config(&config(mirror("sql-b")));
    run_command(Command::Plan {
        config: path(&file),
        flags: RunFlags::default(),
    })
    .unwrap();
    run_command(Command::Status { config: path(&file) }).unwrap();
}

#[test]
fn test_setup_command() {
    let file = write_config(&config(mirror("sql-b")));
    run_command(Command::Setup {
        config: path(&file),
        flags: RunFlags::default(),
        dry_run: false,
    })
    .unwrap();
}

/// Failed steps make the command fail after the results are printed.
#[test]
fn test_setup_command_reports_failed_steps() {
    let file = write_config(&config(mirror("sql-b").unreachable()));

    let err = run_command(Command::Setup {
        config: path(&file),
        flags: RunFlags::default(),
        dry_run: false,
    })
    .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::RunFailed);
}

#[test]
fn test_missing_inventory() {
    let mut config = config(mirror("sql-b"));
    config.inventory.clear();
    let file = write_config(&config);

    let err = run_command(Command::Validate { config: path(&file) }).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::NoSessionProvider);
}

#[test]
fn test_missing_config_file() {
    let err = run_command(Command::Validate {
        config: PathBuf::from("/nonexistent/mirrorctl.json"),
    })
    .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
}
