//! CLI command implementations
//!
//! Each command loads the config, builds a tokio runtime and blocks on one
//! orchestrator call. Commands are thin: every decision is made by the
//! orchestrator.

use std::path::Path;

use serde_json::json;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::orchestrator::{Orchestrator, RunOptions};

use super::args::{Command, RunFlags};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Validate { config } => validate(&config),
        Command::Plan { config, flags } => plan(&config, flags),
        Command::Setup {
            config,
            flags,
            dry_run,
        } => setup(&config, flags, dry_run),
        Command::Status { config } => status(&config),
    }
}

/// Loaded config, the options after flag overrides, and an orchestrator.
struct Session {
    config: Config,
    options: RunOptions,
    orchestrator: Orchestrator,
    runtime: Runtime,
}

fn open(config_path: &Path, flags: RunFlags, dry_run: bool) -> CliResult<Session> {
    let config = Config::load(config_path)?;

    let mut options = config.options.clone();
    options.force |= flags.force;
    options.use_last_backup |= flags.use_last_backup;
    options.dry_run |= dry_run;

    let cluster = config
        .simulated_cluster()
        .ok_or_else(CliError::no_session_provider)?;
    let orchestrator = Orchestrator::new(cluster.collaborators());
    let runtime =
        Runtime::new().map_err(|e| CliError::io_error(format!("Failed to start runtime: {}", e)))?;

    Ok(Session {
        config,
        options,
        orchestrator,
        runtime,
    })
}

/// Validate the topology; never writes.
pub fn validate(config_path: &Path) -> CliResult<()> {
    let session = open(config_path, RunFlags::default(), false)?;
    let result = session.runtime.block_on(
        session
            .orchestrator
            .validate_only(&session.config.topology, &session.options),
    );

    write_response(serde_json::to_value(&result)?)?;
    if !result.ok {
        return Err(CliError::validation_failed(result.reason));
    }
    Ok(())
}

/// Print per-replica seeding decisions; never writes.
pub fn plan(config_path: &Path, flags: RunFlags) -> CliResult<()> {
    let session = open(config_path, flags, false)?;
    let plan = session.runtime.block_on(
        session
            .orchestrator
            .plan(&session.config.topology, &session.options),
    );

    write_response(plan.summary())?;
    if !plan.is_valid() {
        return Err(CliError::validation_failed(plan.validation.reason.clone()));
    }
    Ok(())
}

/// Full run, or a dry run with `--dry-run`.
pub fn setup(config_path: &Path, flags: RunFlags, dry_run: bool) -> CliResult<()> {
    let session = open(config_path, flags, dry_run)?;
    let report = session.runtime.block_on(
        session
            .orchestrator
            .setup_topology(&session.config.topology, &session.options),
    )?;

    let summary = report.summary();
    write_response(json!({
        "run_id": report.run_id().to_string(),
        "database": report.database(),
        "dry_run": session.options.dry_run,
        "summary": summary,
        "results": report.results(),
    }))?;

    if summary.failed > 0 {
        return Err(CliError::run_failed(format!(
            "{} step(s) failed; see results",
            summary.failed
        )));
    }
    Ok(())
}

/// Current state of every member; never writes.
pub fn status(config_path: &Path) -> CliResult<()> {
    let session = open(config_path, RunFlags::default(), false)?;
    let status = session.runtime.block_on(
        session
            .orchestrator
            .status(&session.config.topology, &session.options),
    );
    write_response(serde_json::to_value(&status)?)
}
