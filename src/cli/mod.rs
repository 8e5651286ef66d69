//! CLI module for mirrorctl
//!
//! Provides command-line interface for:
//! - validate: read-only topology validation
//! - plan: per-replica seeding decisions
//! - setup: full run (or dry run)
//! - status: current mirroring state

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, RunFlags};
pub use commands::{plan, run, run_command, setup, status, validate};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_json, write_response};
