//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::errors::OrchestratorError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, runtime start)
    IoError,
    /// No way to reach the configured servers
    NoSessionProvider,
    /// Topology rejected before any write
    ValidationFailed,
    /// Run completed with failed steps
    RunFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "MIRROR_CLI_CONFIG_ERROR",
            Self::IoError => "MIRROR_CLI_IO_ERROR",
            Self::NoSessionProvider => "MIRROR_CLI_NO_SESSION_PROVIDER",
            Self::ValidationFailed => "MIRROR_CLI_VALIDATION_FAILED",
            Self::RunFailed => "MIRROR_CLI_RUN_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn no_session_provider() -> Self {
        Self::new(
            CliErrorCode::NoSessionProvider,
            "config has no inventory; this build only drives inventoried servers",
        )
    }

    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ValidationFailed, msg)
    }

    pub fn run_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::RunFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<OrchestratorError> for CliError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Validation { reason } => Self::validation_failed(reason),
            other => Self::run_failed(format!("{}: {}", other.code(), other)),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
