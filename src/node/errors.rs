//! Errors raised by a node session or any other external collaborator.

use thiserror::Error;

/// Result type for node and collaborator calls
pub type NodeResult<T> = Result<T, NodeError>;

/// Failure talking to one server instance.
///
/// Always attributable to a single node. The orchestrator wraps these in
/// `OrchestratorError::Connection` (or the per-step variant) and records them;
/// they are never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// Address string could not be parsed
    #[error("invalid instance address '{0}'")]
    InvalidAddress(String),

    /// A session could not be opened or was lost
    #[error("{address} is unreachable: {message}")]
    Unreachable { address: String, message: String },

    /// A single call exceeded its per-call timeout
    #[error("call to {address} timed out after {timeout_ms}ms")]
    Timeout { address: String, timeout_ms: u64 },

    /// The engine refused a statement
    #[error("{address} rejected `{statement}`: {message}")]
    StatementFailed {
        address: String,
        statement: String,
        message: String,
    },

    /// A backup, restore, history or login collaborator failed
    #[error("{operation} on {address} failed: {message}")]
    Collaborator {
        address: String,
        operation: &'static str,
        message: String,
    },
}

impl NodeError {
    pub fn unreachable(address: impl ToString, message: impl Into<String>) -> Self {
        Self::Unreachable {
            address: address.to_string(),
            message: message.into(),
        }
    }

    pub fn collaborator(
        address: impl ToString,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Collaborator {
            address: address.to_string(),
            operation,
            message: message.into(),
        }
    }

    /// Whether the node could not be talked to at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }
}
