//! Orchestration error taxonomy
//!
//! Only `Validation` is fatal for a run, and it is raised before any write.
//! Every other variant is scoped to one replica or one node: it is recorded
//! as a `Failed` result and the run continues with the next replica.

use thiserror::Error;

use crate::node::{NodeAddress, NodeError};
use crate::report::Step;

/// Result type for orchestration operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// Topology rejected; nothing was written
    #[error("topology validation failed: {reason}")]
    Validation { reason: String },

    /// Seeding could not be planned or carried out for one replica
    #[error("seeding {replica} failed: {reason}")]
    Seeding { replica: NodeAddress, reason: String },

    /// Endpoint or grant provisioning failed on one node
    #[error("provisioning {node} failed: {reason}")]
    Provisioning {
        node: NodeAddress,
        reason: String,
        /// False for the witness, whose failure only degrades the run
        essential: bool,
    },

    /// A partner or witness statement failed; earlier steps stay in place
    #[error("{step} on {node} failed: {reason}")]
    Partnership {
        node: NodeAddress,
        step: Step,
        reason: String,
    },

    /// Any collaborator failure while talking to one node
    #[error("connection to {node} failed: {source}")]
    Connection {
        node: NodeAddress,
        #[source]
        source: NodeError,
    },

    /// The run was cancelled before this step started
    #[error("run cancelled before {step} on {node}")]
    Cancelled { node: NodeAddress, step: Step },
}

impl OrchestratorError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn seeding(replica: &NodeAddress, reason: impl Into<String>) -> Self {
        Self::Seeding {
            replica: replica.clone(),
            reason: reason.into(),
        }
    }

    pub fn provisioning(node: &NodeAddress, reason: impl Into<String>, essential: bool) -> Self {
        Self::Provisioning {
            node: node.clone(),
            reason: reason.into(),
            essential,
        }
    }

    pub fn partnership(node: &NodeAddress, step: Step, reason: impl Into<String>) -> Self {
        Self::Partnership {
            node: node.clone(),
            step,
            reason: reason.into(),
        }
    }

    pub fn connection(node: &NodeAddress, source: NodeError) -> Self {
        Self::Connection {
            node: node.clone(),
            source,
        }
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "MIRROR_VALIDATION_ERROR",
            Self::Seeding { .. } => "MIRROR_SEEDING_ERROR",
            Self::Provisioning { .. } => "MIRROR_PROVISIONING_ERROR",
            Self::Partnership { .. } => "MIRROR_PARTNERSHIP_ERROR",
            Self::Connection { .. } => "MIRROR_CONNECTION_ERROR",
            Self::Cancelled { .. } => "MIRROR_CANCELLED",
        }
    }

    /// Whether the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Node the error is attributed to, if it is node-scoped.
    pub fn node(&self) -> Option<&NodeAddress> {
        match self {
            Self::Validation { .. } => None,
            Self::Seeding { replica, .. } => Some(replica),
            Self::Provisioning { node, .. }
            | Self::Partnership { node, .. }
            | Self::Connection { node, .. }
            | Self::Cancelled { node, .. } => Some(node),
        }
    }
}
