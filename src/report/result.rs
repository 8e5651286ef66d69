//! Per-step outcome records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::NodeAddress;

/// Outcome of one step on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The step changed the node as intended.
    Success,

    /// Nothing to do (already converged, dry run, cancelled, or a
    /// prerequisite did not complete).
    Skipped,

    /// The step was attempted, or was required, and did not complete.
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Skipped => "SKIPPED",
            Status::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step of the orchestration a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Step {
    Connect,
    Validate,
    Seed,
    DropExisting,
    Backup,
    Restore,
    Endpoint,
    Grant,
    /// Mirror pointed at the Primary endpoint.
    PartnerMirror,
    /// Primary pointed back at the Mirror endpoint.
    PartnerPrimary,
    Witness,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Connect => "Connect",
            Step::Validate => "Validate",
            Step::Seed => "Seed",
            Step::DropExisting => "DropExisting",
            Step::Backup => "Backup",
            Step::Restore => "Restore",
            Step::Endpoint => "Endpoint",
            Step::Grant => "Grant",
            Step::PartnerMirror => "PartnerMirror",
            Step::PartnerPrimary => "PartnerPrimary",
            Step::Witness => "Witness",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable outcome record.
///
/// `sequence` is assigned by the report under its lock, so it gives a total
/// order across concurrently running replicas; `timestamp` is taken at the
/// same moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub run_id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub node: NodeAddress,
    pub database: String,
    pub step: Step,
    pub status: Status,
    pub notes: String,
}

impl OperationResult {
    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} [{}] {} {}",
            self.sequence, self.node, self.database, self.step, self.status
        )?;
        if !self.notes.is_empty() {
            write!(f, ": {}", self.notes)?;
        }
        Ok(())
    }
}
