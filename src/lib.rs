//! mirrorctl - drives independent SQL Server instances into a database
//! mirroring topology
//!
//! The crate is the control plane only. The engine owns the replication
//! protocol; this crate decides what to ask of each engine and in which order:
//!
//! 1. Validate the proposed topology (read-only, fatal on failure)
//! 2. Plan seeding per replica (backup/restore, reuse, or skip)
//! 3. Provision mirroring endpoints and CONNECT grants
//! 4. Establish partner and witness relationships in engine order
//! 5. Report one structured outcome per step and replica
//!
//! Every collaborator that touches a real server (sessions, backup engine,
//! backup history, login management) is a trait in [`collaborators`] or
//! [`node`]. [`simulated`] provides in-memory implementations of all of them.

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod endpoint;
pub mod errors;
pub mod node;
pub mod observability;
pub mod orchestrator;
pub mod partnership;
pub mod report;
pub mod seeding;
pub mod simulated;
pub mod topology;

pub use errors::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{Orchestrator, RunOptions, TopologyPlan};
pub use report::{OperationResult, RunReport, Status, Step};
pub use topology::{ReplicaTopology, ValidationResult};
