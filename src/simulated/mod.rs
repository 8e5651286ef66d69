//! Simulated servers
//!
//! An in-memory stand-in for a set of SQL Server instances and for every
//! external collaborator. Used by the tests and by the CLI when a
//! configuration carries an `inventory` of server snapshots instead of
//! pointing at live servers.

mod cluster;
mod node;
mod snapshot;

pub use cluster::{ExecutedStatement, SimulatedCluster};
pub use node::SimulatedNode;
pub use snapshot::ServerSnapshot;
