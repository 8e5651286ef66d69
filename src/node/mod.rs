//! Node layer
//!
//! A node is one server instance reachable through a [`NodeHandle`]. The
//! handle exposes a fixed capability set (reads plus one execute); the
//! [`NodeSession`] wrapper caches server facts and bounds every call with a
//! per-call timeout.

mod errors;
mod handle;
mod statement;
mod types;

pub use errors::{NodeError, NodeResult};
pub use handle::{with_timeout, NodeFuture, NodeHandle, NodeSession, SharedNode};
pub use statement::{quote_ident, quote_literal, Statement};
pub use types::{
    DatabaseInfo, DatabaseStatus, Edition, EditionClass, HostPlatform, MirroringState,
    NodeAddress, RecoveryModel, Role, ServerInfo,
};
