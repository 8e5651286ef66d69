//! Topology description, member sessions and validation.

mod model;
mod sessions;
mod validator;

pub use model::{Member, ReplicaTopology};
pub use sessions::{MemberSession, TopologySessions};
pub use validator::{TopologyValidator, ValidationFailure, ValidationResult};
