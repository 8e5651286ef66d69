//! Mirroring endpoints
//!
//! Descriptors, grant identity resolution and the per-run provisioner.

mod identity;
mod provisioner;
mod types;

pub use identity::{grant_identity, is_machine_class};
pub use provisioner::EndpointProvisioner;
pub use types::{
    EncryptionAlgorithm, Endpoint, EndpointRole, EndpointSettings, EndpointState,
};
