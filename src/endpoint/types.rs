//! Mirroring endpoint descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::{NodeAddress, Role};

/// Role of a database mirroring endpoint (`ROLE = ...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Partner,
    Witness,
    All,
}

impl EndpointRole {
    /// Role to create for a node playing `role` in the topology.
    pub fn for_member(role: Role) -> Self {
        match role {
            Role::Witness => EndpointRole::Witness,
            Role::Primary | Role::Mirror => EndpointRole::Partner,
        }
    }

    /// Whether an endpoint with this role can serve a member playing `role`.
    pub fn serves(&self, role: Role) -> bool {
        matches!(
            (self, role),
            (EndpointRole::All, _)
                | (EndpointRole::Partner, Role::Primary | Role::Mirror)
                | (EndpointRole::Witness, Role::Witness)
        )
    }

    pub fn as_tsql(&self) -> &'static str {
        match self {
            EndpointRole::Partner => "PARTNER",
            EndpointRole::Witness => "WITNESS",
            EndpointRole::All => "ALL",
        }
    }
}

/// Transport encryption algorithm for the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionAlgorithm {
    #[default]
    Aes,
    Rc4,
}

impl EncryptionAlgorithm {
    pub fn as_tsql(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes => "AES",
            EncryptionAlgorithm::Rc4 => "RC4",
        }
    }
}

impl std::str::FromStr for EncryptionAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes" => Ok(EncryptionAlgorithm::Aes),
            "rc4" => Ok(EncryptionAlgorithm::Rc4),
            other => Err(format!("unknown encryption algorithm '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Stopped,
    Started,
    Disabled,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndpointState::Stopped => "STOPPED",
            EndpointState::Started => "STARTED",
            EndpointState::Disabled => "DISABLED",
        };
        f.write_str(s)
    }
}

/// The single database mirroring endpoint of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub owner: NodeAddress,
    pub name: String,
    pub role: EndpointRole,
    pub encryption: EncryptionAlgorithm,
    pub state: EndpointState,
    pub port: u16,

    /// Host name partners use to reach the listener.
    pub fqdn: String,
}

impl Endpoint {
    /// `TCP://<fqdn>:<port>`, the address partners are pointed at.
    pub fn url(&self) -> String {
        format!("TCP://{}:{}", self.fqdn, self.port)
    }

    pub fn is_started(&self) -> bool {
        self.state == EndpointState::Started
    }
}

/// How endpoints are created when a node has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub name: String,

    /// First listener port tried.
    pub base_port: u16,

    pub encryption: EncryptionAlgorithm,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            name: "Mirroring".to_string(),
            base_port: 5022,
            encryption: EncryptionAlgorithm::Aes,
        }
    }
}
