//! Node and database descriptors read from a server instance.
//!
//! These are plain values. They are produced by a [`NodeHandle`] read and
//! never mutated by the orchestrator; a new read returns a new value.
//!
//! [`NodeHandle`]: super::NodeHandle

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::NodeError;

/// Network identity of one server instance.
///
/// Rendered the way SQL Server clients spell it: `host`, `host\instance`,
/// `host,port` or `host\instance,port`. Two instances on the same host are
/// distinct nodes, which is what makes self-mirroring on one machine legal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress {
    host: String,
    instance: Option<String>,
    port: Option<u16>,
}

impl NodeAddress {
    /// Address of the default instance on `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            instance: None,
            port: None,
        }
    }

    /// Set a named instance.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Set an explicit TCP port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Host name part.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Named instance, if any.
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Whether both addresses live on the same host.
    pub fn same_host(&self, other: &NodeAddress) -> bool {
        self.host.eq_ignore_ascii_case(&other.host)
    }

    /// Whether both addresses name the same instance, ignoring the port.
    ///
    /// The engine reports partners as `host` or `host\instance`; the port a
    /// client connects on is not part of the instance's identity.
    pub fn same_instance(&self, other: &NodeAddress) -> bool {
        let instance_eq = match (&self.instance, &other.instance) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        };
        self.same_host(other) && instance_eq
    }

    /// Whether `reported` (as read from the engine) names this instance.
    pub fn matches_reported(&self, reported: &str) -> bool {
        reported
            .parse::<NodeAddress>()
            .map(|r| r.same_instance(self))
            .unwrap_or(false)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host)?;
        if let Some(instance) = &self.instance {
            write!(f, "\\{}", instance)?;
        }
        if let Some(port) = self.port {
            write!(f, ",{}", port)?;
        }
        Ok(())
    }
}

impl FromStr for NodeAddress {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || NodeError::InvalidAddress(s.to_string());

        let (rest, port) = match s.rsplit_once(',') {
            Some((rest, port)) => {
                let port = port.trim().parse::<u16>().map_err(|_| invalid())?;
                (rest, Some(port))
            }
            None => (s, None),
        };

        let (host, instance) = match rest.split_once('\\') {
            Some((host, instance)) => {
                if instance.is_empty() || instance.contains('\\') {
                    return Err(invalid());
                }
                (host, Some(instance.to_string()))
            }
            None => (rest, None),
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            instance,
            port,
        })
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = NodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(address: NodeAddress) -> Self {
        address.to_string()
    }
}

/// Role a node plays in one topology.
///
/// A role is a tag on the membership, not a property of the server: the
/// same instance can be Primary for one database and Mirror for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Mirror,
    Witness,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Mirror => "mirror",
            Role::Witness => "witness",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine edition as reported by the server (`SERVERPROPERTY('Edition')`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Edition(String);

impl Edition {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Mirroring feature tier of this edition.
    ///
    /// Enterprise and Developer (including evaluation builds) share a tier;
    /// every other SKU is Standard-class.
    pub fn class(&self) -> EditionClass {
        let name = self.0.trim().to_ascii_lowercase();
        if name.starts_with("enterprise") || name.starts_with("developer") {
            EditionClass::Enterprise
        } else {
            EditionClass::Standard
        }
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mutually-compatible mirroring feature tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditionClass {
    Enterprise,
    Standard,
}

/// Operating system the instance runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPlatform {
    #[default]
    Windows,
    Linux,
}

/// Server-level facts read once when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Product version string, e.g. `15.0.4236.7`.
    pub version: String,

    pub edition: Edition,

    /// Account the engine service runs under.
    pub service_account: String,

    /// Fully-qualified DNS name used in endpoint URLs.
    pub fqdn: String,

    /// Windows domain of the host, when joined to one.
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub platform: HostPlatform,
}

/// Database availability status (`sys.databases.state_desc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseStatus {
    Normal,
    Restoring,
    Recovering,
    RecoveryPending,
    Suspect,
    Emergency,
    Offline,
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatabaseStatus::Normal => "Normal",
            DatabaseStatus::Restoring => "Restoring",
            DatabaseStatus::Recovering => "Recovering",
            DatabaseStatus::RecoveryPending => "RecoveryPending",
            DatabaseStatus::Suspect => "Suspect",
            DatabaseStatus::Emergency => "Emergency",
            DatabaseStatus::Offline => "Offline",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryModel {
    Full,
    BulkLogged,
    Simple,
}

impl fmt::Display for RecoveryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryModel::Full => "Full",
            RecoveryModel::BulkLogged => "BulkLogged",
            RecoveryModel::Simple => "Simple",
        };
        f.write_str(s)
    }
}

/// Mirroring state of a database (`sys.database_mirroring.mirroring_state_desc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MirroringState {
    #[default]
    None,
    Connecting,
    Synchronizing,
    Synchronized,
    Suspended,
    Disconnected,
    PendingFailover,
}

impl MirroringState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirroringState::None => "None",
            MirroringState::Connecting => "Connecting",
            MirroringState::Synchronizing => "Synchronizing",
            MirroringState::Synchronized => "Synchronized",
            MirroringState::Suspended => "Suspended",
            MirroringState::Disconnected => "Disconnected",
            MirroringState::PendingFailover => "PendingFailover",
        }
    }
}

impl fmt::Display for MirroringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One database as seen from one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub status: DatabaseStatus,
    pub recovery_model: RecoveryModel,

    #[serde(default)]
    pub mirroring_state: MirroringState,

    /// Instances this copy is partnered with.
    #[serde(default)]
    pub partner_instances: Vec<String>,

    /// Endpoint URLs of those partners, in the same order.
    #[serde(default)]
    pub partner_urls: Vec<String>,

    #[serde(default)]
    pub witness_instance: Option<String>,

    #[serde(default)]
    pub witness_url: Option<String>,

    /// Availability group the database belongs to, if any.
    #[serde(default)]
    pub availability_group: Option<String>,
}

impl DatabaseInfo {
    /// A fresh online database in the given recovery model, not mirrored.
    pub fn online(name: impl Into<String>, recovery_model: RecoveryModel) -> Self {
        Self {
            name: name.into(),
            status: DatabaseStatus::Normal,
            recovery_model,
            mirroring_state: MirroringState::None,
            partner_instances: Vec::new(),
            partner_urls: Vec::new(),
            witness_instance: None,
            witness_url: None,
            availability_group: None,
        }
    }

    /// A copy left in RESTORING by a NORECOVERY restore.
    pub fn restoring(name: impl Into<String>) -> Self {
        Self {
            status: DatabaseStatus::Restoring,
            ..Self::online(name, RecoveryModel::Full)
        }
    }

    /// Whether this copy is partnered with `address`. Ports are ignored.
    pub fn is_partnered_with(&self, address: &NodeAddress) -> bool {
        self.partner_instances
            .iter()
            .any(|p| address.matches_reported(p))
    }

    /// Whether this copy uses `address` as its witness. Ports are ignored.
    pub fn has_witness(&self, address: &NodeAddress) -> bool {
        self.witness_instance
            .as_deref()
            .map(|w| address.matches_reported(w))
            .unwrap_or(false)
    }

    /// Whether this copy takes part in any replication relationship.
    pub fn is_replicating(&self) -> bool {
        self.mirroring_state != MirroringState::None
            || !self.partner_instances.is_empty()
            || self.availability_group.is_some()
    }
}
