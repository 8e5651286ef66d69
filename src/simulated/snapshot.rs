//! Serializable description of one simulated server.

use serde::{Deserialize, Serialize};

use crate::collaborators::BackupArtifact;
use crate::endpoint::Endpoint;
use crate::node::{DatabaseInfo, Edition, HostPlatform, NodeAddress, ServerInfo};

/// State of one server instance as the simulation sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub address: NodeAddress,
    pub info: ServerInfo,

    #[serde(default)]
    pub databases: Vec<DatabaseInfo>,

    #[serde(default)]
    pub endpoint: Option<Endpoint>,

    /// Ports of TCP endpoints other than the mirroring endpoint.
    #[serde(default)]
    pub tcp_ports: Vec<u16>,

    #[serde(default)]
    pub logins: Vec<String>,

    /// Backup history, oldest first.
    #[serde(default)]
    pub backup_history: Vec<BackupArtifact>,

    /// Paths this server can read and write.
    #[serde(default)]
    pub shares: Vec<String>,

    #[serde(default)]
    pub unreachable: bool,
}

impl ServerSnapshot {
    /// A reachable Windows server in the `CORP` domain running as a domain account.
    pub fn new(host: &str, edition: &str) -> Self {
        Self {
            address: NodeAddress::new(host),
            info: ServerInfo {
                version: "15.0.2000.5".to_string(),
                edition: Edition::new(edition),
                service_account: "CORP\\sqlsvc".to_string(),
                fqdn: format!("{}.corp.local", host),
                domain: Some("CORP".to_string()),
                platform: HostPlatform::Windows,
            },
            databases: Vec::new(),
            endpoint: None,
            tcp_ports: Vec::new(),
            logins: Vec::new(),
            backup_history: Vec::new(),
            shares: Vec::new(),
            unreachable: false,
        }
    }

    pub fn with_database(mut self, database: DatabaseInfo) -> Self {
        self.databases.push(database);
        self
    }

    pub fn with_service_account(mut self, account: &str) -> Self {
        self.info.service_account = account.to_string();
        self
    }

    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.info.platform = platform;
        self
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_tcp_ports(mut self, ports: &[u16]) -> Self {
        self.tcp_ports.extend_from_slice(ports);
        self
    }

    pub fn with_backup_history(mut self, history: Vec<BackupArtifact>) -> Self {
        self.backup_history = history;
        self
    }

    pub fn with_share(mut self, path: &str) -> Self {
        self.shares.push(path.to_string());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseInfo> {
        self.databases
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub(super) fn database_mut(&mut self, name: &str) -> Option<&mut DatabaseInfo> {
        self.databases
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::RecoveryModel;

    #[test]
    fn test_snapshot_from_minimal_json() {
        let json = r#"{
            "address": "sql-b",
            "info": {
                "version": "15.0.2000.5",
                "edition": "Developer Edition",
                "service_account": "CORP\\sqlsvc",
                "fqdn": "sql-b.corp.local",
                "domain": "CORP"
            }
        }"#;
        let snapshot: ServerSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.address, NodeAddress::new("sql-b"));
        assert!(snapshot.databases.is_empty());
        assert!(!snapshot.unreachable);
    }

    #[test]
    fn test_database_lookup_ignores_case() {
        let snapshot = ServerSnapshot::new("sql-a", "Enterprise Edition")
            .with_database(DatabaseInfo::online("Orders", RecoveryModel::Full));
        assert!(snapshot.database("orders").is_some());
        assert!(snapshot.database("billing").is_none());
    }
}
