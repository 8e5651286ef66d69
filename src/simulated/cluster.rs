//! In-memory cluster
//!
//! Holds every simulated server and journals each statement sent to them.
//! Implements all external collaborators, so a run can be exercised end to
//! end and its side effects asserted afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;

use super::node::SimulatedNode;
use super::snapshot::ServerSnapshot;
use crate::collaborators::{
    BackupArtifact, BackupEngine, BackupHistory, BackupKind, Collaborators, LoginManager,
    RestoreOptions, SessionProvider,
};
use crate::endpoint::Endpoint;
use crate::node::{
    DatabaseInfo, NodeAddress, NodeError, NodeFuture, NodeHandle, NodeResult, SharedNode, Statement,
};

/// One statement as received by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatement {
    pub node: NodeAddress,
    pub statement: Statement,
    pub accepted: bool,
}

#[derive(Debug, Default)]
pub(super) struct ClusterState {
    pub(super) servers: BTreeMap<NodeAddress, ServerSnapshot>,
    pub(super) journal: Vec<ExecutedStatement>,
    pub(super) failures: Vec<(NodeAddress, String)>,
    pub(super) delays: HashMap<NodeAddress, Duration>,
    restores: Vec<NodeAddress>,
    backups: Vec<(NodeAddress, BackupKind)>,
    created_logins: Vec<(NodeAddress, String)>,
    next_lsn: u64,
}

/// A set of simulated servers sharing one journal.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl SimulatedCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(self, snapshot: ServerSnapshot) -> Self {
        self.add_server(snapshot);
        self
    }

    pub fn from_snapshots(snapshots: impl IntoIterator<Item = ServerSnapshot>) -> Self {
        let cluster = Self::new();
        for snapshot in snapshots {
            cluster.add_server(snapshot);
        }
        cluster
    }

    pub fn add_server(&self, snapshot: ServerSnapshot) {
        self.lock().servers.insert(snapshot.address.clone(), snapshot);
    }

    /// Make every statement of `kind` (see [`Statement::kind`]) fail on `node`.
    pub fn fail_statement(&self, node: &NodeAddress, kind: &str) {
        self.lock().failures.push((node.clone(), kind.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Delay every call made to `node`.
    pub fn delay(&self, node: &NodeAddress, delay: Duration) {
        self.lock().delays.insert(node.clone(), delay);
    }

    pub fn set_unreachable(&self, node: &NodeAddress, unreachable: bool) {
        if let Some(server) = self.lock().servers.get_mut(node) {
            server.unreachable = unreachable;
        }
    }

    /// All four collaborators backed by this cluster.
    pub fn collaborators(&self) -> Collaborators {
        let shared = Arc::new(self.clone());
        Collaborators {
            sessions: shared.clone(),
            backups: shared.clone(),
            history: shared.clone(),
            logins: shared,
        }
    }

    /// Every statement received, in order.
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.lock().journal.clone()
    }

    pub fn statements_for(&self, node: &NodeAddress) -> Vec<Statement> {
        self.lock()
            .journal
            .iter()
            .filter(|e| &e.node == node)
            .map(|e| e.statement.clone())
            .collect()
    }

    /// Number of statements received, accepted or not.
    pub fn ddl_count(&self) -> usize {
        self.lock().journal.len()
    }

    pub fn restore_count(&self) -> usize {
        self.lock().restores.len()
    }

    pub fn backup_count(&self) -> usize {
        self.lock().backups.len()
    }

    pub fn created_logins(&self) -> Vec<(NodeAddress, String)> {
        self.lock().created_logins.clone()
    }

    pub fn snapshot(&self, node: &NodeAddress) -> Option<ServerSnapshot> {
        self.lock().servers.get(node).cloned()
    }

    pub fn database(&self, node: &NodeAddress, name: &str) -> Option<DatabaseInfo> {
        self.lock()
            .servers
            .get(node)
            .and_then(|s| s.database(name).cloned())
    }

    pub fn endpoint(&self, node: &NodeAddress) -> Option<Endpoint> {
        self.lock().servers.get(node).and_then(|s| s.endpoint.clone())
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) async fn pause(&self, node: &NodeAddress) {
        let delay = self.lock().delays.get(node).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Run `f` against a reachable server.
    pub(super) fn with_reachable<T>(
        &self,
        node: &NodeAddress,
        f: impl FnOnce(&mut ClusterState) -> NodeResult<T>,
    ) -> NodeResult<T> {
        let mut state = self.lock();
        match state.servers.get(node) {
            None => return Err(NodeError::unreachable(node, "no such server")),
            Some(server) if server.unreachable => {
                return Err(NodeError::unreachable(node, "connection refused"))
            }
            Some(_) => {}
        }
        f(&mut state)
    }
}

impl ClusterState {
    pub(super) fn server(&self, node: &NodeAddress) -> NodeResult<&ServerSnapshot> {
        self.servers
            .get(node)
            .ok_or_else(|| NodeError::unreachable(node, "no such server"))
    }

    pub(super) fn server_mut(&mut self, node: &NodeAddress) -> NodeResult<&mut ServerSnapshot> {
        self.servers
            .get_mut(node)
            .ok_or_else(|| NodeError::unreachable(node, "no such server"))
    }

    /// Server whose mirroring endpoint answers at `url`.
    pub(super) fn resolve_url(&self, url: &str) -> Option<&ServerSnapshot> {
        self.servers.values().find(|s| {
            !s.unreachable
                && s.endpoint
                    .as_ref()
                    .map(|e| e.url().eq_ignore_ascii_case(url))
                    .unwrap_or(false)
        })
    }
}

impl SessionProvider for SimulatedCluster {
    fn open<'a>(&'a self, address: &'a NodeAddress) -> NodeFuture<'a, SharedNode> {
        Box::pin(async move {
            self.pause(address).await;
            self.with_reachable(address, |_| Ok(()))?;
            let node: SharedNode = Arc::new(SimulatedNode::new(address.clone(), self.clone()));
            Ok(node)
        })
    }
}

impl BackupEngine for SimulatedCluster {
    fn backup<'a>(
        &'a self,
        node: &'a dyn NodeHandle,
        database: &'a str,
        kind: BackupKind,
        shared_path: &'a str,
    ) -> NodeFuture<'a, BackupArtifact> {
        Box::pin(async move {
            let address = node.address();
            self.pause(address).await;
            self.with_reachable(address, |state| {
                let server = state.server(address)?;
                if server.database(database).is_none() {
                    return Err(NodeError::collaborator(
                        address,
                        "backup",
                        format!("database '{}' does not exist", database),
                    ));
                }
                if !server.shares.iter().any(|s| s.eq_ignore_ascii_case(shared_path)) {
                    return Err(NodeError::collaborator(
                        address,
                        "backup",
                        format!("cannot write to {}", shared_path),
                    ));
                }

                let first_lsn = state.next_lsn + 1;
                state.next_lsn += 100;
                state.backups.push((address.clone(), kind));
                let artifact = BackupArtifact {
                    database: database.to_string(),
                    kind,
                    path: format!("{}\\{}_{}_{}.bak", shared_path, database, kind, state.backups.len()),
                    first_lsn,
                    last_lsn: state.next_lsn,
                    finished_at: Utc::now(),
                };
                state.server_mut(address)?.backup_history.push(artifact.clone());
                Ok(artifact)
            })
        })
    }

    fn restore<'a>(
        &'a self,
        node: &'a dyn NodeHandle,
        artifacts: &'a [BackupArtifact],
        options: RestoreOptions,
    ) -> NodeFuture<'a, ()> {
        Box::pin(async move {
            let address = node.address();
            self.pause(address).await;
            self.with_reachable(address, |state| {
                state.restores.push(address.clone());
                let first = artifacts.first().ok_or_else(|| {
                    NodeError::collaborator(address, "restore", "no backup files given")
                })?;
                let database = first.database.clone();

                let server = state.server_mut(address)?;
                if server.database(&database).is_some() {
                    if !options.with_replace {
                        return Err(NodeError::collaborator(
                            address,
                            "restore",
                            format!("database '{}' already exists", database),
                        ));
                    }
                    server.databases.retain(|d| !d.name.eq_ignore_ascii_case(&database));
                }

                let restored = if options.no_recovery {
                    DatabaseInfo::restoring(database)
                } else {
                    DatabaseInfo::online(database, crate::node::RecoveryModel::Full)
                };
                server.databases.push(restored);
                Ok(())
            })
        })
    }

    fn share_accessible<'a>(
        &'a self,
        node: &'a dyn NodeHandle,
        path: &'a str,
    ) -> NodeFuture<'a, bool> {
        Box::pin(async move {
            let address = node.address();
            self.pause(address).await;
            self.with_reachable(address, |state| {
                Ok(state
                    .server(address)?
                    .shares
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(path)))
            })
        })
    }
}

impl BackupHistory for SimulatedCluster {
    fn last_backup_chain<'a>(
        &'a self,
        node: &'a dyn NodeHandle,
        database: &'a str,
    ) -> NodeFuture<'a, Vec<BackupArtifact>> {
        Box::pin(async move {
            let address = node.address();
            self.pause(address).await;
            self.with_reachable(address, |state| {
                let history: Vec<BackupArtifact> = state
                    .server(address)?
                    .backup_history
                    .iter()
                    .filter(|a| a.database.eq_ignore_ascii_case(database))
                    .cloned()
                    .collect();

                // most recent full backup and everything after it
                let start = history
                    .iter()
                    .rposition(|a| a.kind == BackupKind::Full)
                    .unwrap_or(history.len());
                Ok(history[start..].to_vec())
            })
        })
    }
}

impl LoginManager for SimulatedCluster {
    fn ensure_login<'a>(
        &'a self,
        node: &'a dyn NodeHandle,
        identity: &'a str,
    ) -> NodeFuture<'a, ()> {
        Box::pin(async move {
            let address = node.address();
            self.pause(address).await;
            self.with_reachable(address, |state| {
                let server = state.server_mut(address)?;
                if server.logins.iter().any(|l| l.eq_ignore_ascii_case(identity)) {
                    return Ok(());
                }
                server.logins.push(identity.to_string());
                state.created_logins.push((address.clone(), identity.to_string()));
                Ok(())
            })
        })
    }
}
