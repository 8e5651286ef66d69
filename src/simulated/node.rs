//! One simulated server instance.
//!
//! Statements are applied with the engine's preconditions: a primary refuses
//! a partner whose copy is not already pointed back at it, and a witness can
//! only be set on a partnered database.

use super::cluster::{ClusterState, ExecutedStatement, SimulatedCluster};
use crate::endpoint::{Endpoint, EndpointState};
use crate::node::{
    DatabaseInfo, DatabaseStatus, MirroringState, NodeAddress, NodeError, NodeFuture, NodeHandle,
    NodeResult, Role, ServerInfo, Statement,
};

pub struct SimulatedNode {
    address: NodeAddress,
    cluster: SimulatedCluster,
}

impl SimulatedNode {
    pub fn new(address: NodeAddress, cluster: SimulatedCluster) -> Self {
        Self { address, cluster }
    }

    fn reject(&self, statement: &Statement, message: impl Into<String>) -> NodeError {
        NodeError::StatementFailed {
            address: self.address.to_string(),
            statement: statement.to_tsql(),
            message: message.into(),
        }
    }

    fn apply(&self, state: &mut ClusterState, statement: &Statement) -> NodeResult<()> {
        let injected = state
            .failures
            .iter()
            .any(|(node, kind)| node == &self.address && kind == statement.kind());
        if injected {
            return Err(self.reject(statement, "injected failure"));
        }

        match statement {
            Statement::CreateEndpoint {
                name,
                port,
                role,
                encryption,
            } => {
                let server = state.server_mut(&self.address)?;
                if server.endpoint.is_some() {
                    return Err(self.reject(statement, "a database mirroring endpoint already exists"));
                }
                if server.tcp_ports.contains(port) {
                    return Err(self.reject(statement, format!("port {} is already in use", port)));
                }
                server.tcp_ports.push(*port);
                server.endpoint = Some(Endpoint {
                    owner: self.address.clone(),
                    name: name.clone(),
                    role: *role,
                    encryption: *encryption,
                    state: EndpointState::Stopped,
                    port: *port,
                    fqdn: server.info.fqdn.clone(),
                });
                Ok(())
            }
            Statement::StopEndpoint { name } | Statement::StartEndpoint { name } => {
                let started = matches!(statement, Statement::StartEndpoint { .. });
                let server = state.server_mut(&self.address)?;
                match server.endpoint.as_mut() {
                    Some(endpoint) if endpoint.name.eq_ignore_ascii_case(name) => {
                        endpoint.state = if started {
                            EndpointState::Started
                        } else {
                            EndpointState::Stopped
                        };
                        Ok(())
                    }
                    _ => Err(self.reject(statement, format!("endpoint '{}' does not exist", name))),
                }
            }
            Statement::GrantConnect { endpoint, login } => {
                let server = state.server(&self.address)?;
                let exists = server
                    .endpoint
                    .as_ref()
                    .map(|e| e.name.eq_ignore_ascii_case(endpoint))
                    .unwrap_or(false);
                if !exists {
                    return Err(self.reject(statement, format!("endpoint '{}' does not exist", endpoint)));
                }
                if !server.logins.iter().any(|l| l.eq_ignore_ascii_case(login)) {
                    return Err(self.reject(statement, format!("cannot find the login '{}'", login)));
                }
                Ok(())
            }
            Statement::DropDatabase { database } => {
                let server = state.server_mut(&self.address)?;
                let mirrored = server
                    .database(database)
                    .map(|db| !db.partner_instances.is_empty());
                match mirrored {
                    None => Err(self.reject(statement, format!("database '{}' does not exist", database))),
                    Some(true) => Err(self.reject(statement, "database is mirrored; remove mirroring first")),
                    Some(false) => {
                        server.databases.retain(|d| !d.name.eq_ignore_ascii_case(database));
                        Ok(())
                    }
                }
            }
            Statement::SetPartner {
                database,
                partner_url,
            } => self.set_partner(state, statement, database, partner_url),
            Statement::SetWitness {
                database,
                witness_url,
            } => self.set_witness(state, statement, database, witness_url),
        }
    }

    fn own_endpoint_started(&self, state: &ClusterState) -> NodeResult<bool> {
        Ok(state
            .server(&self.address)?
            .endpoint
            .as_ref()
            .map(Endpoint::is_started)
            .unwrap_or(false))
    }

    fn set_partner(
        &self,
        state: &mut ClusterState,
        statement: &Statement,
        database: &str,
        partner_url: &str,
    ) -> NodeResult<()> {
        if !self.own_endpoint_started(state)? {
            return Err(self.reject(statement, "local mirroring endpoint is not started"));
        }
        let partner = match state.resolve_url(partner_url) {
            Some(server) if server.endpoint.as_ref().map(Endpoint::is_started).unwrap_or(false) => {
                server.address.clone()
            }
            _ => {
                return Err(self.reject(
                    statement,
                    format!("server network address {} can not be reached", partner_url),
                ))
            }
        };

        let local = state
            .server(&self.address)?
            .database(database)
            .cloned()
            .ok_or_else(|| self.reject(statement, format!("database '{}' does not exist", database)))?;

        match local.status {
            DatabaseStatus::Restoring => {
                let db = self.database_mut(state, statement, database)?;
                db.partner_instances = vec![partner.to_string()];
                db.partner_urls = vec![partner_url.to_string()];
                db.mirroring_state = MirroringState::Connecting;
                Ok(())
            }
            DatabaseStatus::Normal => {
                let remote_ready = state
                    .server(&partner)?
                    .database(database)
                    .map(|d| d.status == DatabaseStatus::Restoring && d.is_partnered_with(&self.address))
                    .unwrap_or(false);
                if !remote_ready {
                    return Err(self.reject(
                        statement,
                        "the remote copy has not been prepared as a mirror of this database",
                    ));
                }

                let db = self.database_mut(state, statement, database)?;
                db.partner_instances.push(partner.to_string());
                db.partner_urls.push(partner_url.to_string());
                db.mirroring_state = MirroringState::Synchronized;

                if let Some(remote) = state.server_mut(&partner)?.database_mut(database) {
                    remote.mirroring_state = MirroringState::Synchronized;
                }
                Ok(())
            }
            other => Err(self.reject(statement, format!("database is {}", other))),
        }
    }

    fn set_witness(
        &self,
        state: &mut ClusterState,
        statement: &Statement,
        database: &str,
        witness_url: &str,
    ) -> NodeResult<()> {
        let witness = match state.resolve_url(witness_url) {
            Some(server) => match &server.endpoint {
                Some(e) if e.is_started() && e.role.serves(Role::Witness) => {
                    server.address.clone()
                }
                _ => {
                    return Err(self.reject(statement, "witness endpoint is not listening"))
                }
            },
            None => {
                return Err(self.reject(
                    statement,
                    format!("server network address {} can not be reached", witness_url),
                ))
            }
        };

        let db = self.database_mut(state, statement, database)?;
        if db.partner_instances.is_empty() {
            return Err(self.reject(statement, "database is not mirrored"));
        }
        db.witness_instance = Some(witness.to_string());
        db.witness_url = Some(witness_url.to_string());
        let partners = db.partner_instances.clone();

        for partner in partners {
            if let Ok(address) = partner.parse::<NodeAddress>() {
                if let Some(remote) = state
                    .servers
                    .get_mut(&address)
                    .and_then(|s| s.database_mut(database))
                {
                    remote.witness_instance = Some(witness.to_string());
                    remote.witness_url = Some(witness_url.to_string());
                }
            }
        }
        Ok(())
    }

    fn database_mut<'s>(
        &self,
        state: &'s mut ClusterState,
        statement: &Statement,
        database: &str,
    ) -> NodeResult<&'s mut DatabaseInfo> {
        state
            .server_mut(&self.address)?
            .database_mut(database)
            .ok_or_else(|| self.reject(statement, format!("database '{}' does not exist", database)))
    }
}

impl NodeHandle for SimulatedNode {
    fn address(&self) -> &NodeAddress {
        &self.address
    }

    fn server_info(&self) -> NodeFuture<'_, ServerInfo> {
        Box::pin(async move {
            self.cluster.pause(&self.address).await;
            self.cluster
                .with_reachable(&self.address, |state| Ok(state.server(&self.address)?.info.clone()))
        })
    }

    fn database<'a>(&'a self, name: &'a str) -> NodeFuture<'a, Option<DatabaseInfo>> {
        Box::pin(async move {
            self.cluster.pause(&self.address).await;
            self.cluster.with_reachable(&self.address, |state| {
                Ok(state.server(&self.address)?.database(name).cloned())
            })
        })
    }

    fn mirroring_endpoint(&self) -> NodeFuture<'_, Option<Endpoint>> {
        Box::pin(async move {
            self.cluster.pause(&self.address).await;
            self.cluster
                .with_reachable(&self.address, |state| Ok(state.server(&self.address)?.endpoint.clone()))
        })
    }

    fn tcp_endpoint_ports(&self) -> NodeFuture<'_, Vec<u16>> {
        Box::pin(async move {
            self.cluster.pause(&self.address).await;
            self.cluster
                .with_reachable(&self.address, |state| Ok(state.server(&self.address)?.tcp_ports.clone()))
        })
    }

    fn logins(&self) -> NodeFuture<'_, Vec<String>> {
        Box::pin(async move {
            self.cluster.pause(&self.address).await;
            self.cluster
                .with_reachable(&self.address, |state| Ok(state.server(&self.address)?.logins.clone()))
        })
    }

    fn execute<'a>(&'a self, statement: &'a Statement) -> NodeFuture<'a, ()> {
        Box::pin(async move {
            self.cluster.pause(&self.address).await;
            self.cluster.with_reachable(&self.address, |state| {
                let result = self.apply(state, statement);
                state.journal.push(ExecutedStatement {
                    node: self.address.clone(),
                    statement: statement.clone(),
                    accepted: result.is_ok(),
                });
                result
            })
        })
    }
}
