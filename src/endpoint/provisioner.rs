//! Endpoint provisioning
//!
//! Makes sure every participating node has a started mirroring endpoint and
//! that each node's endpoint accepts connections from the identities its
//! partners run as.
//!
//! Creation is serialized per node. Listener ports are allocated per host so
//! two instances sharing a machine never get the same port within a run.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::identity::grant_identity;
use super::types::{Endpoint, EndpointRole, EndpointSettings, EndpointState};
use crate::collaborators::LoginManager;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::node::{with_timeout, NodeAddress, NodeResult, NodeSession, Role, Statement};
use crate::observability::{log_event, Event};
use crate::orchestrator::KeyedLocks;
use crate::report::{RunReport, Step};

/// Creates, starts and secures mirroring endpoints for one run.
pub struct EndpointProvisioner {
    logins: Arc<dyn LoginManager>,
    settings: EndpointSettings,
    node_locks: KeyedLocks<NodeAddress>,

    /// ports handed out during this run, one entry per host
    allocated: Mutex<Vec<(NodeAddress, BTreeSet<u16>)>>,

    /// node -> endpoint outcome, so a node is provisioned at most once per run
    ensured: Mutex<HashMap<NodeAddress, Result<Endpoint, String>>>,

    /// (node, identity) pairs already granted during this run
    granted: Mutex<HashSet<(NodeAddress, String)>>,
}

impl EndpointProvisioner {
    pub fn new(logins: Arc<dyn LoginManager>, settings: EndpointSettings) -> Self {
        Self {
            logins,
            settings,
            node_locks: KeyedLocks::new(),
            allocated: Mutex::new(Vec::new()),
            ensured: Mutex::new(HashMap::new()),
            granted: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &EndpointSettings {
        &self.settings
    }

    /// Ensure `session` has a started endpoint able to serve `role`.
    ///
    /// Records exactly one `Endpoint` result for the node. A failure on the
    /// witness is not essential; any other failure is.
    pub async fn ensure_endpoint(
        &self,
        session: &NodeSession,
        role: Role,
        report: &RunReport,
    ) -> OrchestratorResult<Endpoint> {
        let address = session.address();
        let essential = role != Role::Witness;
        let _guard = self.node_locks.lock(address).await;

        if let Some(previous) = self.cached(address) {
            return previous.map_err(|reason| OrchestratorError::provisioning(address, reason, essential));
        }

        let outcome = self.provision(session, role).await;
        let result = match &outcome {
            Ok((endpoint, note, changed)) => {
                if *changed {
                    report.success(address, Step::Endpoint, note.clone());
                } else {
                    report.skipped(address, Step::Endpoint, note.clone());
                }
                let node = address.to_string();
                let url = endpoint.url();
                log_event(
                    Event::EndpointReady,
                    &[("node", node.as_str()), ("url", url.as_str())],
                );
                Ok(endpoint.clone())
            }
            Err(reason) => {
                report.failed(address, Step::Endpoint, reason.clone());
                Err(reason.clone())
            }
        };

        self.ensured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.clone(), result.clone());
        result.map_err(|reason| OrchestratorError::provisioning(address, reason, essential))
    }

    /// Grant CONNECT on `endpoint` to every distinct identity among `peers`.
    ///
    /// Logins are created first where missing. Records one `Grant` result for
    /// the node.
    pub async fn grant_connect(
        &self,
        session: &NodeSession,
        endpoint: &Endpoint,
        peers: &[&NodeSession],
        report: &RunReport,
    ) -> OrchestratorResult<()> {
        let address = session.address();

        let mut identities: Vec<String> = Vec::new();
        for peer in peers {
            if peer.address() == address {
                continue;
            }
            let identity = match grant_identity(peer.info()) {
                Some(identity) => identity,
                None => {
                    let reason = format!(
                        "cannot resolve the network identity of {}: service account '{}' \
                         runs as the machine account but the host has no domain",
                        peer.address(),
                        peer.info().service_account
                    );
                    report.failed(address, Step::Grant, reason.clone());
                    return Err(OrchestratorError::provisioning(address, reason, true));
                }
            };
            if identities.iter().any(|i| i.eq_ignore_ascii_case(&identity)) {
                continue;
            }
            identities.push(identity);
        }

        if identities.is_empty() {
            report.skipped(address, Step::Grant, "no partners to grant");
            return Ok(());
        }

        let mut applied = Vec::new();
        for identity in &identities {
            let key = (address.clone(), identity.to_ascii_lowercase());
            if self
                .granted
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(&key)
            {
                continue;
            }
            if let Err(e) = self.grant_one(session, endpoint, identity).await {
                let reason = format!("granting CONNECT to {} failed: {}", identity, e);
                report.failed(address, Step::Grant, reason.clone());
                return Err(OrchestratorError::provisioning(address, reason, true));
            }
            self.granted
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key);
            applied.push(identity.as_str());
        }

        if applied.is_empty() {
            report.skipped(address, Step::Grant, "CONNECT already granted in this run");
        } else {
            report.success(
                address,
                Step::Grant,
                format!("granted CONNECT on {} to {}", endpoint.name, applied.join(", ")),
            );
        }
        Ok(())
    }

    fn cached(&self, address: &NodeAddress) -> Option<Result<Endpoint, String>> {
        self.ensured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .cloned()
    }

    /// Returns the endpoint, a note for the report, and whether DDL was issued.
    async fn provision(&self, session: &NodeSession, role: Role) -> Result<(Endpoint, String, bool), String> {
        let existing = session
            .mirroring_endpoint()
            .await
            .map_err(|e| format!("cannot read mirroring endpoint: {}", e))?;

        match existing {
            Some(endpoint) if !endpoint.role.serves(role) => Err(format!(
                "existing endpoint {} has role {} and cannot serve a {}",
                endpoint.name,
                endpoint.role.as_tsql(),
                role
            )),
            Some(endpoint) if endpoint.is_started() => {
                let note = format!("endpoint {} already started at {}", endpoint.name, endpoint.url());
                Ok((endpoint, note, false))
            }
            Some(mut endpoint) => {
                let previous = endpoint.state;
                session
                    .execute(&Statement::StartEndpoint {
                        name: endpoint.name.clone(),
                    })
                    .await
                    .map_err(|e| format!("starting endpoint {} failed: {}", endpoint.name, e))?;
                endpoint.state = EndpointState::Started;
                let note = format!(
                    "started existing endpoint {} ({}) at {}",
                    endpoint.name,
                    previous,
                    endpoint.url()
                );
                Ok((endpoint, note, true))
            }
            None => {
                let endpoint = self.create(session, role).await?;
                let note = format!(
                    "created endpoint {} at {} ({})",
                    endpoint.name,
                    endpoint.url(),
                    endpoint.encryption.as_tsql()
                );
                Ok((endpoint, note, true))
            }
        }
    }

    async fn create(&self, session: &NodeSession, role: Role) -> Result<Endpoint, String> {
        let in_use = session
            .tcp_endpoint_ports()
            .await
            .map_err(|e| format!("cannot list endpoint ports: {}", e))?;
        let port = self.allocate_port(session.address(), &in_use)?;

        let endpoint = Endpoint {
            owner: session.address().clone(),
            name: self.settings.name.clone(),
            role: EndpointRole::for_member(role),
            encryption: self.settings.encryption,
            state: EndpointState::Started,
            port,
            fqdn: session.info().fqdn.clone(),
        };

        // created stopped, then cycled so the listener comes up clean
        let statements = [
            Statement::CreateEndpoint {
                name: endpoint.name.clone(),
                port,
                role: endpoint.role,
                encryption: endpoint.encryption,
            },
            Statement::StopEndpoint {
                name: endpoint.name.clone(),
            },
            Statement::StartEndpoint {
                name: endpoint.name.clone(),
            },
        ];
        for statement in &statements {
            session
                .execute(statement)
                .await
                .map_err(|e| format!("{} failed: {}", statement.kind(), e))?;
        }
        Ok(endpoint)
    }

    /// First port at or above the base port that is neither listening on the
    /// instance nor already handed out on the same host in this run.
    fn allocate_port(&self, address: &NodeAddress, in_use: &[u16]) -> Result<u16, String> {
        let mut allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
        let index = match allocated.iter().position(|(host, _)| host.same_host(address)) {
            Some(index) => index,
            None => {
                allocated.push((address.clone(), BTreeSet::new()));
                allocated.len() - 1
            }
        };
        let taken = &mut allocated[index].1;

        let mut port = self.settings.base_port;
        while in_use.contains(&port) || taken.contains(&port) {
            port = port
                .checked_add(1)
                .ok_or_else(|| format!("no free listener port at or above {}", self.settings.base_port))?;
        }
        taken.insert(port);
        Ok(port)
    }

    async fn grant_one(&self, session: &NodeSession, endpoint: &Endpoint, identity: &str) -> NodeResult<()> {
        with_timeout(
            session.address(),
            session.timeout(),
            self.logins.ensure_login(session.handle().as_ref(), identity),
        )
        .await?;
        session
            .execute(&Statement::GrantConnect {
                endpoint: endpoint.name.clone(),
                login: identity.to_string(),
            })
            .await
    }
}
