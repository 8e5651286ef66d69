//! Node capability trait and the timed session wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::errors::{NodeError, NodeResult};
use super::statement::Statement;
use super::types::{DatabaseInfo, NodeAddress, ServerInfo};
use crate::endpoint::Endpoint;

/// Boxed future returned by node and collaborator calls.
pub type NodeFuture<'a, T> = Pin<Box<dyn Future<Output = NodeResult<T>> + Send + 'a>>;

/// A live, authenticated session to one server instance.
///
/// The capability set is fixed: a handful of reads and one execute. Whether
/// the node acts as Primary, Mirror or Witness is decided by the topology,
/// never by the handle type.
pub trait NodeHandle: Send + Sync {
    /// Identity of the instance behind this session.
    fn address(&self) -> &NodeAddress;

    /// Version, edition, service account and naming facts.
    fn server_info(&self) -> NodeFuture<'_, ServerInfo>;

    /// Look a database up by name. `None` if it does not exist on this node.
    fn database<'a>(&'a self, name: &'a str) -> NodeFuture<'a, Option<DatabaseInfo>>;

    /// The database mirroring endpoint, looked up by type rather than name.
    fn mirroring_endpoint(&self) -> NodeFuture<'_, Option<Endpoint>>;

    /// Listener ports of every TCP endpoint on the instance.
    fn tcp_endpoint_ports(&self) -> NodeFuture<'_, Vec<u16>>;

    /// Server login names.
    fn logins(&self) -> NodeFuture<'_, Vec<String>>;

    /// Execute one statement.
    fn execute<'a>(&'a self, statement: &'a Statement) -> NodeFuture<'a, ()>;
}

/// Shared handle to a node, owned by one orchestration run.
pub type SharedNode = Arc<dyn NodeHandle>;

/// Await `fut`, failing with [`NodeError::Timeout`] after `timeout`.
pub async fn with_timeout<T, F>(address: &NodeAddress, timeout: Duration, fut: F) -> NodeResult<T>
where
    F: Future<Output = NodeResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(NodeError::Timeout {
            address: address.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// An opened node: the handle, its server facts, and the per-call timeout.
///
/// Every call made through a session is bounded individually. A stalled
/// node therefore fails only the work that depends on it.
#[derive(Clone)]
pub struct NodeSession {
    handle: SharedNode,
    info: ServerInfo,
    timeout: Duration,
}

impl NodeSession {
    /// Read server facts and wrap the handle.
    pub async fn open(handle: SharedNode, timeout: Duration) -> NodeResult<Self> {
        let address = handle.address().clone();
        let info = with_timeout(&address, timeout, handle.server_info()).await?;
        Ok(Self {
            handle,
            info,
            timeout,
        })
    }

    pub fn address(&self) -> &NodeAddress {
        self.handle.address()
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn handle(&self) -> &SharedNode {
        &self.handle
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn database(&self, name: &str) -> NodeResult<Option<DatabaseInfo>> {
        with_timeout(self.address(), self.timeout, self.handle.database(name)).await
    }

    pub async fn mirroring_endpoint(&self) -> NodeResult<Option<Endpoint>> {
        with_timeout(self.address(), self.timeout, self.handle.mirroring_endpoint()).await
    }

    pub async fn tcp_endpoint_ports(&self) -> NodeResult<Vec<u16>> {
        with_timeout(self.address(), self.timeout, self.handle.tcp_endpoint_ports()).await
    }

    pub async fn logins(&self) -> NodeResult<Vec<String>> {
        with_timeout(self.address(), self.timeout, self.handle.logins()).await
    }

    pub async fn execute(&self, statement: &Statement) -> NodeResult<()> {
        with_timeout(self.address(), self.timeout, self.handle.execute(statement)).await
    }
}

impl std::fmt::Debug for NodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSession")
            .field("address", self.address())
            .field("edition", &self.info.edition)
            .field("timeout", &self.timeout)
            .finish()
    }
}
