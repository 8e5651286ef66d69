//! Opening one session per topology member.

use std::time::Duration;

use futures_util::future::join_all;

use super::model::{Member, ReplicaTopology};
use crate::collaborators::SessionProvider;
use crate::node::{with_timeout, NodeAddress, NodeError, NodeResult, NodeSession, Role};

/// A member and the outcome of opening its session.
#[derive(Debug, Clone)]
pub struct MemberSession {
    pub role: Role,
    pub member: Member,
    pub session: NodeResult<NodeSession>,
}

impl MemberSession {
    pub fn address(&self) -> &NodeAddress {
        &self.member.address
    }

    pub fn reachable(&self) -> Option<&NodeSession> {
        self.session.as_ref().ok()
    }

    pub fn error(&self) -> Option<&NodeError> {
        self.session.as_ref().err()
    }
}

/// Sessions for every member of one topology, opened concurrently.
///
/// Created once per run and owned by it. An unreachable member is kept with
/// its error so later stages can report it against the right node.
#[derive(Debug, Clone)]
pub struct TopologySessions {
    pub primary: MemberSession,
    pub mirrors: Vec<MemberSession>,
    pub witness: Option<MemberSession>,
}

impl TopologySessions {
    pub async fn connect(
        topology: &ReplicaTopology,
        provider: &dyn SessionProvider,
        timeout: Duration,
    ) -> Self {
        let primary = Member::required(topology.primary.clone());
        let primary = open_member(Role::Primary, primary, provider, timeout);
        let mirrors = join_all(
            topology
                .mirrors
                .iter()
                .cloned()
                .map(|m| open_member(Role::Mirror, m, provider, timeout)),
        );
        let witness = async {
            match topology.witness.clone() {
                Some(w) => Some(open_member(Role::Witness, w, provider, timeout).await),
                None => None,
            }
        };

        let (primary, mirrors, witness) = tokio::join!(primary, mirrors, witness);
        Self {
            primary,
            mirrors,
            witness,
        }
    }

    pub fn primary(&self) -> Option<&NodeSession> {
        self.primary.reachable()
    }

    pub fn witness(&self) -> Option<&NodeSession> {
        self.witness.as_ref().and_then(MemberSession::reachable)
    }

    /// Every member, primary first, witness last.
    pub fn all(&self) -> Vec<&MemberSession> {
        let mut all = vec![&self.primary];
        all.extend(self.mirrors.iter());
        all.extend(self.witness.iter());
        all
    }

    pub fn reachable_mirrors(&self) -> Vec<&NodeSession> {
        self.mirrors.iter().filter_map(MemberSession::reachable).collect()
    }

    /// Members whose session could not be opened.
    pub fn unreachable(&self) -> Vec<&MemberSession> {
        self.all().into_iter().filter(|m| m.session.is_err()).collect()
    }
}

async fn open_member(
    role: Role,
    member: Member,
    provider: &dyn SessionProvider,
    timeout: Duration,
) -> MemberSession {
    let session = open_session(&member.address, provider, timeout).await;
    MemberSession {
        role,
        member,
        session,
    }
}

async fn open_session(
    address: &NodeAddress,
    provider: &dyn SessionProvider,
    timeout: Duration,
) -> NodeResult<NodeSession> {
    let handle = with_timeout(address, timeout, provider.open(address)).await?;
    NodeSession::open(handle, timeout).await
}
