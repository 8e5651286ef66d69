//! Read-only view of a topology's current state.

use futures_util::future::join_all;
use serde::Serialize;

use crate::endpoint::Endpoint;
use crate::node::{DatabaseInfo, Edition, NodeAddress, Role};
use crate::topology::{MemberSession, TopologySessions};

/// What one member looks like right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberStatus {
    pub role: Role,
    pub address: NodeAddress,
    pub reachable: bool,
    pub error: Option<String>,
    pub edition: Option<Edition>,
    pub database: Option<DatabaseInfo>,
    pub endpoint: Option<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyStatus {
    pub database: String,
    pub members: Vec<MemberStatus>,
}

pub(super) async fn collect(database: &str, sessions: &TopologySessions) -> TopologyStatus {
    let members = join_all(
        sessions
            .all()
            .into_iter()
            .map(|member| member_status(database, member)),
    )
    .await;
    TopologyStatus {
        database: database.to_string(),
        members,
    }
}

async fn member_status(database: &str, member: &MemberSession) -> MemberStatus {
    let mut status = MemberStatus {
        role: member.role,
        address: member.address().clone(),
        reachable: false,
        error: member.error().map(|e| e.to_string()),
        edition: None,
        database: None,
        endpoint: None,
    };
    let session = match member.reachable() {
        Some(session) => session,
        None => return status,
    };

    status.reachable = true;
    status.edition = Some(session.info().edition.clone());
    let (db, endpoint) = tokio::join!(session.database(database), session.mirroring_endpoint());
    match (db, endpoint) {
        (Ok(db), Ok(endpoint)) => {
            status.database = db;
            status.endpoint = endpoint;
        }
        (Err(e), _) | (_, Err(e)) => status.error = Some(e.to_string()),
    }
    status
}
