//! Desired topology description.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::node::{NodeAddress, Role};

/// One mirror or witness in the desired topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub address: NodeAddress,

    /// An unreachable required member aborts validation; an unreachable
    /// optional one only fails its own replica.
    #[serde(default)]
    pub required: bool,
}

impl Member {
    pub fn optional(address: NodeAddress) -> Self {
        Self {
            address,
            required: false,
        }
    }

    pub fn required(address: NodeAddress) -> Self {
        Self {
            address,
            required: true,
        }
    }
}

/// Primary, mirrors, optional witness, and the database to mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaTopology {
    pub primary: NodeAddress,
    pub mirrors: Vec<Member>,
    #[serde(default)]
    pub witness: Option<Member>,
    pub database: String,
}

impl ReplicaTopology {
    pub fn new(primary: NodeAddress, database: impl Into<String>) -> Self {
        Self {
            primary,
            mirrors: Vec::new(),
            witness: None,
            database: database.into(),
        }
    }

    pub fn with_mirror(mut self, address: NodeAddress) -> Self {
        self.mirrors.push(Member::optional(address));
        self
    }

    pub fn with_required_mirror(mut self, address: NodeAddress) -> Self {
        self.mirrors.push(Member::required(address));
        self
    }

    pub fn with_witness(mut self, address: NodeAddress) -> Self {
        self.witness = Some(Member::optional(address));
        self
    }

    pub fn with_required_witness(mut self, address: NodeAddress) -> Self {
        self.witness = Some(Member::required(address));
        self
    }

    /// Every member with its role; the primary is always required.
    pub fn members(&self) -> Vec<(Role, &NodeAddress, bool)> {
        let mut members = vec![(Role::Primary, &self.primary, true)];
        members.extend(
            self.mirrors
                .iter()
                .map(|m| (Role::Mirror, &m.address, m.required)),
        );
        if let Some(w) = &self.witness {
            members.push((Role::Witness, &w.address, w.required));
        }
        members
    }

    /// Whether `address` is one of this topology's mirrors.
    pub fn has_mirror(&self, address: &str) -> bool {
        self.mirrors
            .iter()
            .any(|m| m.address.matches_reported(address))
    }

    /// Structural checks that need no server.
    ///
    /// The same instance may not appear twice. Two instances on one host are
    /// different members.
    pub fn check_shape(&self) -> Result<(), String> {
        if self.database.trim().is_empty() {
            return Err("database name is empty".to_string());
        }
        if self.mirrors.is_empty() {
            return Err("topology has no mirror".to_string());
        }

        let mut seen = BTreeSet::new();
        for (role, address, _) in self.members() {
            let key = address.to_string().to_ascii_lowercase();
            if !seen.insert(key) {
                return Err(format!("{} is listed more than once (again as {})", address, role));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_members_in_role_order() {
        let topology = ReplicaTopology::new(addr("sql-a"), "orders")
            .with_mirror(addr("sql-b"))
            .with_required_mirror(addr("sql-c"))
            .with_witness(addr("sql-w"));

        let members = topology.members();
        assert_eq!(members.len(), 4);
        assert_eq!(members[0], (Role::Primary, &addr("sql-a"), true));
        assert_eq!(members[1], (Role::Mirror, &addr("sql-b"), false));
        assert_eq!(members[2], (Role::Mirror, &addr("sql-c"), true));
        assert_eq!(members[3], (Role::Witness, &addr("sql-w"), false));
    }

    #[test]
    fn test_self_mirroring_on_one_host_is_legal() {
        let topology = ReplicaTopology::new(addr("box\\ONE"), "orders").with_mirror(addr("box\\TWO"));
        assert!(topology.check_shape().is_ok());

        let topology = ReplicaTopology::new(addr("box,1433"), "orders").with_mirror(addr("box,1434"));
        assert!(topology.check_shape().is_ok());
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let topology = ReplicaTopology::new(addr("sql-a"), "orders").with_mirror(addr("SQL-A"));
        let err = topology.check_shape().unwrap_err();
        assert!(err.contains("more than once"));

        let topology = ReplicaTopology::new(addr("sql-a"), "orders")
            .with_mirror(addr("sql-b"))
            .with_witness(addr("sql-b"));
        assert!(topology.check_shape().is_err());
    }

    #[test]
    fn test_empty_database_and_no_mirror_rejected() {
        assert!(ReplicaTopology::new(addr("sql-a"), " ")
            .with_mirror(addr("sql-b"))
            .check_shape()
            .is_err());
        assert!(ReplicaTopology::new(addr("sql-a"), "orders").check_shape().is_err());
    }
}
