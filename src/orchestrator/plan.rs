//! Inspectable plan produced before anything is written.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use uuid::Uuid;

use super::options::RunOptions;
use crate::node::{DatabaseInfo, NodeAddress};
use crate::seeding::SeedingDecision;
use crate::topology::{ReplicaTopology, TopologySessions, ValidationResult};

/// Validation outcome, per-replica seeding decisions and the sessions they
/// were computed over.
///
/// Callers can inspect a plan and then hand it to
/// [`Orchestrator::apply`](super::Orchestrator::apply), or drop it.
#[derive(Debug)]
pub struct TopologyPlan {
    pub run_id: Uuid,
    pub topology: ReplicaTopology,
    pub options: RunOptions,
    pub sessions: TopologySessions,
    pub validation: ValidationResult,

    /// Empty when validation failed.
    pub decisions: BTreeMap<NodeAddress, SeedingDecision>,

    /// The Primary's copy as read while planning.
    pub primary_database: Option<DatabaseInfo>,
}

impl TopologyPlan {
    pub fn is_valid(&self) -> bool {
        self.validation.ok
    }

    pub fn decision(&self, replica: &NodeAddress) -> Option<&SeedingDecision> {
        self.decisions.get(replica)
    }

    /// Both sides of the pair already point at each other.
    pub fn pair_converged(&self, mirror: &NodeAddress) -> bool {
        let mirror_side = self
            .decision(mirror)
            .map(SeedingDecision::is_converged)
            .unwrap_or(false);
        let primary_side = self
            .primary_database
            .as_ref()
            .map(|db| db.is_partnered_with(mirror))
            .unwrap_or(false);
        mirror_side && primary_side
    }

    /// The Primary already uses the topology's witness, or there is none.
    pub fn witness_attached(&self) -> bool {
        match &self.topology.witness {
            None => true,
            Some(witness) => self
                .primary_database
                .as_ref()
                .map(|db| db.has_witness(&witness.address))
                .unwrap_or(false),
        }
    }

    /// Every reachable mirror is partnered and the witness is attached.
    pub fn fully_converged(&self) -> bool {
        self.is_valid()
            && self.witness_attached()
            && self
                .sessions
                .reachable_mirrors()
                .iter()
                .all(|m| self.pair_converged(m.address()))
    }

    /// JSON view for callers and the CLI.
    pub fn summary(&self) -> Value {
        let decisions: Vec<Value> = self
            .decisions
            .values()
            .map(|d| {
                json!({
                    "replica": d.replica.to_string(),
                    "role": d.role.as_str(),
                    "needs_backup": d.needs_backup,
                    "needs_restore": d.needs_restore,
                    "drop_existing": d.drop_existing,
                    "mode": d.mode,
                    "source": d.source,
                    "verdict": d.verdict,
                    "summary": d.to_string(),
                })
            })
            .collect();

        let unreachable: Vec<Value> = self
            .sessions
            .unreachable()
            .into_iter()
            .map(|m| {
                json!({
                    "role": m.role.as_str(),
                    "address": m.address().to_string(),
                    "error": m.error().map(|e| e.to_string()),
                })
            })
            .collect();

        json!({
            "run_id": self.run_id.to_string(),
            "database": self.topology.database,
            "primary": self.topology.primary.to_string(),
            "validation": self.validation,
            "converged": self.fully_converged(),
            "unreachable": unreachable,
            "decisions": decisions,
        })
    }
}
