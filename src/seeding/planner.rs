//! Seeding planner
//!
//! Computes, per replica, whether the database has to be copied and from
//! where. The planner reads only: it never backs up, restores or drops
//! anything, so every expensive decision is visible before any I/O happens.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::OnceCell;

use super::decision::{SeedSource, SeedingDecision, SeedingMode};
use crate::collaborators::{chain_is_seedable, BackupArtifact, BackupHistory};
use crate::node::{with_timeout, DatabaseStatus, NodeAddress, NodeSession, Role};
use crate::observability::{log_event, Event};
use crate::topology::{ReplicaTopology, TopologySessions};

/// Inputs that steer seeding.
#[derive(Debug, Clone, Default)]
pub struct SeedingOptions {
    /// Seed from the Primary's most recent full+log chain.
    pub use_last_backup: bool,
    /// Replace unaffiliated copies that already exist on a replica.
    pub force: bool,
    pub mode: SeedingMode,
    /// Pre-taken backups, oldest first.
    pub backup_set: Vec<BackupArtifact>,
    /// Where a fresh backup is written when nothing else is usable.
    pub shared_path: Option<String>,
}

type ChainCell = OnceCell<Result<Vec<BackupArtifact>, String>>;

pub struct SeedingPlanner {
    history: Arc<dyn BackupHistory>,
    options: SeedingOptions,
}

impl SeedingPlanner {
    pub fn new(history: Arc<dyn BackupHistory>, options: SeedingOptions) -> Self {
        Self { history, options }
    }

    pub fn options(&self) -> &SeedingOptions {
        &self.options
    }

    /// Plan every reachable mirror and the witness.
    ///
    /// Unreachable replicas get no decision; they are reported by the caller
    /// as connection failures.
    pub async fn plan(
        &self,
        topology: &ReplicaTopology,
        sessions: &TopologySessions,
    ) -> BTreeMap<NodeAddress, SeedingDecision> {
        let database = topology.database.as_str();
        let mut decisions = BTreeMap::new();

        let primary = match sessions.primary() {
            Some(primary) => primary,
            None => {
                for mirror in sessions.reachable_mirrors() {
                    let decision = SeedingDecision::blocked(
                        mirror.address(),
                        Role::Mirror,
                        self.options.mode,
                        "primary is not reachable",
                    );
                    decisions.insert(mirror.address().clone(), decision);
                }
                return decisions;
            }
        };

        // the history chain is looked up at most once per plan
        let chain = ChainCell::new();

        let mirror_decisions = join_all(
            sessions
                .reachable_mirrors()
                .into_iter()
                .map(|mirror| self.plan_mirror(primary, mirror, database, &chain)),
        )
        .await;

        for decision in mirror_decisions {
            decisions.insert(decision.replica.clone(), decision);
        }

        if let Some(witness) = sessions.witness() {
            let decision = self.plan_witness(witness, database).await;
            decisions.insert(decision.replica.clone(), decision);
        }

        for decision in decisions.values() {
            let replica = decision.replica.to_string();
            let summary = decision.to_string();
            log_event(
                Event::SeedingPlanned,
                &[
                    ("database", database),
                    ("decision", summary.as_str()),
                    ("replica", replica.as_str()),
                ],
            );
        }
        decisions
    }

    /// Decide for one mirror.
    async fn plan_mirror(
        &self,
        primary: &NodeSession,
        mirror: &NodeSession,
        database: &str,
        chain: &ChainCell,
    ) -> SeedingDecision {
        let address = mirror.address();
        let mode = self.options.mode;

        let existing = match mirror.database(database).await {
            Ok(existing) => existing,
            Err(e) => {
                return SeedingDecision::blocked(
                    address,
                    Role::Mirror,
                    mode,
                    format!("cannot read database state: {}", e),
                )
            }
        };

        let drop_existing = match existing {
            Some(db) if db.is_partnered_with(primary.address()) => {
                return SeedingDecision::converged(address, Role::Mirror, mode);
            }
            Some(db) if db.is_replicating() => {
                return SeedingDecision::blocked(
                    address,
                    Role::Mirror,
                    mode,
                    format!(
                        "database '{}' on {} is already mirrored ({}) with {}",
                        database,
                        address,
                        db.mirroring_state,
                        db.partner_instances.join(", ")
                    ),
                );
            }
            Some(db) if db.status == DatabaseStatus::Restoring && !self.options.force => {
                return SeedingDecision::reuse_restoring(address, mode);
            }
            Some(_) if !self.options.force => {
                return SeedingDecision::blocked(
                    address,
                    Role::Mirror,
                    mode,
                    format!(
                        "database '{}' already exists on {}, use Force to replace it",
                        database, address
                    ),
                );
            }
            Some(_) => true,
            None => false,
        };

        if mode == SeedingMode::Automatic {
            return SeedingDecision {
                drop_existing,
                ..SeedingDecision::nothing(address, Role::Mirror, mode)
            };
        }

        match self.source(primary, database, chain).await {
            Ok(source) => SeedingDecision::restore(address, mode, source, drop_existing),
            Err(reason) => SeedingDecision::blocked(address, Role::Mirror, mode, reason),
        }
    }

    /// The witness never holds data; an existing copy there is in the way.
    async fn plan_witness(&self, witness: &NodeSession, database: &str) -> SeedingDecision {
        let address = witness.address();
        let mode = self.options.mode;

        match witness.database(database).await {
            Ok(None) => SeedingDecision::nothing(address, Role::Witness, mode),
            Ok(Some(_)) if self.options.force => SeedingDecision {
                drop_existing: true,
                ..SeedingDecision::nothing(address, Role::Witness, mode)
            },
            Ok(Some(_)) => SeedingDecision::blocked(
                address,
                Role::Witness,
                mode,
                format!(
                    "database '{}' already exists on witness {}, use Force to drop it",
                    database, address
                ),
            ),
            Err(e) => SeedingDecision::blocked(
                address,
                Role::Witness,
                mode,
                format!("cannot read database state: {}", e),
            ),
        }
    }

    async fn source(
        &self,
        primary: &NodeSession,
        database: &str,
        chain: &ChainCell,
    ) -> Result<SeedSource, String> {
        if self.options.use_last_backup {
            let artifacts = chain
                .get_or_init(|| self.lookup_chain(primary, database))
                .await
                .clone()?;
            chain_is_seedable(&artifacts).map_err(|e| format!("last backup chain unusable: {}", e))?;
            return Ok(SeedSource::LastBackupChain { artifacts });
        }

        if !self.options.backup_set.is_empty() {
            chain_is_seedable(&self.options.backup_set)
                .map_err(|e| format!("supplied backup set unusable: {}", e))?;
            return Ok(SeedSource::BackupSet {
                artifacts: self.options.backup_set.clone(),
            });
        }

        match &self.options.shared_path {
            Some(shared_path) => Ok(SeedSource::FreshBackup {
                shared_path: shared_path.clone(),
            }),
            None => Err(
                "no backup source: use the last backup, supply a backup set, or configure a shared path"
                    .to_string(),
            ),
        }
    }

    async fn lookup_chain(
        &self,
        primary: &NodeSession,
        database: &str,
    ) -> Result<Vec<BackupArtifact>, String> {
        with_timeout(
            primary.address(),
            primary.timeout(),
            self.history
                .last_backup_chain(primary.handle().as_ref(), database),
        )
        .await
        .map_err(|e| format!("backup history unavailable: {}", e))
    }
}
