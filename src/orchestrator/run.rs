//! Applying a plan.
//!
//! Order of work for one run:
//!
//! 1. Report optional members that could not be reached
//! 2. Prepare the Primary endpoint, then the witness (drop, endpoint, grants)
//! 3. Grant the Primary endpoint to its partners
//! 4. Per mirror, bounded in parallel: seed, endpoint, grants, partnership
//!
//! A failure on one mirror is recorded and never stops the others. The
//! witness only degrades the run.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{OnceCell, Semaphore};

use super::cancel::CancellationFlag;
use super::plan::TopologyPlan;
use crate::collaborators::{BackupArtifact, BackupEngine, BackupKind, RestoreOptions};
use crate::endpoint::{Endpoint, EndpointProvisioner};
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::node::{with_timeout, NodeSession, Role, Statement};
use crate::observability::{log_event, Event};
use crate::partnership::{PartnershipCoordinator, PartnershipPlan};
use crate::report::{RunReport, Step};
use crate::seeding::{SeedSource, SeedingDecision};

/// State shared by every task of one apply.
pub(super) struct RunContext<'a> {
    plan: &'a TopologyPlan,
    report: &'a RunReport,
    backups: Arc<dyn BackupEngine>,
    provisioner: EndpointProvisioner,
    coordinator: PartnershipCoordinator,
    cancel: CancellationFlag,

    /// Taken at most once per run, shared by every mirror that needs it.
    fresh_backup: OnceCell<Result<Vec<BackupArtifact>, String>>,
}

/// A witness that is ready to be attached.
struct ReadyWitness<'a> {
    session: &'a NodeSession,
    endpoint: Endpoint,
}

impl<'a> RunContext<'a> {
    pub(super) fn new(
        plan: &'a TopologyPlan,
        report: &'a RunReport,
        backups: Arc<dyn BackupEngine>,
        provisioner: EndpointProvisioner,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            plan,
            report,
            backups,
            provisioner,
            coordinator: PartnershipCoordinator::new(cancel.clone()),
            cancel,
            fresh_backup: OnceCell::new(),
        }
    }

    fn database(&self) -> &str {
        &self.plan.topology.database
    }

    fn seeding_timeout(&self) -> Duration {
        self.plan.options.seeding_timeout()
    }

    /// Mirrors that will be worked on: reachable and not blocked.
    fn active_mirrors(&self) -> Vec<&'a NodeSession> {
        let plan = self.plan;
        plan.sessions
            .reachable_mirrors()
            .into_iter()
            .filter(|m| {
                plan.decision(m.address())
                    .map(|d| !d.is_blocked())
                    .unwrap_or(false)
            })
            .collect()
    }

    pub(super) async fn run(&self) -> OrchestratorResult<()> {
        let plan = self.plan;
        let primary = plan
            .sessions
            .primary()
            .ok_or_else(|| OrchestratorError::validation("primary is not reachable"))?;

        for member in plan.sessions.unreachable() {
            let error = member.error().map(|e| e.to_string()).unwrap_or_default();
            self.report.failed(member.address(), Step::Connect, error);
        }

        if self.cancel.is_cancelled() {
            self.report.skipped(primary.address(), Step::Endpoint, "run cancelled");
            self.abandon_replicas("run cancelled", plan.sessions.witness());
            return Ok(());
        }

        let primary_endpoint = match self.provisioner.ensure_endpoint(primary, Role::Primary, self.report).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let reason = format!("primary endpoint unavailable ({})", e);
                self.abandon_replicas(&reason, plan.sessions.witness());
                return Ok(());
            }
        };

        let witness = self.prepare_witness(primary).await;

        let mut peers: Vec<&NodeSession> = self.active_mirrors();
        if let Some(witness) = &witness {
            peers.push(witness.session);
        }
        if plan.fully_converged() {
            self.report
                .skipped(primary.address(), Step::Grant, "partnership already established");
        } else if self
            .provisioner
            .grant_connect(primary, &primary_endpoint, &peers, self.report)
            .await
            .is_err()
        {
            self.abandon_replicas(
                "primary endpoint grants failed",
                witness.as_ref().map(|w| w.session),
            );
            return Ok(());
        }

        let semaphore = Semaphore::new(plan.options.max_parallel.max(1));
        let semaphore = &semaphore;
        let primary_endpoint = &primary_endpoint;
        let witness = witness.as_ref();
        join_all(plan.sessions.reachable_mirrors().into_iter().map(|mirror| async move {
            let _permit = semaphore.acquire().await.ok();
            // recorded in the report already
            let _ = self.run_mirror(primary, primary_endpoint, mirror, witness).await;
        }))
        .await;

        Ok(())
    }

    /// Gives every reachable replica an outcome when the Primary cannot take
    /// partners. Blocked mirrors keep their own reason.
    fn abandon_replicas(&self, reason: &str, witness: Option<&NodeSession>) {
        let plan = self.plan;
        for mirror in plan.sessions.reachable_mirrors() {
            let address = mirror.address();
            match plan.decision(address).and_then(SeedingDecision::blocked_reason) {
                Some(blocked) => {
                    self.report.failed(address, Step::Seed, blocked);
                }
                None => {
                    self.report
                        .skipped(address, Step::Seed, format!("not attempted: {}", reason));
                }
            }
        }
        if let Some(witness) = witness {
            self.report.skipped(
                witness.address(),
                Step::Witness,
                format!("not attempted: {}", reason),
            );
        }
    }

    async fn prepare_witness(&self, primary: &'a NodeSession) -> Option<ReadyWitness<'a>> {
        let plan = self.plan;
        let session = plan.sessions.witness()?;
        let address = session.address();

        if self.cancel.is_cancelled() {
            self.report.skipped(address, Step::Witness, "run cancelled");
            return None;
        }

        if let Some(decision) = plan.decision(address) {
            if let Some(reason) = decision.blocked_reason() {
                self.report.failed(address, Step::Seed, reason);
                self.degrade_witness(session, reason);
                return None;
            }
            if decision.drop_existing {
                let statement = Statement::DropDatabase {
                    database: self.database().to_string(),
                };
                match session.execute(&statement).await {
                    Ok(()) => {
                        self.report
                            .success(address, Step::DropExisting, "dropped copy held by the witness");
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        self.report.failed(address, Step::DropExisting, reason.clone());
                        self.degrade_witness(session, &reason);
                        return None;
                    }
                }
            }
        }

        let endpoint = match self.provisioner.ensure_endpoint(session, Role::Witness, self.report).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.degrade_witness(session, &e.to_string());
                return None;
            }
        };

        if plan.fully_converged() {
            self.report
                .skipped(address, Step::Grant, "partnership already established");
        } else {
            let mut peers = vec![primary];
            peers.extend(self.active_mirrors());
            if let Err(e) = self
                .provisioner
                .grant_connect(session, &endpoint, &peers, self.report)
                .await
            {
                self.degrade_witness(session, &e.to_string());
                return None;
            }
        }

        Some(ReadyWitness { session, endpoint })
    }

    fn degrade_witness(&self, witness: &NodeSession, reason: &str) {
        let node = witness.address().to_string();
        self.report.skipped(
            witness.address(),
            Step::Witness,
            format!("continuing without witness: {}", reason),
        );
        log_event(
            Event::WitnessDegraded,
            &[
                ("database", self.database()),
                ("node", node.as_str()),
                ("reason", reason),
            ],
        );
    }

    async fn run_mirror(
        &self,
        primary: &NodeSession,
        primary_endpoint: &Endpoint,
        mirror: &NodeSession,
        witness: Option<&ReadyWitness<'a>>,
    ) -> OrchestratorResult<()> {
        let plan = self.plan;
        let address = mirror.address();

        let decision = match plan.decision(address) {
            Some(decision) => decision,
            None => {
                let reason = "no seeding decision was planned";
                self.report.failed(address, Step::Seed, reason);
                return Err(OrchestratorError::seeding(address, reason));
            }
        };

        self.check_cancelled(mirror, Step::Seed)?;
        self.seed(primary, mirror, decision).await?;

        self.check_cancelled(mirror, Step::Endpoint)?;
        let endpoint = self
            .provisioner
            .ensure_endpoint(mirror, Role::Mirror, self.report)
            .await?;

        if plan.pair_converged(address) {
            self.report
                .skipped(address, Step::Grant, "partnership already established");
        } else {
            let mut peers = vec![primary];
            peers.extend(witness.map(|w| w.session));
            self.provisioner
                .grant_connect(mirror, &endpoint, &peers, self.report)
                .await?;
        }

        let pair = PartnershipPlan::for_pair(
            self.database(),
            primary_endpoint,
            &endpoint,
            witness.map(|w| &w.endpoint),
        );
        self.coordinator
            .establish(&pair, primary, mirror, self.report)
            .await?;
        Ok(())
    }

    fn check_cancelled(&self, node: &NodeSession, step: Step) -> OrchestratorResult<()> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }
        self.report.skipped(node.address(), step, "run cancelled");
        Err(OrchestratorError::Cancelled {
            node: node.address().clone(),
            step,
        })
    }

    async fn seed(
        &self,
        primary: &NodeSession,
        mirror: &NodeSession,
        decision: &SeedingDecision,
    ) -> OrchestratorResult<()> {
        let address = mirror.address();

        if let Some(reason) = decision.blocked_reason() {
            self.report.failed(address, Step::Seed, reason);
            return Err(OrchestratorError::seeding(address, reason));
        }
        if decision.is_converged() {
            self.report
                .skipped(address, Step::Seed, "already part of this topology");
            return Ok(());
        }

        if decision.drop_existing {
            let statement = Statement::DropDatabase {
                database: self.database().to_string(),
            };
            if let Err(e) = mirror.execute(&statement).await {
                let reason = e.to_string();
                self.report.failed(address, Step::DropExisting, reason.clone());
                return Err(OrchestratorError::seeding(address, reason));
            }
            self.report
                .success(address, Step::DropExisting, "dropped unaffiliated copy");
        }

        let artifacts = match &decision.source {
            SeedSource::ReuseRestoring => {
                self.report.skipped(
                    address,
                    Step::Seed,
                    "reusing copy left RESTORING by an earlier run",
                );
                return Ok(());
            }
            SeedSource::None => {
                self.report
                    .skipped(address, Step::Seed, "engine seeds the mirror itself");
                return Ok(());
            }
            SeedSource::FreshBackup { shared_path } => {
                let taken = self
                    .fresh_backup
                    .get_or_init(|| self.take_fresh_backup(primary, shared_path))
                    .await;
                match taken {
                    Ok(artifacts) => artifacts.clone(),
                    Err(reason) => {
                        let reason = format!("fresh backup unavailable: {}", reason);
                        self.report.failed(address, Step::Seed, reason.clone());
                        return Err(OrchestratorError::seeding(address, reason));
                    }
                }
            }
            other => other.artifacts().map(<[BackupArtifact]>::to_vec).unwrap_or_default(),
        };

        self.check_cancelled(mirror, Step::Restore)?;
        let options = RestoreOptions {
            with_replace: false,
            no_recovery: true,
        };
        let restored = with_timeout(
            address,
            self.seeding_timeout(),
            self.backups
                .restore(mirror.handle().as_ref(), &artifacts, options),
        )
        .await;

        match restored {
            Ok(()) => {
                self.report.success(
                    address,
                    Step::Restore,
                    format!("restored {} backup files WITH NORECOVERY", artifacts.len()),
                );
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.report.failed(address, Step::Restore, reason.clone());
                Err(OrchestratorError::connection(address, e))
            }
        }
    }

    /// Full then log backup of the Primary into `shared_path`.
    async fn take_fresh_backup(
        &self,
        primary: &NodeSession,
        shared_path: &str,
    ) -> Result<Vec<BackupArtifact>, String> {
        let address = primary.address();
        let mut artifacts = Vec::with_capacity(2);

        for kind in [BackupKind::Full, BackupKind::Log] {
            let taken = with_timeout(
                address,
                self.seeding_timeout(),
                self.backups
                    .backup(primary.handle().as_ref(), self.database(), kind, shared_path),
            )
            .await;
            match taken {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    let reason = format!("{} backup failed: {}", kind, e);
                    self.report.failed(address, Step::Backup, reason.clone());
                    return Err(reason);
                }
            }
        }

        self.report.success(
            address,
            Step::Backup,
            format!("full and log backup written to {}", shared_path),
        );
        Ok(artifacts)
    }
}

/// Records what a run would do without doing any of it.
pub(super) fn report_dry_run(plan: &TopologyPlan, report: &RunReport) {
    let primary = &plan.topology.primary;

    for member in plan.sessions.unreachable() {
        let error = member.error().map(|e| e.to_string()).unwrap_or_default();
        report.failed(member.address(), Step::Connect, error);
    }

    report.skipped(primary, Step::Validate, "dry run: topology is valid");
    report.skipped(primary, Step::Endpoint, "dry run: would ensure a started endpoint");

    for mirror in plan.sessions.reachable_mirrors() {
        let address = mirror.address();
        let decision = match plan.decision(address) {
            Some(decision) => decision,
            None => continue,
        };
        if let Some(reason) = decision.blocked_reason() {
            report.failed(address, Step::Seed, reason);
            continue;
        }
        report.skipped(address, Step::Seed, format!("dry run: {}", decision));
        if plan.pair_converged(address) {
            report.skipped(address, Step::PartnerMirror, "dry run: already partnered");
            continue;
        }
        report.skipped(address, Step::Endpoint, "dry run: would ensure a started endpoint");
        report.skipped(
            address,
            Step::PartnerMirror,
            format!("dry run: would set partner to {}", primary),
        );
        report.skipped(
            primary,
            Step::PartnerPrimary,
            format!("dry run: would set partner to {}", address),
        );
    }

    if let Some(witness) = plan.sessions.witness() {
        let address = witness.address();
        match plan.decision(address).and_then(SeedingDecision::blocked_reason) {
            Some(reason) => {
                report.failed(address, Step::Seed, reason);
            }
            None if plan.fully_converged() => {
                report.skipped(address, Step::Witness, "dry run: witness already attached");
            }
            None if plan.witness_attached() => {
                report.skipped(
                    address,
                    Step::Grant,
                    "dry run: would grant CONNECT to new partners",
                );
            }
            None => {
                report.skipped(address, Step::Endpoint, "dry run: would ensure a started endpoint");
                report.skipped(
                    address,
                    Step::Witness,
                    format!("dry run: would attach witness to {}", primary),
                );
            }
        }
    }
}
