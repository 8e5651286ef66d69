//! Topology orchestrator
//!
//! Entry points:
//! - [`Orchestrator::validate_only`]: read-only validation
//! - [`Orchestrator::plan`] then [`Orchestrator::apply`]: inspect before writing
//! - [`Orchestrator::setup_topology`]: plan and apply in one call
//! - [`Orchestrator::status`]: current state of every member
//!
//! Only a failed validation is returned as an error. Everything after it is
//! recorded in the [`RunReport`] and the run carries on with the next mirror.

mod cancel;
mod locks;
mod options;
mod plan;
mod run;
mod status;

pub use cancel::CancellationFlag;
pub use locks::KeyedLocks;
pub use options::RunOptions;
pub use plan::TopologyPlan;
pub use status::{MemberStatus, TopologyStatus};

use uuid::Uuid;

use crate::collaborators::Collaborators;
use crate::endpoint::EndpointProvisioner;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::observability::{log_event, Event};
use crate::report::RunReport;
use crate::seeding::SeedingPlanner;
use crate::topology::{ReplicaTopology, TopologySessions, TopologyValidator, ValidationResult};
use run::{report_dry_run, RunContext};

/// Drives validation, seeding, endpoints and partnerships for topologies.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    collaborators: Collaborators,
    cancel: CancellationFlag,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            cancel: CancellationFlag::new(),
        }
    }

    /// Use `cancel` as the run-scoped cancellation signal.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that cancels runs of this orchestrator.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    fn validator(&self, options: &RunOptions) -> TopologyValidator {
        TopologyValidator::new(self.collaborators.backups.clone())
            .with_shared_path(options.shared_path.clone())
            .with_backup_set(!options.backup_set.is_empty())
    }

    async fn connect(&self, topology: &ReplicaTopology, options: &RunOptions) -> TopologySessions {
        TopologySessions::connect(
            topology,
            self.collaborators.sessions.as_ref(),
            options.call_timeout(),
        )
        .await
    }

    /// Validate without writing anything.
    pub async fn validate_only(
        &self,
        topology: &ReplicaTopology,
        options: &RunOptions,
    ) -> ValidationResult {
        let sessions = self.connect(topology, options).await;
        self.validator(options).validate(topology, &sessions).await
    }

    /// Validate and compute seeding decisions. Reads only.
    pub async fn plan(&self, topology: &ReplicaTopology, options: &RunOptions) -> TopologyPlan {
        let sessions = self.connect(topology, options).await;
        let validation = self.validator(options).validate(topology, &sessions).await;

        let mut plan = TopologyPlan {
            run_id: Uuid::new_v4(),
            topology: topology.clone(),
            options: options.clone(),
            sessions,
            validation,
            decisions: Default::default(),
            primary_database: None,
        };
        if !plan.validation.ok {
            return plan;
        }

        if let Some(primary) = plan.sessions.primary() {
            plan.primary_database = primary.database(&topology.database).await.ok().flatten();
        }
        let planner = SeedingPlanner::new(self.collaborators.history.clone(), options.seeding_options());
        plan.decisions = planner.plan(topology, &plan.sessions).await;
        plan
    }

    /// Carry out a plan.
    ///
    /// Fails only when the plan did not pass validation; in that case nothing
    /// has been written.
    pub async fn apply(&self, plan: &TopologyPlan) -> OrchestratorResult<RunReport> {
        if !plan.validation.ok {
            return Err(OrchestratorError::validation(plan.validation.reason.clone()));
        }

        let run_id = plan.run_id.to_string();
        let database = plan.topology.database.as_str();
        let dry_run = if plan.options.dry_run { "true" } else { "false" };
        log_event(
            Event::RunStart,
            &[("database", database), ("dry_run", dry_run), ("run_id", run_id.as_str())],
        );

        let report = RunReport::new(plan.run_id, database);
        if plan.options.dry_run {
            report_dry_run(plan, &report);
        } else {
            let provisioner = EndpointProvisioner::new(
                self.collaborators.logins.clone(),
                plan.options.endpoint.clone(),
            );
            let context = RunContext::new(
                plan,
                &report,
                self.collaborators.backups.clone(),
                provisioner,
                self.cancel.clone(),
            );
            context.run().await?;
        }

        let summary = report.summary();
        let success = summary.success.to_string();
        let skipped = summary.skipped.to_string();
        let failed = summary.failed.to_string();
        let event = if self.cancel.is_cancelled() {
            Event::RunCancelled
        } else {
            Event::RunComplete
        };
        log_event(
            event,
            &[
                ("database", database),
                ("failed", failed.as_str()),
                ("run_id", run_id.as_str()),
                ("skipped", skipped.as_str()),
                ("success", success.as_str()),
            ],
        );
        Ok(report)
    }

    /// Plan and apply in one call.
    pub async fn setup_topology(
        &self,
        topology: &ReplicaTopology,
        options: &RunOptions,
    ) -> OrchestratorResult<RunReport> {
        let plan = self.plan(topology, options).await;
        self.apply(&plan).await
    }

    /// Current state of every member. Reads only.
    pub async fn status(&self, topology: &ReplicaTopology, options: &RunOptions) -> TopologyStatus {
        let sessions = self.connect(topology, options).await;
        status::collect(&topology.database, &sessions).await
    }
}
