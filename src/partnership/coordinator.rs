//! Partnership Coordinator
//!
//! Walks a [`PartnershipPlan`] for one Primary/Mirror pair.
//!
//! Constraints:
//! - A step runs only after the step it depends on completed
//! - Each step is attempted at most once per run
//! - Statements against the Primary database are serialized per
//!   (Primary, database) across concurrently running pairs
//!
//! Non-Responsibilities:
//! - Does not roll back a half-configured pair
//! - Does not retry
//! - Does not interrupt a statement already sent; cancellation only stops
//!   steps that have not started

use super::plan::{PartnershipPlan, PartnershipStep};
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::node::{DatabaseInfo, NodeAddress, NodeResult, NodeSession};
use crate::orchestrator::{CancellationFlag, KeyedLocks};
use crate::report::{RunReport, Step};

/// What happened to one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Statement issued and accepted.
    Applied,
    /// The relationship was already in place.
    AlreadyDone,
    /// Not attempted: cancelled or a prerequisite did not complete.
    NotRun,
    Failed,
}

impl StepOutcome {
    fn completed(&self) -> bool {
        matches!(self, StepOutcome::Applied | StepOutcome::AlreadyDone)
    }
}

/// Runs partnership plans for every pair of one run.
pub struct PartnershipCoordinator {
    primary_locks: KeyedLocks<(NodeAddress, String)>,
    cancel: CancellationFlag,
}

impl PartnershipCoordinator {
    pub fn new(cancel: CancellationFlag) -> Self {
        Self {
            primary_locks: KeyedLocks::new(),
            cancel,
        }
    }

    /// Execute `plan` against the pair's sessions.
    ///
    /// Records one result per step. Returns the first failure, if any, after
    /// every step has been reported.
    pub async fn establish(
        &self,
        plan: &PartnershipPlan,
        primary: &NodeSession,
        mirror: &NodeSession,
        report: &RunReport,
    ) -> OrchestratorResult<Vec<StepOutcome>> {
        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(plan.steps.len());
        let mut first_error: Option<OrchestratorError> = None;

        for step in plan.steps() {
            if let Some(index) = step.after {
                let prerequisite = outcomes.get(index).copied().unwrap_or(StepOutcome::NotRun);
                if !prerequisite.completed() {
                    let before = plan.steps[index].step;
                    report.skipped(
                        &step.subject,
                        step.step,
                        format!("not attempted: {} did not complete", before),
                    );
                    outcomes.push(StepOutcome::NotRun);
                    continue;
                }
            }

            if self.cancel.is_cancelled() {
                report.skipped(&step.subject, step.step, "run cancelled");
                outcomes.push(StepOutcome::NotRun);
                continue;
            }

            let session = if step.target == *primary.address() {
                primary
            } else {
                mirror
            };

            let outcome = if step.target == plan.primary {
                let _guard = self
                    .primary_locks
                    .lock(&(plan.primary.clone(), plan.database.clone()))
                    .await;
                self.run_step(plan, step, session, &outcomes, report).await
            } else {
                self.run_step(plan, step, session, &outcomes, report).await
            };

            match outcome {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    outcomes.push(StepOutcome::Failed);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    async fn run_step(
        &self,
        plan: &PartnershipPlan,
        step: &PartnershipStep,
        session: &NodeSession,
        outcomes: &[StepOutcome],
        report: &RunReport,
    ) -> OrchestratorResult<StepOutcome> {
        let current = match session.database(&plan.database).await {
            Ok(current) => current,
            Err(e) => {
                let reason = format!("cannot read database state: {}", e);
                report.failed(&step.subject, step.step, reason.clone());
                return Err(OrchestratorError::partnership(&step.subject, step.step, reason));
            }
        };

        if let Some(note) = already_done(plan, step, current.as_ref()) {
            report.skipped(&step.subject, step.step, note);
            return Ok(StepOutcome::AlreadyDone);
        }

        match self.execute(session, step).await {
            Ok(()) => {
                report.success(&step.subject, step.step, applied_note(plan, step));
                Ok(StepOutcome::Applied)
            }
            Err(e) => {
                let mut reason = e.to_string();
                let mirror_side_applied = outcomes.first().map(StepOutcome::completed).unwrap_or(false);
                if step.step == Step::PartnerPrimary && mirror_side_applied {
                    reason = format!(
                        "{}; pair is half-configured: {} points at {} but {} does not point back, \
                         correct the cause and re-run",
                        reason, plan.mirror, plan.primary, plan.primary
                    );
                }
                report.failed(&step.subject, step.step, reason.clone());
                Err(OrchestratorError::partnership(&step.subject, step.step, reason))
            }
        }
    }

    async fn execute(&self, session: &NodeSession, step: &PartnershipStep) -> NodeResult<()> {
        session.execute(&step.statement).await
    }
}

/// Skip note when the relationship `step` would create is already in place.
fn already_done(
    plan: &PartnershipPlan,
    step: &PartnershipStep,
    current: Option<&DatabaseInfo>,
) -> Option<String> {
    let db = current?;
    match step.step {
        Step::PartnerMirror if db.is_partnered_with(&plan.primary) => {
            Some(format!("already partnered with {}", plan.primary))
        }
        Step::PartnerPrimary if db.is_partnered_with(&plan.mirror) => {
            Some(format!("already partnered with {}", plan.mirror))
        }
        Step::Witness => match &plan.witness {
            Some(witness) if db.has_witness(witness) => {
                Some(format!("{} already uses witness {}", plan.primary, witness))
            }
            _ => None,
        },
        _ => None,
    }
}

fn applied_note(plan: &PartnershipPlan, step: &PartnershipStep) -> String {
    match step.step {
        Step::PartnerMirror => format!("{} now points at {}", plan.mirror, plan.primary),
        Step::PartnerPrimary => format!("{} now points at {}", plan.primary, plan.mirror),
        Step::Witness => format!("{} now uses witness {}", plan.primary, step.subject),
        _ => step.statement.to_tsql(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EncryptionAlgorithm, Endpoint, EndpointRole, EndpointState};
    use crate::node::RecoveryModel;

    fn endpoint(host: &str) -> Endpoint {
        Endpoint {
            owner: NodeAddress::new(host),
            name: "Mirroring".into(),
            role: EndpointRole::Partner,
            encryption: EncryptionAlgorithm::Aes,
            state: EndpointState::Started,
            port: 5022,
            fqdn: format!("{}.corp.local", host),
        }
    }

    fn plan() -> PartnershipPlan {
        let mut witness = endpoint("sql-w");
        witness.role = EndpointRole::Witness;
        PartnershipPlan::for_pair("orders", &endpoint("sql-a"), &endpoint("sql-b"), Some(&witness))
    }

    #[test]
    fn test_already_done_detects_partner() {
        let plan = plan();
        let mut db = DatabaseInfo::online("orders", RecoveryModel::Full);
        db.partner_instances = vec!["sql-a".into()];
        assert!(already_done(&plan, &plan.steps[0], Some(&db)).is_some());
        assert!(already_done(&plan, &plan.steps[1], Some(&db)).is_none());
    }

    #[test]
    fn test_already_done_detects_witness() {
        let plan = plan();
        let mut db = DatabaseInfo::online("orders", RecoveryModel::Full);
        assert!(already_done(&plan, &plan.steps[2], Some(&db)).is_none());
        db.witness_instance = Some("SQL-W".into());
        assert!(already_done(&plan, &plan.steps[2], Some(&db)).is_some());
    }

    #[test]
    fn test_missing_database_is_never_done() {
        let plan = plan();
        assert!(already_done(&plan, &plan.steps[0], None).is_none());
    }

    #[test]
    fn test_outcome_completion() {
        assert!(StepOutcome::Applied.completed());
        assert!(StepOutcome::AlreadyDone.completed());
        assert!(!StepOutcome::NotRun.completed());
        assert!(!StepOutcome::Failed.completed());
    }
}
