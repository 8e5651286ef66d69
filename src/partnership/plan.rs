//! Dependency-ordered partnership steps.
//!
//! The handshake order is data: each step names the step that must have
//! completed before it may run.

use serde::Serialize;

use crate::endpoint::Endpoint;
use crate::node::{NodeAddress, Statement};
use crate::report::Step;

/// One `ALTER DATABASE` in the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartnershipStep {
    pub step: Step,

    /// Node the statement runs on.
    pub target: NodeAddress,

    /// Node the result is reported against.
    pub subject: NodeAddress,

    pub statement: Statement,

    /// Index of the step that must complete first.
    pub after: Option<usize>,
}

/// Ordered steps for one Primary/Mirror pair, plus the witness when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartnershipPlan {
    pub database: String,
    pub primary: NodeAddress,
    pub mirror: NodeAddress,
    pub witness: Option<NodeAddress>,
    pub steps: Vec<PartnershipStep>,
}

impl PartnershipPlan {
    /// Mirror to Primary, then Primary to Mirror, then Primary to Witness.
    pub fn for_pair(
        database: &str,
        primary: &Endpoint,
        mirror: &Endpoint,
        witness: Option<&Endpoint>,
    ) -> Self {
        let mut steps = vec![
            PartnershipStep {
                step: Step::PartnerMirror,
                target: mirror.owner.clone(),
                subject: mirror.owner.clone(),
                statement: Statement::SetPartner {
                    database: database.to_string(),
                    partner_url: primary.url(),
                },
                after: None,
            },
            PartnershipStep {
                step: Step::PartnerPrimary,
                target: primary.owner.clone(),
                subject: primary.owner.clone(),
                statement: Statement::SetPartner {
                    database: database.to_string(),
                    partner_url: mirror.url(),
                },
                after: Some(0),
            },
        ];

        if let Some(witness) = witness {
            steps.push(PartnershipStep {
                step: Step::Witness,
                target: primary.owner.clone(),
                subject: witness.owner.clone(),
                statement: Statement::SetWitness {
                    database: database.to_string(),
                    witness_url: witness.url(),
                },
                after: Some(1),
            });
        }

        Self {
            database: database.to_string(),
            primary: primary.owner.clone(),
            mirror: mirror.owner.clone(),
            witness: witness.map(|w| w.owner.clone()),
            steps,
        }
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[PartnershipStep] {
        &self.steps
    }
}
