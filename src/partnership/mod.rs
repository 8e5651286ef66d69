//! Partner and witness relationships.

mod coordinator;
mod plan;

pub use coordinator::{PartnershipCoordinator, StepOutcome};
pub use plan::{PartnershipPlan, PartnershipStep};
