//! Observable orchestration events
//!
//! Events are explicit and typed. Their names are stable strings so log
//! consumers can filter on them.

use std::fmt;

/// Observable events during a topology run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Run lifecycle
    /// A run started
    RunStart,
    /// A run finished (with or without per-replica failures)
    RunComplete,
    /// Cancellation was observed; remaining steps are skipped
    RunCancelled,

    // Validation
    ValidationPassed,
    /// Topology rejected before any write
    ValidationFailed,
    /// Non-fatal validation finding
    ValidationWarning,

    // Seeding
    SeedingPlanned,

    // Endpoints
    /// Endpoint created or restarted
    EndpointReady,
    /// Witness could not be provisioned; continuing without it
    WitnessDegraded,

    // Reporting
    /// A step outcome was recorded
    StepRecorded,
    /// A step failed
    StepFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::RunStart => "MIRROR_RUN_START",
            Event::RunComplete => "MIRROR_RUN_COMPLETE",
            Event::RunCancelled => "MIRROR_RUN_CANCELLED",
            Event::ValidationPassed => "MIRROR_VALIDATION_PASSED",
            Event::ValidationFailed => "MIRROR_VALIDATION_FAILED",
            Event::ValidationWarning => "MIRROR_VALIDATION_WARNING",
            Event::SeedingPlanned => "MIRROR_SEEDING_PLANNED",
            Event::EndpointReady => "MIRROR_ENDPOINT_READY",
            Event::WitnessDegraded => "MIRROR_WITNESS_DEGRADED",
            Event::StepRecorded => "MIRROR_STEP_RECORDED",
            Event::StepFailed => "MIRROR_STEP_FAILED",
        }
    }

    /// Whether this event reports something an operator should look at.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::ValidationFailed
                | Event::ValidationWarning
                | Event::WitnessDegraded
                | Event::StepFailed
                | Event::RunCancelled
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
