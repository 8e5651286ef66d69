//! Seeding: deciding how each replica gets its initial copy.

mod decision;
mod planner;

pub use decision::{SeedSource, SeedVerdict, SeedingDecision, SeedingMode};
pub use planner::{SeedingOptions, SeedingPlanner};
