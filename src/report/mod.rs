//! Result reporting
//!
//! Every component emits [`OperationResult`]s into the run's [`RunReport`].
//! Only topology-level validation aborts a run; every other failure lands
//! here as a `Failed` record and the run moves on to the next replica.

mod reporter;
mod result;

pub use reporter::{RunReport, RunSummary};
pub use result::{OperationResult, Status, Step};
