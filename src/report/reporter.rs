//! Run-scoped result collector.
//!
//! Pure aggregation: components hand their outcomes to the report and move
//! on. Recording never fails and never decides anything.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::result::{OperationResult, Status, Step};
use crate::node::NodeAddress;
use crate::observability::{Event, Logger};

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Ordered list of every outcome emitted during one run.
#[derive(Debug)]
pub struct RunReport {
    run_id: Uuid,
    database: String,
    results: Mutex<Vec<OperationResult>>,
}

impl RunReport {
    pub fn new(run_id: Uuid, database: impl Into<String>) -> Self {
        Self {
            run_id,
            database: database.into(),
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Append one outcome and return a copy of it.
    pub fn record(
        &self,
        node: &NodeAddress,
        step: Step,
        status: Status,
        notes: impl Into<String>,
    ) -> OperationResult {
        let notes = notes.into();
        let result = {
            let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
            let result = OperationResult {
                run_id: self.run_id,
                sequence: results.len() as u64,
                timestamp: Utc::now(),
                node: node.clone(),
                database: self.database.clone(),
                step,
                status,
                notes,
            };
            results.push(result.clone());
            result
        };

        let node = result.node.to_string();
        let fields = [
            ("database", result.database.as_str()),
            ("node", node.as_str()),
            ("notes", result.notes.as_str()),
            ("status", result.status.as_str()),
            ("step", result.step.as_str()),
        ];
        match status {
            Status::Failed => Logger::error(Event::StepFailed.as_str(), &fields),
            _ => Logger::info(Event::StepRecorded.as_str(), &fields),
        }
        result
    }

    pub fn success(&self, node: &NodeAddress, step: Step, notes: impl Into<String>) -> OperationResult {
        self.record(node, step, Status::Success, notes)
    }

    pub fn skipped(&self, node: &NodeAddress, step: Step, notes: impl Into<String>) -> OperationResult {
        self.record(node, step, Status::Skipped, notes)
    }

    pub fn failed(&self, node: &NodeAddress, step: Step, notes: impl Into<String>) -> OperationResult {
        self.record(node, step, Status::Failed, notes)
    }

    /// Snapshot of every result in emission order.
    pub fn results(&self) -> Vec<OperationResult> {
        self.results.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Results for one node, in emission order.
    pub fn for_node(&self, node: &NodeAddress) -> Vec<OperationResult> {
        self.results()
            .into_iter()
            .filter(|r| &r.node == node)
            .collect()
    }

    /// Results grouped by (node, database), each group in emission order.
    pub fn by_key(&self) -> BTreeMap<(NodeAddress, String), Vec<OperationResult>> {
        let mut grouped: BTreeMap<(NodeAddress, String), Vec<OperationResult>> = BTreeMap::new();
        for result in self.results() {
            grouped
                .entry((result.node.clone(), result.database.clone()))
                .or_default()
                .push(result);
        }
        grouped
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for result in self.results() {
            match result.status {
                Status::Success => summary.success += 1,
                Status::Skipped => summary.skipped += 1,
                Status::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.results().iter().any(OperationResult::is_failed)
    }

    pub fn len(&self) -> usize {
        self.results.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the report, keeping only the results.
    pub fn into_results(self) -> Vec<OperationResult> {
        self.results.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> NodeAddress {
        NodeAddress::new(s)
    }

    #[test]
    fn test_sequence_is_emission_order() {
        let report = RunReport::new(Uuid::new_v4(), "orders");
        report.success(&addr("sql-b"), Step::PartnerMirror, "");
        report.success(&addr("sql-a"), Step::PartnerPrimary, "");
        report.skipped(&addr("sql-a"), Step::Witness, "no witness");

        let results = report.results();
        assert_eq!(results.len(), 3);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.sequence, i as u64);
            assert_eq!(r.database, "orders");
        }
        assert!(results[0].timestamp <= results[1].timestamp);
        assert!(results[1].timestamp <= results[2].timestamp);
    }

    #[test]
    fn test_by_key_groups_per_node() {
        let report = RunReport::new(Uuid::new_v4(), "orders");
        report.success(&addr("sql-b"), Step::Restore, "");
        report.success(&addr("sql-a"), Step::Endpoint, "");
        report.success(&addr("sql-b"), Step::PartnerMirror, "");

        let grouped = report.by_key();
        let b = &grouped[&(addr("sql-b"), "orders".to_string())];
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].step, Step::Restore);
        assert_eq!(b[1].step, Step::PartnerMirror);
    }

    #[test]
    fn test_summary_and_failures() {
        let report = RunReport::new(Uuid::new_v4(), "orders");
        assert!(report.is_empty());
        report.success(&addr("sql-b"), Step::Restore, "");
        report.skipped(&addr("sql-c"), Step::Seed, "converged");
        assert!(!report.has_failures());
        report.failed(&addr("sql-d"), Step::Connect, "unreachable");

        assert_eq!(
            report.summary(),
            RunSummary {
                success: 1,
                skipped: 1,
                failed: 1
            }
        );
        assert!(report.has_failures());
        assert_eq!(report.for_node(&addr("sql-d")).len(), 1);
    }
}
