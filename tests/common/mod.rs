//! Shared fixtures for integration tests.
//!
//! Every topology is built on a [`SimulatedCluster`]; assertions read the
//! cluster's journal and the run report.

#![allow(dead_code)]

use chrono::Utc;

use mirrorctl::collaborators::{BackupArtifact, BackupKind};
use mirrorctl::node::{DatabaseInfo, NodeAddress, RecoveryModel};
use mirrorctl::report::{OperationResult, RunReport, Status, Step};
use mirrorctl::simulated::{ServerSnapshot, SimulatedCluster};
use mirrorctl::{Orchestrator, RunOptions};

pub const DATABASE: &str = "orders";
pub const SHARE: &str = "\\\\backup01\\mirror";

pub fn addr(host: &str) -> NodeAddress {
    NodeAddress::new(host)
}

pub fn artifact(kind: BackupKind, lsn: u64) -> BackupArtifact {
    BackupArtifact {
        database: DATABASE.to_string(),
        kind,
        path: format!("{}\\{}_{}_{}.bak", SHARE, DATABASE, kind, lsn),
        first_lsn: lsn,
        last_lsn: lsn + 99,
        finished_at: Utc::now(),
    }
}

/// Full followed by one log backup.
pub fn full_and_log() -> Vec<BackupArtifact> {
    vec![artifact(BackupKind::Full, 1), artifact(BackupKind::Log, 101)]
}

/// Enterprise primary holding an online Full-recovery `orders` database with
/// a seedable backup history.
pub fn primary(host: &str) -> ServerSnapshot {
    ServerSnapshot::new(host, "Enterprise Edition (64-bit)")
        .with_database(DatabaseInfo::online(DATABASE, RecoveryModel::Full))
        .with_backup_history(full_and_log())
        .with_share(SHARE)
}

/// Empty Developer instance, same edition class as the primary.
pub fn mirror(host: &str) -> ServerSnapshot {
    ServerSnapshot::new(host, "Developer Edition (64-bit)").with_share(SHARE)
}

pub fn witness(host: &str) -> ServerSnapshot {
    ServerSnapshot::new(host, "Express Edition (64-bit)")
}

pub fn last_backup() -> RunOptions {
    RunOptions {
        use_last_backup: true,
        ..RunOptions::default()
    }
}

pub fn orchestrator(cluster: &SimulatedCluster) -> Orchestrator {
    Orchestrator::new(cluster.collaborators())
}

/// The single result recorded for `(node, step)`, if any.
pub fn result(report: &RunReport, node: &str, step: Step) -> Option<OperationResult> {
    let node = addr(node);
    let mut matching: Vec<OperationResult> = report
        .results()
        .into_iter()
        .filter(|r| r.node == node && r.step == step)
        .collect();
    assert!(
        matching.len() <= 1,
        "more than one {} result for {}: {:?}",
        step,
        node,
        matching
    );
    matching.pop()
}

pub fn status(report: &RunReport, node: &str, step: Step) -> Option<Status> {
    result(report, node, step).map(|r| r.status)
}

pub fn failures(report: &RunReport) -> Vec<OperationResult> {
    report.results().into_iter().filter(|r| r.is_failed()).collect()
}

pub fn all_skipped(report: &RunReport) -> bool {
    report.results().iter().all(|r| r.status == Status::Skipped)
}
