//! Validation Invariant Tests
//!
//! Validation reads and never writes. Every rejected topology is rejected
//! before any statement reaches any server.
//!
//! Checks exercised, in order:
//! 1. Database exists on the primary and is online
//! 2. Full recovery model
//! 3. Not replicating outside this topology
//! 4. Mirror editions in the primary's class
//! 5. Required members reachable

mod common;

use common::*;
use mirrorctl::collaborators::BackupKind;
use mirrorctl::node::{DatabaseInfo, DatabaseStatus, MirroringState, RecoveryModel};
use mirrorctl::report::{Status, Step};
use mirrorctl::simulated::{ServerSnapshot, SimulatedCluster};
use mirrorctl::topology::ValidationFailure;
use mirrorctl::{OrchestratorError, ReplicaTopology, RunOptions};

fn topology() -> ReplicaTopology {
    ReplicaTopology::new(addr("sql-a"), DATABASE).with_mirror(addr("sql-b"))
}

fn primary_with(database: DatabaseInfo) -> ServerSnapshot {
    let mut snapshot = primary("sql-a");
    snapshot.databases = vec![database];
    snapshot
}

fn assert_untouched(cluster: &SimulatedCluster) {
    assert_eq!(cluster.ddl_count(), 0);
    assert_eq!(cluster.restore_count(), 0);
    assert_eq!(cluster.backup_count(), 0);
    assert!(cluster.created_logins().is_empty());
}

// =============================================================================
// Read-only
// =============================================================================

/// Validating a good topology sends nothing.
#[tokio::test]
async fn test_valid_topology_is_read_only() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a"))
        .with_server(mirror("sql-b"))
        .with_server(witness("sql-w"));
    let topology = topology().with_witness(addr("sql-w"));

    let result = orchestrator(&cluster)
        .validate_only(&topology, &last_backup())
        .await;

    assert!(result.ok, "{}", result.reason);
    assert!(result.failure.is_none());
    assert!(!result.converged);
    assert_untouched(&cluster);
}

/// Planning reads backup history and database state, nothing more.
#[tokio::test]
async fn test_plan_is_read_only() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a"))
        .with_server(mirror("sql-b"));

    let plan = orchestrator(&cluster).plan(&topology(), &last_backup()).await;

    assert!(plan.is_valid());
    let decision = plan.decision(&addr("sql-b")).unwrap();
    assert!(decision.needs_restore);
    assert!(!decision.needs_backup);
    assert_untouched(&cluster);
}

/// A rejected topology fails the whole run before anything is sent.
#[tokio::test]
async fn test_setup_rejected_without_side_effects() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a"))
        .with_server(ServerSnapshot::new("sql-b", "Standard Edition (64-bit)"));

    let err = orchestrator(&cluster)
        .setup_topology(&topology(), &last_backup())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Validation { .. }));
    assert_untouched(&cluster);
}

// =============================================================================
// Check 1 and 2
// =============================================================================

#[tokio::test]
async fn test_missing_database() {
    let cluster = SimulatedCluster::new()
        .with_server(ServerSnapshot::new("sql-a", "Enterprise Edition"))
        .with_server(mirror("sql-b"));

    let result = orchestrator(&cluster)
        .validate_only(&topology(), &RunOptions::default())
        .await;

    assert!(!result.ok);
    assert!(matches!(result.failure, Some(ValidationFailure::DatabaseMissing { .. })));
    assert!(result.reason.contains(DATABASE));
}

#[tokio::test]
async fn test_database_not_online() {
    let cluster = SimulatedCluster::new()
        .with_server(primary_with(DatabaseInfo::restoring(DATABASE)))
        .with_server(mirror("sql-b"));

    let result = orchestrator(&cluster)
        .validate_only(&topology(), &RunOptions::default())
        .await;

    assert_eq!(
        result.failure,
        Some(ValidationFailure::DatabaseNotNormal {
            status: DatabaseStatus::Restoring
        })
    );
}

/// Simple recovery is rejected, and the report says a backup set was given.
#[tokio::test]
async fn test_simple_recovery_model() {
    let cluster = SimulatedCluster::new()
        .with_server(primary_with(DatabaseInfo::online(DATABASE, RecoveryModel::Simple)))
        .with_server(mirror("sql-b"));
    let options = RunOptions {
        backup_set: full_and_log(),
        ..RunOptions::default()
    };

    let result = orchestrator(&cluster).validate_only(&topology(), &options).await;

    assert_eq!(
        result.failure,
        Some(ValidationFailure::RecoveryModelNotFull {
            model: RecoveryModel::Simple,
            backup_set_supplied: true,
        })
    );
    assert_untouched(&cluster);
}

// =============================================================================
// Check 3
// =============================================================================

/// Mirrored with a partner outside the topology; the reason names the state.
#[tokio::test]
async fn test_mirrored_elsewhere() {
    let mut database = DatabaseInfo::online(DATABASE, RecoveryModel::Full);
    database.mirroring_state = MirroringState::Synchronized;
    database.partner_instances = vec!["sql-x".to_string()];
    let cluster = SimulatedCluster::new()
        .with_server(primary_with(database))
        .with_server(mirror("sql-b"));

    let result = orchestrator(&cluster)
        .validate_only(&topology(), &RunOptions::default())
        .await;

    assert!(matches!(result.failure, Some(ValidationFailure::AlreadyMirrored { .. })));
    assert!(result.reason.contains("Synchronized"), "{}", result.reason);
}

/// Mirrored with a partner inside the topology is a converged re-run.
#[tokio::test]
async fn test_mirrored_within_topology_passes() {
    let mut database = DatabaseInfo::online(DATABASE, RecoveryModel::Full);
    database.mirroring_state = MirroringState::Synchronized;
    database.partner_instances = vec!["sql-b".to_string()];
    let cluster = SimulatedCluster::new()
        .with_server(primary_with(database))
        .with_server(mirror("sql-b"));

    let result = orchestrator(&cluster)
        .validate_only(&topology(), &RunOptions::default())
        .await;

    assert!(result.ok, "{}", result.reason);
    assert!(result.converged);
}

#[tokio::test]
async fn test_availability_group_member() {
    let mut database = DatabaseInfo::online(DATABASE, RecoveryModel::Full);
    database.availability_group = Some("ag-orders".to_string());
    let cluster = SimulatedCluster::new()
        .with_server(primary_with(database))
        .with_server(mirror("sql-b"));

    let result = orchestrator(&cluster)
        .validate_only(&topology(), &RunOptions::default())
        .await;

    assert_eq!(
        result.failure,
        Some(ValidationFailure::AvailabilityGroupMember {
            group: "ag-orders".to_string()
        })
    );
}

// =============================================================================
// Check 4
// =============================================================================

/// Enterprise primary with a Standard mirror; both editions in the reason.
#[tokio::test]
async fn test_edition_mismatch() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a"))
        .with_server(ServerSnapshot::new("sql-b", "Standard Edition (64-bit)"));

    let result = orchestrator(&cluster)
        .validate_only(&topology(), &RunOptions::default())
        .await;

    assert!(!result.ok);
    assert!(matches!(result.failure, Some(ValidationFailure::EditionMismatch { .. })));
    assert!(result.reason.contains("Enterprise Edition"), "{}", result.reason);
    assert!(result.reason.contains("Standard Edition"), "{}", result.reason);
    assert_untouched(&cluster);
}

/// Enterprise and Developer share a class.
#[tokio::test]
async fn test_developer_mirror_accepted() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a"))
        .with_server(mirror("sql-b"));

    let result = orchestrator(&cluster)
        .validate_only(&topology(), &RunOptions::default())
        .await;

    assert!(result.ok, "{}", result.reason);
}

// =============================================================================
// Check 5
// =============================================================================

#[tokio::test]
async fn test_required_mirror_unreachable() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a"))
        .with_server(mirror("sql-b").unreachable());
    let topology = ReplicaTopology::new(addr("sql-a"), DATABASE).with_required_mirror(addr("sql-b"));

    let result = orchestrator(&cluster)
        .validate_only(&topology, &RunOptions::default())
        .await;

    assert!(matches!(
        result.failure,
        Some(ValidationFailure::RequiredMemberUnreachable { .. })
    ));
}

/// An optional mirror that cannot be reached is only a warning.
#[tokio::test]
async fn test_optional_mirror_unreachable_warns() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a"))
        .with_server(mirror("sql-b").unreachable());

    let result = orchestrator(&cluster)
        .validate_only(&topology(), &RunOptions::default())
        .await;

    assert!(result.ok);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("sql-b"));
}

#[tokio::test]
async fn test_primary_unreachable() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a").unreachable())
        .with_server(mirror("sql-b"));

    let result = orchestrator(&cluster)
        .validate_only(&topology(), &RunOptions::default())
        .await;

    assert!(matches!(result.failure, Some(ValidationFailure::PrimaryUnreachable { .. })));
}

/// A share the mirror cannot see is reported, not fatal.
#[tokio::test]
async fn test_inaccessible_share_warns() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a"))
        .with_server(ServerSnapshot::new("sql-b", "Developer Edition"));
    let options = RunOptions {
        shared_path: Some(SHARE.to_string()),
        ..RunOptions::default()
    };

    let result = orchestrator(&cluster).validate_only(&topology(), &options).await;

    assert!(result.ok);
    assert!(result.warnings.iter().any(|w| w.contains("not accessible from sql-b")));
}

// =============================================================================
// Seeding correctness
// =============================================================================

/// A chain ending in a full backup is never restored.
#[tokio::test]
async fn test_chain_ending_in_full_never_restored() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a").with_backup_history(vec![artifact(BackupKind::Full, 1)]))
        .with_server(mirror("sql-b"));
    let orchestrator = orchestrator(&cluster);

    let plan = orchestrator.plan(&topology(), &last_backup()).await;
    let decision = plan.decision(&addr("sql-b")).unwrap();
    assert!(decision.is_blocked());
    assert!(decision
        .blocked_reason()
        .unwrap()
        .contains("ends in a Full backup"));

    let report = orchestrator.apply(&plan).await.unwrap();
    assert_eq!(status(&report, "sql-b", Step::Seed), Some(Status::Failed));
    assert!(result(&report, "sql-b", Step::PartnerMirror).is_none());
    assert_eq!(cluster.restore_count(), 0);
}

/// A differential tail is just as unusable.
#[tokio::test]
async fn test_chain_ending_in_differential_blocked() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a").with_backup_history(vec![
            artifact(BackupKind::Full, 1),
            artifact(BackupKind::Log, 101),
            artifact(BackupKind::Differential, 201),
        ]))
        .with_server(mirror("sql-b"));

    let plan = orchestrator(&cluster).plan(&topology(), &last_backup()).await;

    assert!(plan.decision(&addr("sql-b")).unwrap().is_blocked());
}

/// No backup source at all blocks seeding.
#[tokio::test]
async fn test_no_backup_source_blocked() {
    let cluster = SimulatedCluster::new()
        .with_server(primary("sql-a"))
        .with_server(mirror("sql-b"));

    let plan = orchestrator(&cluster)
        .plan(&topology(), &RunOptions::default())
        .await;

    let reason = plan.decision(&addr("sql-b")).unwrap().blocked_reason().map(String::from);
    assert!(reason.unwrap().contains("no backup source"));
}
