//! Topology validation
//!
//! Decides whether a proposed primary/mirror/witness/database combination may
//! be orchestrated at all. Checks run in a fixed order and the first failure
//! wins:
//!
//! 1. Database exists on the Primary and is online (`Normal`)
//! 2. Recovery model is `Full`
//! 3. Database is not already mirrored or in an availability group
//! 4. Every reachable mirror is in the Primary's edition class
//! 5. Every required member is reachable
//!
//! Validation only reads. A failed validation means nothing was written;
//! a passed one may still carry warnings (unreachable optional members, an
//! inaccessible shared backup path).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::model::ReplicaTopology;
use super::sessions::TopologySessions;
use crate::collaborators::BackupEngine;
use crate::node::{
    with_timeout, DatabaseStatus, Edition, MirroringState, NodeAddress, NodeSession, RecoveryModel,
    Role,
};
use crate::observability::{log_event, Event};

/// Why a topology was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    /// Structural problem found without contacting any server
    InvalidTopology { message: String },

    /// The Primary could not be reached or read
    PrimaryUnreachable { error: String },

    DatabaseMissing { database: String },

    /// Database exists but is not online
    DatabaseNotNormal { status: DatabaseStatus },

    RecoveryModelNotFull {
        model: RecoveryModel,
        backup_set_supplied: bool,
    },

    /// Already mirrored by a relationship outside this topology
    AlreadyMirrored {
        state: MirroringState,
        partners: Vec<String>,
    },

    AvailabilityGroupMember { group: String },

    EditionMismatch {
        primary_edition: Edition,
        mirror: NodeAddress,
        mirror_edition: Edition,
    },

    /// A required mirror or witness could not be reached
    RequiredMemberUnreachable {
        role: Role,
        address: NodeAddress,
        error: String,
    },
}

impl ValidationFailure {
    /// Which numbered check produced this failure (0 for structural checks).
    pub fn check(&self) -> u8 {
        match self {
            Self::InvalidTopology { .. } => 0,
            Self::PrimaryUnreachable { .. }
            | Self::DatabaseMissing { .. }
            | Self::DatabaseNotNormal { .. } => 1,
            Self::RecoveryModelNotFull { .. } => 2,
            Self::AlreadyMirrored { .. } | Self::AvailabilityGroupMember { .. } => 3,
            Self::EditionMismatch { .. } => 4,
            Self::RequiredMemberUnreachable { .. } => 5,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopology { message } => write!(f, "invalid topology: {}", message),
            Self::PrimaryUnreachable { error } => write!(f, "primary is not reachable: {}", error),
            Self::DatabaseMissing { database } => {
                write!(f, "database '{}' does not exist on the primary", database)
            }
            Self::DatabaseNotNormal { status } => {
                write!(f, "database is {} on the primary; it must be Normal", status)
            }
            Self::RecoveryModelNotFull {
                model,
                backup_set_supplied,
            } => {
                if *backup_set_supplied {
                    write!(
                        f,
                        "recovery model is {}; the supplied backup set cannot seed a mirror \
                         because mirroring requires the Full recovery model",
                        model
                    )
                } else {
                    write!(f, "recovery model is {}; mirroring requires Full", model)
                }
            }
            Self::AlreadyMirrored { state, partners } => {
                write!(f, "database mirroring state is {}", state)?;
                if !partners.is_empty() {
                    write!(f, " with partners {}", partners.join(", "))?;
                }
                Ok(())
            }
            Self::AvailabilityGroupMember { group } => {
                write!(f, "database already belongs to availability group '{}'", group)
            }
            Self::EditionMismatch {
                primary_edition,
                mirror,
                mirror_edition,
            } => write!(
                f,
                "edition mismatch: primary is {} but mirror {} is {}",
                primary_edition, mirror, mirror_edition
            ),
            Self::RequiredMemberUnreachable {
                role,
                address,
                error,
            } => write!(f, "required {} {} is not reachable: {}", role, address, error),
        }
    }
}

/// Outcome of validating one topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub ok: bool,

    /// Empty when `ok`.
    pub reason: String,

    pub failure: Option<ValidationFailure>,

    /// Non-fatal findings.
    pub warnings: Vec<String>,

    /// The Primary is already partnered with members of this topology only.
    pub converged: bool,
}

impl ValidationResult {
    pub fn passed(warnings: Vec<String>, converged: bool) -> Self {
        Self {
            ok: true,
            reason: String::new(),
            failure: None,
            warnings,
            converged,
        }
    }

    pub fn failed(failure: ValidationFailure, warnings: Vec<String>) -> Self {
        Self {
            ok: false,
            reason: failure.to_string(),
            failure: Some(failure),
            warnings,
            converged: false,
        }
    }
}

/// Read-only topology validator.
pub struct TopologyValidator {
    backups: Arc<dyn BackupEngine>,
    shared_path: Option<String>,
    backup_set_supplied: bool,
}

impl TopologyValidator {
    pub fn new(backups: Arc<dyn BackupEngine>) -> Self {
        Self {
            backups,
            shared_path: None,
            backup_set_supplied: false,
        }
    }

    /// Check that the shared backup path is reachable from the partners.
    pub fn with_shared_path(mut self, shared_path: Option<String>) -> Self {
        self.shared_path = shared_path;
        self
    }

    /// The caller intends to seed from a pre-taken backup set.
    pub fn with_backup_set(mut self, supplied: bool) -> Self {
        self.backup_set_supplied = supplied;
        self
    }

    /// Validate `topology` against already opened sessions.
    pub async fn validate(
        &self,
        topology: &ReplicaTopology,
        sessions: &TopologySessions,
    ) -> ValidationResult {
        let result = self.run_checks(topology, sessions).await;

        let database = topology.database.as_str();
        if result.ok {
            log_event(Event::ValidationPassed, &[("database", database)]);
        } else {
            log_event(
                Event::ValidationFailed,
                &[("database", database), ("reason", result.reason.as_str())],
            );
        }
        for warning in &result.warnings {
            log_event(
                Event::ValidationWarning,
                &[("database", database), ("warning", warning.as_str())],
            );
        }
        result
    }

    async fn run_checks(
        &self,
        topology: &ReplicaTopology,
        sessions: &TopologySessions,
    ) -> ValidationResult {
        let mut warnings = Vec::new();

        if let Err(message) = topology.check_shape() {
            return ValidationResult::failed(ValidationFailure::InvalidTopology { message }, warnings);
        }

        // =====================================================================
        // Check 1: database exists on the Primary and is online
        // =====================================================================
        let primary = match &sessions.primary.session {
            Ok(session) => session,
            Err(e) => {
                return ValidationResult::failed(
                    ValidationFailure::PrimaryUnreachable {
                        error: e.to_string(),
                    },
                    warnings,
                )
            }
        };

        let database = match primary.database(&topology.database).await {
            Ok(Some(db)) => db,
            Ok(None) => {
                return ValidationResult::failed(
                    ValidationFailure::DatabaseMissing {
                        database: topology.database.clone(),
                    },
                    warnings,
                )
            }
            Err(e) => {
                return ValidationResult::failed(
                    ValidationFailure::PrimaryUnreachable {
                        error: e.to_string(),
                    },
                    warnings,
                )
            }
        };

        if database.status != DatabaseStatus::Normal {
            return ValidationResult::failed(
                ValidationFailure::DatabaseNotNormal {
                    status: database.status,
                },
                warnings,
            );
        }

        // =====================================================================
        // Check 2: Full recovery model
        // =====================================================================
        if database.recovery_model != RecoveryModel::Full {
            return ValidationResult::failed(
                ValidationFailure::RecoveryModelNotFull {
                    model: database.recovery_model,
                    backup_set_supplied: self.backup_set_supplied,
                },
                warnings,
            );
        }

        // =====================================================================
        // Check 3: not already replicating elsewhere
        // =====================================================================
        if let Some(group) = &database.availability_group {
            return ValidationResult::failed(
                ValidationFailure::AvailabilityGroupMember {
                    group: group.clone(),
                },
                warnings,
            );
        }

        let mut converged = false;
        if database.mirroring_state != MirroringState::None || !database.partner_instances.is_empty()
        {
            let partners_in_topology = !database.partner_instances.is_empty()
                && database
                    .partner_instances
                    .iter()
                    .all(|p| topology.has_mirror(p));
            let witness_in_topology = match (&database.witness_instance, &topology.witness) {
                (None, _) => true,
                (Some(current), Some(wanted)) => {
                    wanted.address.matches_reported(current)
                }
                (Some(_), None) => false,
            };

            if !(partners_in_topology && witness_in_topology) {
                return ValidationResult::failed(
                    ValidationFailure::AlreadyMirrored {
                        state: database.mirroring_state,
                        partners: database.partner_instances.clone(),
                    },
                    warnings,
                );
            }
            converged = true;
        }

        // =====================================================================
        // Check 4: edition class
        // =====================================================================
        let primary_edition = &primary.info().edition;
        for mirror in sessions.reachable_mirrors() {
            let mirror_edition = &mirror.info().edition;
            if mirror_edition.class() != primary_edition.class() {
                return ValidationResult::failed(
                    ValidationFailure::EditionMismatch {
                        primary_edition: primary_edition.clone(),
                        mirror: mirror.address().clone(),
                        mirror_edition: mirror_edition.clone(),
                    },
                    warnings,
                );
            }
        }

        // =====================================================================
        // Check 5: reachability
        // =====================================================================
        for member in sessions.unreachable() {
            let error = member
                .error()
                .map(|e| e.to_string())
                .unwrap_or_default();
            if member.member.required {
                return ValidationResult::failed(
                    ValidationFailure::RequiredMemberUnreachable {
                        role: member.role,
                        address: member.address().clone(),
                        error,
                    },
                    warnings,
                );
            }
            warnings.push(format!(
                "optional {} {} is not reachable: {}",
                member.role,
                member.address(),
                error
            ));
        }

        if let Some(path) = &self.shared_path {
            let mut partners: Vec<&NodeSession> = vec![primary];
            partners.extend(sessions.reachable_mirrors());
            for node in partners {
                if let Some(warning) = self.check_share(node, path).await {
                    warnings.push(warning);
                }
            }
        }

        ValidationResult::passed(warnings, converged)
    }

    async fn check_share(&self, node: &NodeSession, path: &str) -> Option<String> {
        let accessible = with_timeout(
            node.address(),
            node.timeout(),
            self.backups.share_accessible(node.handle().as_ref(), path),
        )
        .await;
        match accessible {
            Ok(true) => None,
            Ok(false) => Some(format!("shared path {} is not accessible from {}", path, node.address())),
            Err(e) => Some(format!(
                "could not check shared path {} from {}: {}",
                path,
                node.address(),
                e
            )),
        }
    }
}
