//! Capture, restore and expiry of undo entries.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use thiserror::Error;
use time::Duration;
use uuid::Uuid;

use crate::application::clock::Clock;
use crate::application::repos::{NewUndoEntry, RepoError, RestoreRequest, UndoRepo};
use crate::domain::entities::{RestoredEntity, UndoEntry};
use crate::domain::snapshots::SnapshotError;
use crate::domain::types::{ConflictPolicy, UndoAction, UserId};

pub const METRIC_UNDO_CAPTURED: &str = "snapback_undo_captured_total";
pub const METRIC_UNDO_RESTORED: &str = "snapback_undo_restored_total";
pub const METRIC_UNDO_REAPED: &str = "snapback_undo_reaped_total";

pub const DEFAULT_TTL: Duration = Duration::hours(24);
pub const DEFAULT_LIST_LIMIT: u32 = 20;
pub const DEFAULT_OPERATION_TIMEOUT: StdDuration = StdDuration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFound {
    #[error("{entity_type} `{entity_id}` not found")]
    Entity {
        entity_type: String,
        entity_id: String,
    },
    /// Missing, expired and owned-by-someone-else are deliberately indistinguishable.
    #[error("undo entry not found or expired")]
    Entry,
}

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("unsupported entity type `{entity_type}`")]
    UnsupportedEntityType { entity_type: String },
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error("{entity_type} `{entity_id}` matched more than one row")]
    MultipleRows {
        entity_type: String,
        entity_id: String,
    },
    #[error("stored snapshot could not be decoded: {message}")]
    Deserialization { message: String },
    #[error("snapshot is not restorable: {message}")]
    InvalidSnapshot { message: String },
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("restore rejected: {message}")]
    Conflict { message: String },
    #[error("undo {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: StdDuration,
    },
    #[error("validation failed: {message}")]
    Validation { message: String },
    /// The pool had no free connection or SQLite reported the database locked.
    #[error("database busy: no connection available or database locked")]
    DatabaseBusy,
}

impl UndoError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<SnapshotError> for UndoError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::UnsupportedEntityType { entity_type } => {
                Self::UnsupportedEntityType { entity_type }
            }
            SnapshotError::EntityNotFound {
                entity_type,
                entity_id,
            } => Self::NotFound(NotFound::Entity {
                entity_type,
                entity_id,
            }),
            SnapshotError::MultipleRows {
                entity_type,
                entity_id,
            } => Self::MultipleRows {
                entity_type,
                entity_id,
            },
            err @ SnapshotError::ReservedColumn { .. } => Self::InvalidSnapshot {
                message: err.to_string(),
            },
            SnapshotError::Deserialization { message } => Self::Deserialization { message },
        }
    }
}

impl From<RepoError> for UndoError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Snapshot(err) => err.into(),
            RepoError::NotFound => Self::NotFound(NotFound::Entry),
            RepoError::Conflict { message } => Self::Conflict { message },
            RepoError::Timeout => Self::DatabaseBusy,
            RepoError::Persistence(message)
            | RepoError::InvalidInput { message }
            | RepoError::Integrity { message } => Self::Persistence(message),
        }
    }
}

/// Tunables for [`UndoService`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UndoOptions {
    pub ttl: Duration,
    pub default_limit: u32,
    pub max_limit: Option<u32>,
    pub operation_timeout: StdDuration,
    pub conflict_policy: ConflictPolicy,
}

impl Default for UndoOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            default_limit: DEFAULT_LIST_LIMIT,
            max_limit: None,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl From<&crate::config::UndoSettings> for UndoOptions {
    fn from(settings: &crate::config::UndoSettings) -> Self {
        Self {
            ttl: Duration::try_from(settings.ttl).unwrap_or(DEFAULT_TTL),
            default_limit: settings.list_default_limit.get(),
            max_limit: settings.list_max_limit.map(NonZeroU32::get),
            operation_timeout: settings.operation_timeout,
            conflict_policy: settings.conflict_policy,
        }
    }
}

#[derive(Clone)]
pub struct UndoService {
    repo: Arc<dyn UndoRepo>,
    clock: Arc<dyn Clock>,
    options: UndoOptions,
}

impl UndoService {
    pub fn new(repo: Arc<dyn UndoRepo>, clock: Arc<dyn Clock>, options: UndoOptions) -> Self {
        Self {
            repo,
            clock,
            options,
        }
    }

    /// Snapshot the entity's current state before a destructive change.
    ///
    /// The snapshot and the entry are written in one transaction; on any error nothing is stored.
    pub async fn create_entry(
        &self,
        user_id: &UserId,
        action: UndoAction,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<UndoEntry, UndoError> {
        if user_id.is_blank() {
            return Err(UndoError::validation("user id must not be empty"));
        }
        if entity_type.trim().is_empty() || entity_id.trim().is_empty() {
            return Err(UndoError::validation(
                "entity type and entity id must not be empty",
            ));
        }

        let created_at = self.clock.now();
        let new_entry = NewUndoEntry {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            created_at,
            expires_at: created_at + self.options.ttl,
        };

        let entry = self
            .bounded("capture", self.repo.capture_entry(new_entry))
            .await?;

        metrics::counter!(METRIC_UNDO_CAPTURED, "entity_type" => entry.entity_type.clone())
            .increment(1);
        tracing::info!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            "Captured undo entry"
        );

        Ok(entry)
    }

    /// Write the entry's snapshot back over the live entity and consume the entry.
    ///
    /// Restore bypasses per-entity business validation: the snapshot was valid when taken and is
    /// written back verbatim, even if the same record would be rejected if submitted fresh today.
    pub async fn perform_undo(
        &self,
        user_id: &UserId,
        entry_id: Uuid,
    ) -> Result<RestoredEntity, UndoError> {
        if user_id.is_blank() {
            return Err(UndoError::validation("user id must not be empty"));
        }

        let request = RestoreRequest {
            user_id: user_id.clone(),
            entry_id,
            now: self.clock.now(),
            conflict_policy: self.options.conflict_policy,
        };

        let restored = self
            .bounded("restore", self.repo.restore_entry(request))
            .await?;

        let Some(entry) = restored else {
            tracing::debug!(
                entry_id = %entry_id,
                user_id = %user_id,
                "Undo entry not found, expired or owned by another user"
            );
            return Err(NotFound::Entry.into());
        };

        metrics::counter!(METRIC_UNDO_RESTORED, "entity_type" => entry.entity_type.clone())
            .increment(1);
        tracing::info!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            "Restored entity from undo entry"
        );

        Ok(RestoredEntity::from(&entry))
    }

    /// Live entries of `user_id`, newest first.
    pub async fn list_entries(
        &self,
        user_id: &UserId,
        limit: Option<u32>,
    ) -> Result<Vec<UndoEntry>, UndoError> {
        if user_id.is_blank() {
            return Err(UndoError::validation("user id must not be empty"));
        }

        let limit = self.effective_limit(limit);
        let now = self.clock.now();
        self.bounded("list", self.repo.list_entries(user_id, now, limit))
            .await
    }

    /// Delete every entry whose expiry has passed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, UndoError> {
        let now = self.clock.now();
        let removed = self
            .bounded("purge", self.repo.delete_expired(now))
            .await?;

        if removed > 0 {
            metrics::counter!(METRIC_UNDO_REAPED).increment(removed);
            tracing::info!(expired_count = removed, "Purged expired undo entries");
        }

        Ok(removed)
    }

    pub fn effective_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.options.default_limit,
            Some(limit) => self.options.max_limit.map_or(limit, |max| limit.min(max)),
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = Result<T, RepoError>>,
    ) -> Result<T, UndoError> {
        let after = self.options.operation_timeout;
        match tokio::time::timeout(after, future).await {
            Ok(result) => result.map_err(UndoError::from),
            Err(_) => {
                tracing::warn!(operation, ?after, "Undo operation timed out");
                Err(UndoError::Timeout { operation, after })
            }
        }
    }
}
