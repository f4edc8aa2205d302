//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::UndoEntry;
use crate::domain::snapshots::SnapshotError;
use crate::domain::types::{ConflictPolicy, UndoAction, UserId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

/// Everything needed to capture an entity and persist the resulting entry.
#[derive(Debug, Clone)]
pub struct NewUndoEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub action: UndoAction,
    pub entity_type: String,
    pub entity_id: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub user_id: UserId,
    pub entry_id: Uuid,
    pub now: OffsetDateTime,
    pub conflict_policy: ConflictPolicy,
}

#[async_trait]
pub trait UndoRepo: Send + Sync {
    /// Snapshot the live entity and insert the entry, atomically. Nothing is written on failure.
    async fn capture_entry(&self, entry: NewUndoEntry) -> Result<UndoEntry, RepoError>;

    /// Write the entry's snapshot back and delete the entry, atomically.
    ///
    /// Returns `Ok(None)` when no live entry with that id belongs to the user.
    async fn restore_entry(&self, request: RestoreRequest)
    -> Result<Option<UndoEntry>, RepoError>;

    /// Live entries of one user, newest first.
    async fn list_entries(
        &self,
        user_id: &UserId,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<UndoEntry>, RepoError>;

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}
