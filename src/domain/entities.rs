//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    snapshots::StoredSnapshot,
    types::{UndoAction, UserId},
};

/// A reversible record of one destructive change, owned by one user and valid until
/// `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UndoEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub action: UndoAction,
    pub entity_type: String,
    pub entity_id: String,
    pub snapshot: StoredSnapshot,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl UndoEntry {
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}

/// Identifies the entity a restore wrote back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoredEntity {
    pub entry_id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub action: UndoAction,
}

impl From<&UndoEntry> for RestoredEntity {
    fn from(entry: &UndoEntry) -> Self {
        Self {
            entry_id: entry.id,
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id.clone(),
            action: entry.action,
        }
    }
}
