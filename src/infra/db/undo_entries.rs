use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{NewUndoEntry, RepoError, RestoreRequest, UndoRepo};
use crate::domain::entities::UndoEntry;
use crate::domain::snapshots::StoredSnapshot;
use crate::domain::types::{ConflictPolicy, UserId, from_unix_millis, to_unix_millis};

use super::{SqliteRepositories, map_sqlx_error};

const SELECT_COLUMNS: &str =
    "id, user_id, action, entity_type, entity_id, snapshot, created_at, expires_at";

#[derive(sqlx::FromRow)]
struct UndoEntryRow {
    id: Uuid,
    user_id: String,
    action: String,
    entity_type: String,
    entity_id: String,
    snapshot: String,
    created_at: i64,
    expires_at: i64,
}

impl TryFrom<UndoEntryRow> for UndoEntry {
    type Error = RepoError;

    fn try_from(row: UndoEntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: UserId::from(row.user_id),
            action: row.action.parse().map_err(|err| RepoError::Integrity {
                message: format!("undo entry {}: {err}", row.id),
            })?,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            snapshot: StoredSnapshot::new(row.snapshot),
            created_at: from_unix_millis(row.created_at).map_err(RepoError::from_persistence)?,
            expires_at: from_unix_millis(row.expires_at).map_err(RepoError::from_persistence)?,
        })
    }
}

#[async_trait]
impl UndoRepo for SqliteRepositories {
    async fn capture_entry(&self, entry: NewUndoEntry) -> Result<UndoEntry, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let document = self
            .registry()
            .capture(&mut *tx, &entry.entity_type, &entry.entity_id)
            .await?;
        let snapshot = StoredSnapshot::encode(&document)?;

        sqlx::query(
            r#"
            INSERT INTO undo_log (
                id, user_id, action, entity_type, entity_id, snapshot, created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id.as_str())
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(snapshot.as_str())
        .bind(to_unix_millis(entry.created_at))
        .bind(to_unix_millis(entry.expires_at))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(UndoEntry {
            id: entry.id,
            user_id: entry.user_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            snapshot,
            created_at: entry.created_at,
            expires_at: entry.expires_at,
        })
    }

    async fn restore_entry(
        &self,
        request: RestoreRequest,
    ) -> Result<Option<UndoEntry>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let row: Option<UndoEntryRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM undo_log WHERE id = ? AND user_id = ? AND expires_at > ?"
        ))
        .bind(request.entry_id)
        .bind(request.user_id.as_str())
        .bind(to_unix_millis(request.now))
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let entry = UndoEntry::try_from(row)?;

        if request.conflict_policy == ConflictPolicy::RejectNewer {
            let newer: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM undo_log WHERE entity_type = ? AND entity_id = ? AND created_at > ?",
            )
            .bind(&entry.entity_type)
            .bind(&entry.entity_id)
            .bind(to_unix_millis(entry.created_at))
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if newer > 0 {
                return Err(RepoError::conflict(format!(
                    "{} `{}` was modified after this entry was recorded",
                    entry.entity_type, entry.entity_id
                )));
            }
        }

        let document = entry.snapshot.decode()?;
        self.registry()
            .restore(&mut *tx, &entry.entity_type, &document)
            .await?;

        let deleted = sqlx::query("DELETE FROM undo_log WHERE id = ?")
            .bind(entry.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        // Another restore consumed the entry first; dropping the transaction discards our writes.
        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(entry))
    }

    async fn list_entries(
        &self,
        user_id: &UserId,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<UndoEntry>, RepoError> {
        let rows: Vec<UndoEntryRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM undo_log \
             WHERE user_id = ? AND expires_at > ? \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(user_id.as_str())
        .bind(to_unix_millis(now))
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(UndoEntry::try_from).collect()
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM undo_log WHERE expires_at <= ?")
            .bind(to_unix_millis(now))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
