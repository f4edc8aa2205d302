//! Table-driven snapshotter shared by every registered entity type.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::application::repos::RepoError;
use crate::domain::snapshots::{DynamicRow, Scalar, SnapshotDocument, SnapshotError};
use crate::infra::db::{map_sqlx_error, marshal::row_to_dynamic};

use super::EntitySnapshotter;

/// Static description of where an entity lives and which columns a restore writes.
#[derive(Debug, Clone, Copy)]
pub struct TableDescriptor {
    pub entity_type: &'static str,
    pub table: &'static str,
    pub key: &'static str,
    pub columns: &'static [&'static str],
    pub child: Option<ChildTable>,
}

/// A one-to-many child collection captured alongside its parent.
#[derive(Debug, Clone, Copy)]
pub struct ChildTable {
    pub table: &'static str,
    pub foreign_key: &'static str,
    pub key: &'static str,
    pub columns: &'static [&'static str],
    pub reserved_key: &'static str,
}

#[derive(Debug)]
struct ChildStatements {
    table: ChildTable,
    select: String,
    upsert: String,
}

/// Snapshotter whose statements are derived once from a [`TableDescriptor`].
#[derive(Debug)]
pub struct TableSnapshotter {
    descriptor: TableDescriptor,
    select: String,
    upsert: String,
    child: Option<ChildStatements>,
}

impl TableSnapshotter {
    pub fn new(descriptor: TableDescriptor) -> Self {
        let select = format!(
            "SELECT * FROM {} WHERE {} = ? LIMIT 2",
            descriptor.table, descriptor.key
        );
        let upsert = upsert_sql(descriptor.table, descriptor.key, descriptor.columns);
        let child = descriptor.child.map(|table| ChildStatements {
            table,
            select: format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {}",
                table.table, table.foreign_key, table.key
            ),
            upsert: upsert_sql(table.table, table.key, table.columns),
        });

        Self {
            descriptor,
            select,
            upsert,
            child,
        }
    }

    async fn upsert_row(
        conn: &mut SqliteConnection,
        sql: &str,
        columns: &[&str],
        row: &DynamicRow,
    ) -> Result<(), RepoError> {
        let mut query = sqlx::query(sql);
        for column in columns {
            query = query.bind(row.value_or_null(column));
        }
        query.execute(&mut *conn).await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn prune_children(
        conn: &mut SqliteConnection,
        child: &ChildTable,
        parent_key: &Scalar,
        keep: &[DynamicRow],
    ) -> Result<u64, RepoError> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "DELETE FROM {} WHERE {} = ",
            child.table, child.foreign_key
        ));
        qb.push_bind(parent_key.clone());

        let keys: Vec<Scalar> = keep
            .iter()
            .filter_map(|row| row.get(child.key).filter(|value| !value.is_null()).cloned())
            .collect();

        if !keys.is_empty() {
            qb.push(format!(" AND {} NOT IN (", child.key));
            let mut separated = qb.separated(", ");
            for key in keys {
                separated.push_bind(key);
            }
            separated.push_unseparated(")");
        }

        let result = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EntitySnapshotter for TableSnapshotter {
    fn entity_type(&self) -> &'static str {
        self.descriptor.entity_type
    }

    async fn capture(
        &self,
        conn: &mut SqliteConnection,
        entity_id: &str,
    ) -> Result<SnapshotDocument, RepoError> {
        let rows = sqlx::query(&self.select)
            .bind(entity_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        let parent = match rows.as_slice() {
            [] => {
                return Err(SnapshotError::EntityNotFound {
                    entity_type: self.descriptor.entity_type.to_string(),
                    entity_id: entity_id.to_string(),
                }
                .into());
            }
            [row] => row_to_dynamic(row)?,
            _ => {
                return Err(SnapshotError::MultipleRows {
                    entity_type: self.descriptor.entity_type.to_string(),
                    entity_id: entity_id.to_string(),
                }
                .into());
            }
        };

        // Children are matched on the stored key value, which may be an INTEGER.
        let parent_key = parent.value_or_null(self.descriptor.key);
        let mut document = SnapshotDocument::new(parent);

        if let Some(child) = &self.child {
            let rows = sqlx::query(&child.select)
                .bind(parent_key)
                .fetch_all(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            let lines = rows
                .iter()
                .map(row_to_dynamic)
                .collect::<Result<Vec<_>, _>>()?;
            document = document.with_children(child.table.reserved_key, lines)?;
        }

        Ok(document)
    }

    async fn restore(
        &self,
        conn: &mut SqliteConnection,
        document: &SnapshotDocument,
    ) -> Result<(), RepoError> {
        let parent_key = document
            .row()
            .get(self.descriptor.key)
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| {
                SnapshotError::deserialization(format!(
                    "snapshot lacks key column `{}`",
                    self.descriptor.key
                ))
            })?;

        Self::upsert_row(conn, &self.upsert, self.descriptor.columns, document.row()).await?;

        let Some(child) = &self.child else {
            return Ok(());
        };
        let Some(lines) = document.children(child.table.reserved_key) else {
            return Ok(());
        };

        let pruned = Self::prune_children(conn, &child.table, &parent_key, lines).await?;
        if pruned > 0 {
            tracing::debug!(
                entity_type = self.descriptor.entity_type,
                child_table = child.table.table,
                pruned,
                "Removed child rows absent from snapshot"
            );
        }

        for line in lines {
            Self::upsert_row(conn, &child.upsert, child.table.columns, line).await?;
        }

        Ok(())
    }
}

fn upsert_sql(table: &str, key: &str, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    let assignments: Vec<String> = columns
        .iter()
        .filter(|column| **column != key)
        .map(|column| format!("{column} = excluded.{column}"))
        .collect();

    let action = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders}) ON CONFLICT({key}) {action}",
        columns.join(", ")
    )
}
