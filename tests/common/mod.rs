#![allow(dead_code)]

use std::sync::Arc;

use snapback::application::clock::ManualClock;
use snapback::application::undo::{UndoOptions, UndoService};
use snapback::domain::snapshots::DynamicRow;
use snapback::domain::types::UserId;
use snapback::infra::db::SqliteRepositories;
use snapback::infra::db::entities::EntityRegistry;
use snapback::infra::db::marshal::row_to_dynamic;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use time::macros::datetime;

const FIXTURE: &str = include_str!("../fixtures/entities.sql");

pub const START: OffsetDateTime = datetime!(2026-10-18 08:00 UTC);

pub struct Harness {
    pub pool: SqlitePool,
    pub repos: Arc<SqliteRepositories>,
    pub clock: Arc<ManualClock>,
    pub service: UndoService,
}

pub async fn harness() -> Harness {
    harness_with(UndoOptions::default()).await
}

pub async fn harness_with(options: UndoOptions) -> Harness {
    let registry = EntityRegistry::standard().expect("standard registry");
    harness_with_registry(registry, options).await
}

pub async fn harness_with_registry(registry: EntityRegistry, options: UndoOptions) -> Harness {
    let pool = memory_pool().await;
    let repos = Arc::new(SqliteRepositories::new(pool.clone(), registry));
    let clock = Arc::new(ManualClock::new(START));
    let service = UndoService::new(repos.clone(), clock.clone(), options);

    Harness {
        pool,
        repos,
        clock,
        service,
    }
}

/// Single-connection in-memory database with migrations and fixture data applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqliteRepositories::connect("sqlite::memory:", 1)
        .await
        .expect("connect in-memory sqlite");
    SqliteRepositories::run_migrations(&pool)
        .await
        .expect("run migrations");
    sqlx::raw_sql(FIXTURE)
        .execute(&pool)
        .await
        .expect("load fixture");
    pool
}

pub fn alice() -> UserId {
    UserId::from("alice")
}

pub fn bob() -> UserId {
    UserId::from("bob")
}

pub async fn fetch_row(pool: &SqlitePool, table: &str, key: &str, id: &str) -> Option<DynamicRow> {
    let sql = format!("SELECT * FROM {table} WHERE {key} = ?");
    sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .expect("fetch row")
        .map(|row| row_to_dynamic(&row).expect("marshal row"))
}

pub async fn fetch_children(
    pool: &SqlitePool,
    table: &str,
    foreign_key: &str,
    parent_id: &str,
) -> Vec<DynamicRow> {
    let sql = format!("SELECT * FROM {table} WHERE {foreign_key} = ? ORDER BY id");
    sqlx::query(&sql)
        .bind(parent_id)
        .fetch_all(pool)
        .await
        .expect("fetch children")
        .iter()
        .map(|row| row_to_dynamic(row).expect("marshal child"))
        .collect()
}

pub async fn execute(pool: &SqlitePool, sql: &str) {
    sqlx::raw_sql(sql).execute(pool).await.expect("execute sql");
}

pub async fn undo_log_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM undo_log")
        .fetch_one(pool)
        .await
        .expect("count undo_log")
}
