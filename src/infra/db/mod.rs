//! SQLite-backed repository implementations.

pub mod entities;
pub mod marshal;
mod undo_entries;
mod util;

pub use util::map_sqlx_error;

use std::str::FromStr;
use std::sync::Arc;

use sqlx::{
    Sqlite, Transaction,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    query,
};

use self::entities::EntityRegistry;

#[derive(Clone)]
pub struct SqliteRepositories {
    pool: Arc<SqlitePool>,
    registry: Arc<EntityRegistry>,
}

impl SqliteRepositories {
    pub fn new(pool: SqlitePool, registry: EntityRegistry) -> Self {
        Self {
            pool: Arc::new(pool),
            registry: Arc::new(registry),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Open a pool with foreign keys enforced. In-memory databases live only as long as their
    /// connection, so idle connections are never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
    }

    pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
