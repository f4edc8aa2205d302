//! Registry of entity types that can be snapshotted and restored.

mod descriptor;
mod devices;
mod ecos;
mod inventory;
mod ncrs;
mod purchase_orders;
mod quotes;
mod rmas;
mod vendors;
mod work_orders;

pub use descriptor::{ChildTable, TableDescriptor, TableSnapshotter};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqliteConnection;
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::snapshots::{SnapshotDocument, SnapshotError};

/// Capture and restore for one entity type, always on a caller-provided connection so both run
/// inside the caller's transaction.
#[async_trait]
pub trait EntitySnapshotter: Send + Sync {
    fn entity_type(&self) -> &'static str;

    async fn capture(
        &self,
        conn: &mut SqliteConnection,
        entity_id: &str,
    ) -> Result<SnapshotDocument, RepoError>;

    async fn restore(
        &self,
        conn: &mut SqliteConnection,
        document: &SnapshotDocument,
    ) -> Result<(), RepoError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("entity type `{entity_type}` is already registered")]
    DuplicateEntityType { entity_type: String },
}

#[derive(Default, Clone)]
pub struct EntityRegistry {
    snapshotters: HashMap<&'static str, Arc<dyn EntitySnapshotter>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in entity type.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for descriptor in [
            ecos::DESCRIPTOR,
            work_orders::DESCRIPTOR,
            ncrs::DESCRIPTOR,
            devices::DESCRIPTOR,
            inventory::DESCRIPTOR,
            rmas::DESCRIPTOR,
            vendors::DESCRIPTOR,
            quotes::DESCRIPTOR,
            purchase_orders::DESCRIPTOR,
        ] {
            registry.register(Arc::new(TableSnapshotter::new(descriptor)))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, snapshotter: Arc<dyn EntitySnapshotter>) -> Result<(), RegistryError> {
        let entity_type = snapshotter.entity_type();
        if self.snapshotters.contains_key(entity_type) {
            return Err(RegistryError::DuplicateEntityType {
                entity_type: entity_type.to_string(),
            });
        }
        self.snapshotters.insert(entity_type, snapshotter);
        Ok(())
    }

    pub fn supports(&self, entity_type: &str) -> bool {
        self.snapshotters.contains_key(entity_type)
    }

    /// Registered tags, sorted.
    pub fn entity_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.snapshotters.keys().copied().collect();
        types.sort_unstable();
        types
    }

    fn lookup(&self, entity_type: &str) -> Result<&Arc<dyn EntitySnapshotter>, SnapshotError> {
        self.snapshotters
            .get(entity_type)
            .ok_or_else(|| SnapshotError::unsupported(entity_type))
    }

    pub async fn capture(
        &self,
        conn: &mut SqliteConnection,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<SnapshotDocument, RepoError> {
        self.lookup(entity_type)?.capture(conn, entity_id).await
    }

    pub async fn restore(
        &self,
        conn: &mut SqliteConnection,
        entity_type: &str,
        document: &SnapshotDocument,
    ) -> Result<(), RepoError> {
        self.lookup(entity_type)?.restore(conn, document).await
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entity_types", &self.entity_types())
            .finish()
    }
}
