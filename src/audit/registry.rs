//! Entity type tag registry used to fetch the live entity behind a record.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;

use super::error::AuditError;
use super::snapshot::Snapshot;
use super::types::AuditRecord;

/// Loads the current state of one entity type.
pub trait EntityLoader: Send + Sync {
    /// Current snapshot of the entity, or `None` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn load(&self, conn: &Connection, entity_id: &str) -> Result<Option<Snapshot>, AuditError>;
}

/// Maps entity type tags to their loaders.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    loaders: HashMap<String, Arc<dyn EntityLoader>>,
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.loaders.keys().collect();
        tags.sort();
        f.debug_struct("EntityRegistry").field("tags", &tags).finish()
    }
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader, replacing any previous one for the tag.
    pub fn register(&mut self, type_tag: impl Into<String>, loader: impl EntityLoader + 'static) {
        self.loaders.insert(type_tag.into(), Arc::new(loader));
    }

    /// Whether a loader exists for the tag.
    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.loaders.contains_key(type_tag)
    }

    /// Look up the loader for a tag.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::UnknownEntityType`] if no loader is registered.
    pub fn resolve(&self, type_tag: &str) -> Result<&dyn EntityLoader, AuditError> {
        self.loaders
            .get(type_tag)
            .map(|loader| &**loader)
            .ok_or_else(|| AuditError::UnknownEntityType(type_tag.to_string()))
    }

    /// Current state of the entity a record refers to.
    ///
    /// Unknown tags and entities that no longer exist both yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the loader's lookup fails.
    pub fn load_audited(
        &self,
        conn: &Connection,
        record: &AuditRecord,
    ) -> Result<Option<Snapshot>, AuditError> {
        match self.resolve(&record.entity_type) {
            Ok(loader) => loader.load(conn, &record.entity_id),
            Err(AuditError::UnknownEntityType(tag)) => {
                tracing::debug!(entity_type = %tag, "No loader registered for audited entity");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
