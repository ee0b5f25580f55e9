//! Audit error types.

use std::path::PathBuf;

use super::types::AuditAction;

/// Errors that can occur during audit operations.
#[derive(thiserror::Error, Debug)]
pub enum AuditError {
    /// Failed to open or create database.
    #[error("Failed to open database at {path}: {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The audit record could not be persisted.
    ///
    /// Raised inside the mutation's transaction, so the caller must let the
    /// transaction roll back.
    #[error("Failed to record {action} audit for {entity_type}: {source}")]
    StorageWrite {
        action: AuditAction,
        entity_type: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to execute SQL.
    #[error("Database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Failed to serialize data to JSON.
    #[error("JSON serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No loader is registered for the entity type tag.
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// A query filter or page request was rejected before querying.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Blocking task was cancelled.
    #[error("Blocking task cancelled")]
    TaskCancelled,

    /// Failed to create parent directory.
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuditError {
    /// Whether this error came from a failed audit insert.
    #[must_use]
    pub fn is_storage_write(&self) -> bool {
        matches!(self, Self::StorageWrite { .. })
    }

    /// Whether this error was a rejected filter.
    #[must_use]
    pub fn is_invalid_filter(&self) -> bool {
        matches!(self, Self::InvalidFilter(_))
    }
}
