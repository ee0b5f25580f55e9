//! Async handle over the audit database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, Transaction};
use tokio::sync::Mutex;

use super::error::AuditError;
use super::query::{AuditFilter, AuditQueryService, AuditStats, Page};
use super::schema::SCHEMA;
use super::types::AuditRecord;

/// Returns the default path for the audit database.
///
/// This is `~/.local/share/audit-trail/audit.db` on Unix systems.
#[must_use]
pub fn default_audit_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("audit-trail")
        .join("audit.db")
}

/// Shared handle to the `SQLite` database holding the audit log.
///
/// All access goes through one connection behind an async mutex; blocking work
/// runs on `spawn_blocking`. Writes to tracked entities and their audit
/// records happen together inside [`AuditLog::transaction`].
#[derive(Debug, Clone)]
pub struct AuditLog {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Open an audit log at the specified path.
    ///
    /// Creates parent directories if they don't exist and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|source| {
                    AuditError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    }
                })?;
            }
        }

        let path_clone = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, AuditError> {
            let conn =
                Connection::open(&path_clone).map_err(|source| AuditError::DatabaseOpen {
                    path: path_clone,
                    source,
                })?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| AuditError::TaskCancelled)??;

        tracing::debug!(path = %path.display(), "Opened audit database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Open an in-memory audit log for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or the schema cannot be applied.
    pub async fn open_in_memory() -> Result<Self, AuditError> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection, AuditError> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| AuditError::TaskCancelled)??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Returns the path to the database, if opened from a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a batch of SQL statements, e.g. an entity schema.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub async fn execute_batch(&self, sql: &'static str) -> Result<(), AuditError> {
        self.read(move |conn| Ok(conn.execute_batch(sql)?)).await
    }

    /// Run `f` inside one `SQLite` transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`. An error from `f`,
    /// including a failed audit write, rolls back every change made in it.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a storage error from begin or commit.
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<AuditError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<T, E> {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction().map_err(AuditError::from)?;
            let value = f(&tx)?;
            tx.commit().map_err(AuditError::from)?;
            Ok(value)
        })
        .await
        .map_err(|_| AuditError::TaskCancelled)?
    }

    /// Run a read-only closure against the connection.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`.
    pub async fn read<T, F>(&self, f: F) -> Result<T, AuditError>
    where
        F: FnOnce(&Connection) -> Result<T, AuditError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<T, AuditError> {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|_| AuditError::TaskCancelled)?
    }

    /// See [`AuditQueryService::find`].
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find(&self, id: i64) -> Result<Option<AuditRecord>, AuditError> {
        self.read(move |conn| AuditQueryService::new(conn).find(id))
            .await
    }

    /// See [`AuditQueryService::get_for_entity`].
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_for_entity(
        &self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        self.read(move |conn| AuditQueryService::new(conn).get_for_entity(&entity_type, &entity_id))
            .await
    }

    /// See [`AuditQueryService::get_by_actor`].
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_by_actor(
        &self,
        actor_id: impl Into<String>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let actor_id = actor_id.into();
        self.read(move |conn| AuditQueryService::new(conn).get_by_actor(&actor_id))
            .await
    }

    /// See [`AuditQueryService::get_recent`].
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        self.read(move |conn| AuditQueryService::new(conn).get_recent(limit))
            .await
    }

    /// See [`AuditQueryService::get_paged`].
    ///
    /// # Errors
    ///
    /// Returns an error if the page request is invalid or the query fails.
    pub async fn get_paged(
        &self,
        filter: AuditFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<AuditRecord>, AuditError> {
        self.read(move |conn| AuditQueryService::new(conn).get_paged(&filter, page, page_size))
            .await
    }

    /// See [`AuditQueryService::get_for_entity_paged`].
    ///
    /// # Errors
    ///
    /// Returns an error if the page request is invalid or the query fails.
    pub async fn get_for_entity_paged(
        &self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<AuditRecord>, AuditError> {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        self.read(move |conn| {
            AuditQueryService::new(conn).get_for_entity_paged(
                &entity_type,
                &entity_id,
                page,
                page_size,
            )
        })
        .await
    }

    /// See [`AuditQueryService::get_by_actor_paged`].
    ///
    /// # Errors
    ///
    /// Returns an error if the page request is invalid or the query fails.
    pub async fn get_by_actor_paged(
        &self,
        actor_id: impl Into<String>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<AuditRecord>, AuditError> {
        let actor_id = actor_id.into();
        self.read(move |conn| {
            AuditQueryService::new(conn).get_by_actor_paged(&actor_id, page, page_size)
        })
        .await
    }

    /// See [`AuditQueryService::get_stats`].
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_stats(&self) -> Result<AuditStats, AuditError> {
        self.read(|conn| AuditQueryService::new(conn).get_stats())
            .await
    }

    /// Count all audit records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<u64, AuditError> {
        self.read(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM audits", [], |row| row.get(0))?;
            Ok(count.unsigned_abs())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::hooks::Trackable;
    use crate::audit::recorder::ChangeRecorder;
    use crate::audit::snapshot::Snapshot;
    use crate::audit::types::{ActorContext, AuditAction};

    struct Flag(bool);

    impl Trackable for Flag {
        fn type_tag(&self) -> &str {
            "test.flag"
        }

        fn audit_key(&self) -> String {
            "1".to_string()
        }

        fn snapshot(&self) -> Snapshot {
            Snapshot::new().with("on", self.0)
        }
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let log = AuditLog::open_in_memory().await.unwrap();
        assert!(log.path().is_none());
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transaction_commits() {
        let log = AuditLog::open_in_memory().await.unwrap();

        let record = log
            .transaction(|tx| {
                ChangeRecorder::new().record_created(tx, &ActorContext::actor("u1"), &Flag(true))
            })
            .await
            .unwrap();

        assert_eq!(record.action, AuditAction::Created);
        assert_eq!(log.count().await.unwrap(), 1);
        assert_eq!(log.find(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let log = AuditLog::open_in_memory().await.unwrap();

        let result: Result<(), AuditError> = log
            .transaction(|tx| {
                ChangeRecorder::new().record_created(tx, &ActorContext::system(), &Flag(true))?;
                Err(AuditError::InvalidFilter("abort".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_async_queries() {
        let log = AuditLog::open_in_memory().await.unwrap();
        log.transaction(|tx| {
            let recorder = ChangeRecorder::new();
            let ctx = ActorContext::actor("u1");
            recorder.record_created(tx, &ctx, &Flag(false))?;
            recorder.record_updated(tx, &ctx, &Flag(true), Flag(false).snapshot())?;
            Ok::<_, AuditError>(())
        })
        .await
        .unwrap();

        let history = log.get_for_entity("test.flag", "1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, AuditAction::Created);

        let by_actor = log.get_by_actor("u1").await.unwrap();
        assert_eq!(by_actor[0].action, AuditAction::Updated);

        assert_eq!(log.get_recent(1).await.unwrap().len(), 1);

        let page = log.get_paged(AuditFilter::default(), 1, 1).await.unwrap();
        assert_eq!(page.meta.last_page, 2);

        let stats = log.get_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_action.values().sum::<u64>(), 2);
    }

    #[test]
    fn test_default_audit_path() {
        let path = default_audit_path();
        assert!(path.ends_with("audit-trail/audit.db"));
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("deep").join("audit.db");

        let log = AuditLog::open(&db_path).await.unwrap();
        assert_eq!(log.path(), Some(db_path.as_path()));
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("audit.db");

        {
            let log = AuditLog::open(&db_path).await.unwrap();
            log.transaction(|tx| {
                ChangeRecorder::new().record_created(tx, &ActorContext::system(), &Flag(true))
            })
            .await
            .unwrap();
        }

        let log = AuditLog::open(&db_path).await.unwrap();
        assert_eq!(log.count().await.unwrap(), 1);
    }
}
