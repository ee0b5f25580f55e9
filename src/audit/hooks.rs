//! Lifecycle hooks that tracked entities call around their mutations.

use rusqlite::Connection;

use super::error::AuditError;
use super::recorder::ChangeRecorder;
use super::snapshot::Snapshot;
use super::types::{ActorContext, AuditRecord};

/// An entity whose lifecycle is audited.
pub trait Trackable {
    /// Stable type tag stored as `entity_type`, e.g. `blog.post`.
    fn type_tag(&self) -> &str;

    /// Primary key rendered as text.
    fn audit_key(&self) -> String;

    /// Current attribute values.
    fn snapshot(&self) -> Snapshot;
}

/// Trigger interface between a repository and the [`ChangeRecorder`].
///
/// Call `before_*` before the mutation is applied to capture the prior state,
/// then the matching `after_*` on the same transaction once the mutation has
/// been written.
#[derive(Debug, Clone, Copy)]
pub struct AuditHooks {
    recorder: ChangeRecorder,
    skip_unchanged_updates: bool,
}

impl Default for AuditHooks {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AuditHooks {
    /// Create hooks with the given unchanged-update policy.
    #[must_use]
    pub const fn new(skip_unchanged_updates: bool) -> Self {
        Self {
            recorder: ChangeRecorder::new(),
            skip_unchanged_updates,
        }
    }

    /// Whether updates without attribute changes are left out of the trail.
    #[must_use]
    pub const fn skips_unchanged_updates(&self) -> bool {
        self.skip_unchanged_updates
    }

    /// # Errors
    ///
    /// Returns [`AuditError::StorageWrite`] if the record cannot be written.
    pub fn after_create<E: Trackable + ?Sized>(
        &self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
    ) -> Result<AuditRecord, AuditError> {
        self.recorder.record_created(conn, ctx, entity)
    }

    /// Capture the state an update starts from.
    #[must_use]
    pub fn before_update<E: Trackable + ?Sized>(&self, entity: &E) -> Snapshot {
        entity.snapshot()
    }

    /// Record an update against the snapshot taken by [`Self::before_update`].
    ///
    /// Returns `None` when nothing changed and the policy skips such updates.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StorageWrite`] if the record cannot be written.
    pub fn after_update<E: Trackable + ?Sized>(
        &self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
        prior: Snapshot,
    ) -> Result<Option<AuditRecord>, AuditError> {
        if self.skip_unchanged_updates && prior.diff(&entity.snapshot()).is_empty() {
            tracing::trace!(
                entity_type = entity.type_tag(),
                entity_id = %entity.audit_key(),
                "Skipping audit for unchanged update"
            );
            return Ok(None);
        }
        self.recorder
            .record_updated(conn, ctx, entity, prior)
            .map(Some)
    }

    /// Capture the state a delete removes.
    #[must_use]
    pub fn before_delete<E: Trackable + ?Sized>(&self, entity: &E) -> Snapshot {
        entity.snapshot()
    }

    /// Record a delete. Exactly one record is written: `force_deleted` for a
    /// permanent purge, `deleted` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StorageWrite`] if the record cannot be written.
    pub fn after_delete<E: Trackable + ?Sized>(
        &self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
        snapshot: Snapshot,
        is_force_delete: bool,
    ) -> Result<AuditRecord, AuditError> {
        if is_force_delete {
            self.recorder
                .record_force_deleted(conn, ctx, entity, snapshot)
        } else {
            self.recorder.record_deleted(conn, ctx, entity, snapshot)
        }
    }

    /// # Errors
    ///
    /// Returns [`AuditError::StorageWrite`] if the record cannot be written.
    pub fn after_restore<E: Trackable + ?Sized>(
        &self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
    ) -> Result<AuditRecord, AuditError> {
        self.recorder.record_restored(conn, ctx, entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::schema::SCHEMA;
    use crate::audit::types::AuditAction;

    struct Tag {
        name: String,
    }

    impl Trackable for Tag {
        fn type_tag(&self) -> &str {
            "test.tag"
        }

        fn audit_key(&self) -> String {
            self.name.clone()
        }

        fn snapshot(&self) -> Snapshot {
            Snapshot::new().with("name", &self.name)
        }
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM audits", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_unchanged_update_skipped_by_default() {
        let conn = setup();
        let hooks = AuditHooks::default();
        let tag = Tag {
            name: "rust".to_string(),
        };

        let prior = hooks.before_update(&tag);
        let record = hooks
            .after_update(&conn, &ActorContext::system(), &tag, prior)
            .unwrap();

        assert!(hooks.skips_unchanged_updates());
        assert!(record.is_none());
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_unchanged_update_recorded_when_policy_off() {
        let conn = setup();
        let hooks = AuditHooks::new(false);
        let tag = Tag {
            name: "rust".to_string(),
        };

        let prior = hooks.before_update(&tag);
        let record = hooks
            .after_update(&conn, &ActorContext::system(), &tag, prior)
            .unwrap()
            .unwrap();

        assert_eq!(record.action, AuditAction::Updated);
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_changed_update_recorded() {
        let conn = setup();
        let hooks = AuditHooks::default();
        let mut tag = Tag {
            name: "rust".to_string(),
        };

        let prior = hooks.before_update(&tag);
        tag.name = "go".to_string();
        let record = hooks
            .after_update(&conn, &ActorContext::actor("u1"), &tag, prior)
            .unwrap()
            .unwrap();

        assert_eq!(
            record.before_values.unwrap().get("name").unwrap().as_str(),
            Some("rust")
        );
        assert_eq!(
            record.after_values.unwrap().get("name").unwrap().as_str(),
            Some("go")
        );
    }

    #[test]
    fn test_after_delete_routes_by_kind() {
        let conn = setup();
        let hooks = AuditHooks::default();
        let tag = Tag {
            name: "old".to_string(),
        };
        let ctx = ActorContext::system();

        let soft = hooks
            .after_delete(&conn, &ctx, &tag, hooks.before_delete(&tag), false)
            .unwrap();
        let hard = hooks
            .after_delete(&conn, &ctx, &tag, hooks.before_delete(&tag), true)
            .unwrap();

        assert_eq!(soft.action, AuditAction::Deleted);
        assert_eq!(hard.action, AuditAction::ForceDeleted);
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn test_after_create_and_restore() {
        let conn = setup();
        let hooks = AuditHooks::default();
        let tag = Tag {
            name: "new".to_string(),
        };
        let ctx = ActorContext::system();

        let created = hooks.after_create(&conn, &ctx, &tag).unwrap();
        let restored = hooks.after_restore(&conn, &ctx, &tag).unwrap();

        assert_eq!(created.action, AuditAction::Created);
        assert_eq!(restored.action, AuditAction::Restored);
    }
}
