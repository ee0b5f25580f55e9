//! Change recorder: one audit insert per lifecycle event.

use chrono::{SubsecRound, Utc};
use rusqlite::{params, Connection};

use super::error::AuditError;
use super::hooks::Trackable;
use super::snapshot::Snapshot;
use super::types::{ActorContext, AuditAction, AuditRecord};

/// Writes audit records for tracked entities.
///
/// Every method performs exactly one insert on the given connection and
/// returns the stored record. Pass the mutation's own [`rusqlite::Transaction`]
/// (it derefs to a connection) so that a failed insert rolls the mutation back
/// with it. The recorder keeps no state and never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeRecorder;

impl ChangeRecorder {
    /// Create a recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Record a newly created entity.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StorageWrite`] if the insert fails.
    pub fn record_created<E: Trackable + ?Sized>(
        &self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
    ) -> Result<AuditRecord, AuditError> {
        self.record(
            conn,
            ctx,
            entity,
            AuditAction::Created,
            None,
            Some(entity.snapshot()),
        )
    }

    /// Record an update, storing the full prior and current snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StorageWrite`] if the insert fails.
    pub fn record_updated<E: Trackable + ?Sized>(
        &self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
        prior: Snapshot,
    ) -> Result<AuditRecord, AuditError> {
        self.record(
            conn,
            ctx,
            entity,
            AuditAction::Updated,
            Some(prior),
            Some(entity.snapshot()),
        )
    }

    /// Record a delete with the attributes the entity had before it.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StorageWrite`] if the insert fails.
    pub fn record_deleted<E: Trackable + ?Sized>(
        &self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
        snapshot: Snapshot,
    ) -> Result<AuditRecord, AuditError> {
        self.record(conn, ctx, entity, AuditAction::Deleted, Some(snapshot), None)
    }

    /// Record a restore. Restores carry no attribute values.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StorageWrite`] if the insert fails.
    pub fn record_restored<E: Trackable + ?Sized>(
        &self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
    ) -> Result<AuditRecord, AuditError> {
        self.record(conn, ctx, entity, AuditAction::Restored, None, None)
    }

    /// Record a permanent purge with the attributes the entity had before it.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::StorageWrite`] if the insert fails.
    pub fn record_force_deleted<E: Trackable + ?Sized>(
        &self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
        snapshot: Snapshot,
    ) -> Result<AuditRecord, AuditError> {
        self.record(
            conn,
            ctx,
            entity,
            AuditAction::ForceDeleted,
            Some(snapshot),
            None,
        )
    }

    fn record<E: Trackable + ?Sized>(
        self,
        conn: &Connection,
        ctx: &ActorContext,
        entity: &E,
        action: AuditAction,
        before_values: Option<Snapshot>,
        after_values: Option<Snapshot>,
    ) -> Result<AuditRecord, AuditError> {
        let entity_type = entity.type_tag().to_string();
        let entity_id = entity.audit_key();
        // Stored with microsecond precision; truncate so the returned record
        // matches what a later read produces.
        let created_at = Utc::now().trunc_subsecs(6);

        let before_json = before_values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let after_json = after_values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO audits (actor_id, action, entity_type, entity_id, before_values, after_values, client_address, client_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                ctx.actor_id,
                action.as_str(),
                entity_type,
                entity_id,
                before_json,
                after_json,
                ctx.client_address,
                ctx.client_agent,
                format_timestamp(&created_at),
            ],
        )
        .map_err(|source| AuditError::StorageWrite {
            action,
            entity_type: entity_type.clone(),
            source,
        })?;

        let id = conn.last_insert_rowid();
        tracing::debug!(
            id,
            action = %action,
            entity_type = %entity_type,
            entity_id = %entity_id,
            actor_id = ?ctx.actor_id,
            "Recorded audit event"
        );

        Ok(AuditRecord {
            id,
            actor_id: ctx.actor_id.clone(),
            action,
            entity_type,
            entity_id,
            before_values,
            after_values,
            client_address: ctx.client_address.clone(),
            client_agent: ctx.client_agent.clone(),
            created_at,
        })
    }
}

/// Format a timestamp the way `created_at` is stored.
///
/// Fixed width with microseconds, so text order matches time order.
pub(crate) fn format_timestamp(ts: &chrono::DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::schema::SCHEMA;

    struct Note {
        id: i64,
        body: String,
    }

    impl Trackable for Note {
        fn type_tag(&self) -> &str {
            "test.note"
        }

        fn audit_key(&self) -> String {
            self.id.to_string()
        }

        fn snapshot(&self) -> Snapshot {
            Snapshot::new().with("id", self.id).with("body", &self.body)
        }
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    fn note(body: &str) -> Note {
        Note {
            id: 7,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_record_created() {
        let conn = setup();
        let ctx = ActorContext::actor("u1").with_client_address("127.0.0.1");

        let record = ChangeRecorder::new()
            .record_created(&conn, &ctx, &note("A"))
            .unwrap();

        assert_eq!(record.action, AuditAction::Created);
        assert_eq!(record.entity_type, "test.note");
        assert_eq!(record.entity_id, "7");
        assert_eq!(record.actor_id.as_deref(), Some("u1"));
        assert_eq!(record.client_address.as_deref(), Some("127.0.0.1"));
        assert!(record.before_values.is_none());
        assert_eq!(record.after_values, Some(note("A").snapshot()));
    }

    #[test]
    fn test_record_updated_stores_full_snapshots() {
        let conn = setup();
        let prior = note("A").snapshot();

        let record = ChangeRecorder::new()
            .record_updated(&conn, &ActorContext::system(), &note("B"), prior.clone())
            .unwrap();

        assert_eq!(record.action, AuditAction::Updated);
        assert_eq!(record.before_values, Some(prior));
        assert_eq!(record.after_values, Some(note("B").snapshot()));
        assert!(record.actor_id.is_none());
    }

    #[test]
    fn test_record_updated_even_when_unchanged() {
        let conn = setup();
        let entity = note("A");

        let record = ChangeRecorder::new()
            .record_updated(&conn, &ActorContext::system(), &entity, entity.snapshot())
            .unwrap();

        assert_eq!(record.before_values, record.after_values);
    }

    #[test]
    fn test_record_delete_variants() {
        let conn = setup();
        let recorder = ChangeRecorder::new();
        let entity = note("gone");
        let ctx = ActorContext::actor("u1");

        let deleted = recorder
            .record_deleted(&conn, &ctx, &entity, entity.snapshot())
            .unwrap();
        let purged = recorder
            .record_force_deleted(&conn, &ctx, &entity, entity.snapshot())
            .unwrap();

        assert_eq!(deleted.action, AuditAction::Deleted);
        assert_eq!(purged.action, AuditAction::ForceDeleted);
        for record in [&deleted, &purged] {
            assert_eq!(record.before_values, Some(entity.snapshot()));
            assert!(record.after_values.is_none());
        }
        assert!(purged.id > deleted.id);
    }

    #[test]
    fn test_record_restored_has_no_values() {
        let conn = setup();

        let record = ChangeRecorder::new()
            .record_restored(&conn, &ActorContext::system(), &note("back"))
            .unwrap();

        assert_eq!(record.action, AuditAction::Restored);
        assert!(record.before_values.is_none());
        assert!(record.after_values.is_none());
    }

    #[test]
    fn test_storage_failure_propagates() {
        let conn = Connection::open_in_memory().unwrap();

        let err = ChangeRecorder::new()
            .record_created(&conn, &ActorContext::system(), &note("A"))
            .unwrap_err();

        assert!(err.is_storage_write());
        assert!(err.to_string().contains("created"));
    }

    #[test]
    fn test_format_timestamp_is_fixed_width() {
        let ts = chrono::DateTime::parse_from_rfc3339("2026-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&ts), "2026-03-04T05:06:07.000000Z");
    }
}
