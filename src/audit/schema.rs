//! Database schema for the audit log.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the audit database.
pub const SCHEMA: &str = r"
-- WAL journal
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Audit records: one row per lifecycle event, never changed afterwards
CREATE TABLE IF NOT EXISTS audits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id TEXT,
    action TEXT NOT NULL CHECK (action IN ('created', 'updated', 'deleted', 'restored', 'force_deleted')),
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    before_values TEXT,
    after_values TEXT,
    client_address TEXT,
    client_agent TEXT,
    created_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS audits_no_update
BEFORE UPDATE ON audits
BEGIN
    SELECT RAISE(ABORT, 'audit records are append-only');
END;

CREATE TRIGGER IF NOT EXISTS audits_no_delete
BEFORE DELETE ON audits
BEGIN
    SELECT RAISE(ABORT, 'audit records are append-only');
END;

-- Schema version table for migrations
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

INSERT OR IGNORE INTO schema_version (version) VALUES (1);

-- Indexes for efficient queries
CREATE INDEX IF NOT EXISTS idx_audits_entity ON audits(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_audits_actor_created_at ON audits(actor_id, created_at);
CREATE INDEX IF NOT EXISTS idx_audits_action ON audits(action);
CREATE INDEX IF NOT EXISTS idx_audits_created_at ON audits(created_at);
";

/// Columns selected when reading audit records, in `record_from_row` order.
pub(crate) const RECORD_COLUMNS: &str = "id, actor_id, action, entity_type, entity_id, \
     before_values, after_values, client_address, client_agent, created_at";
