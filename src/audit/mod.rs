//! Audit trail for tracked entities.
//!
//! [`ChangeRecorder`] writes one immutable record per lifecycle event,
//! [`AuditQueryService`] reads them back, and [`AuditHooks`] is the trigger
//! interface repositories call around their mutations.

mod diff;
mod error;
mod hooks;
mod logger;
mod query;
mod recorder;
mod registry;
mod schema;
mod snapshot;
mod types;

pub use diff::{summarize_changes, AttributeChange};
pub use error::AuditError;
pub use hooks::{AuditHooks, Trackable};
pub use logger::{default_audit_path, AuditLog};
pub use query::{parse_action_filter, AuditFilter, AuditQueryService, AuditStats, Page, PageMeta};
pub use recorder::ChangeRecorder;
pub use registry::{EntityLoader, EntityRegistry};
pub use schema::{SCHEMA, SCHEMA_VERSION};
pub use snapshot::{AttributeValue, Snapshot};
pub use types::{ActorContext, AuditAction, AuditRecord};
