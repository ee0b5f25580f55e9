//! Audit Trail - append-only history of entity lifecycle changes.
//!
//! Mutations of tracked entities are recorded by [`audit::ChangeRecorder`]
//! in the same transaction as the change itself, and read back through
//! [`audit::AuditQueryService`] or the HTTP report server.

pub mod audit;
pub mod blog;
pub mod config;
pub mod display;
pub mod server;
