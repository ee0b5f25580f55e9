//! Read-only HTTP reporting surface over the audit log.

mod api;
mod error;
mod handlers;
#[allow(clippy::module_inception)]
mod server;

pub use api::{AuditDetail, ListQuery, PageQuery, RecentQuery, RecordList, MAX_RECENT_LIMIT};
pub use error::{ApiError, ErrorResponse, ServerError};
pub use handlers::AppState;
pub use server::ReportServer;
