//! HTTP handlers for the report API.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;

use super::api::{AuditDetail, ListQuery, PageQuery, RecentQuery, RecordList};
use super::error::ApiError;
use crate::audit::{AuditLog, AuditRecord, AuditStats, EntityRegistry, Page};
use crate::config::QueryConfig;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Audit log to read from.
    pub audit: AuditLog,
    /// Loaders for the live entity behind a record.
    pub registry: Arc<EntityRegistry>,
    /// Paging limits.
    pub limits: QueryConfig,
}

impl AppState {
    #[must_use]
    pub fn new(audit: AuditLog, registry: EntityRegistry, limits: QueryConfig) -> Self {
        Self {
            audit,
            registry: Arc::new(registry),
            limits,
        }
    }
}

/// GET /api/audits - Filtered, paged records, newest first.
pub async fn list_audits(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<AuditRecord>>, ApiError> {
    let (page, per_page) = query.page_request(&state.limits)?;
    let filter = query.filter()?;
    let page = state.audit.get_paged(filter, page, per_page).await?;
    Ok(Json(page))
}

/// GET /api/audits/stats - Aggregate counts.
pub async fn audit_stats(State(state): State<AppState>) -> Result<Json<AuditStats>, ApiError> {
    Ok(Json(state.audit.get_stats().await?))
}

/// GET /api/audits/recent - Latest records across all entities.
pub async fn recent_audits(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<RecordList>, ApiError> {
    let limit = query.effective_limit(state.limits.recent_limit);
    Ok(Json(state.audit.get_recent(limit).await?.into()))
}

/// GET /api/audits/:id - One record with the current state of its entity.
///
/// Ids that are not integers cannot exist and are reported as not found.
pub async fn show_audit(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<AuditDetail>, ApiError> {
    let not_found = || ApiError::NotFound(format!("Audit record {raw_id} not found"));
    let id = raw_id.parse::<i64>().map_err(|_| not_found())?;
    let record = state.audit.find(id).await?.ok_or_else(not_found)?;

    let registry = state.registry.clone();
    let lookup = record.clone();
    let entity = state
        .audit
        .read(move |conn| registry.load_audited(conn, &lookup))
        .await?;

    Ok(Json(AuditDetail { record, entity }))
}

/// GET /api/audits/user/:user_id - Everything one actor did, newest first, paged.
pub async fn actor_audits(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<AuditRecord>>, ApiError> {
    let (page, per_page) = query.page_request(&state.limits)?;
    Ok(Json(
        state
            .audit
            .get_by_actor_paged(user_id, page, per_page)
            .await?,
    ))
}

/// GET /api/audits/model/:model_type/:model_id - History of one entity, oldest first, paged.
pub async fn entity_audits(
    State(state): State<AppState>,
    Path((model_type, model_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<AuditRecord>>, ApiError> {
    let (page, per_page) = query.page_request(&state.limits)?;
    Ok(Json(
        state
            .audit
            .get_for_entity_paged(model_type, model_id, page, per_page)
            .await?,
    ))
}
