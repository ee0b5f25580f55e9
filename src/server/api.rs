//! Request and response types for the report HTTP endpoints.

use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::audit::{AuditFilter, AuditRecord, Snapshot};
use crate::config::QueryConfig;

/// Hard cap on GET /api/audits/recent.
pub const MAX_RECENT_LIMIT: usize = 1000;

/// Paging parameters shared by every paged route.
///
/// Numbers are taken signed so that out-of-range values reach validation
/// instead of failing extraction.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageQuery {
    /// Validated `(page, per_page)`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unprocessable`] if either value is out of range.
    pub fn page_request(&self, limits: &QueryConfig) -> Result<(u32, u32), ApiError> {
        let per_page = self
            .per_page
            .unwrap_or_else(|| i64::from(limits.default_page_size));
        let per_page = u32::try_from(per_page)
            .ok()
            .filter(|n| (1..=limits.max_page_size).contains(n))
            .ok_or_else(|| {
                ApiError::Unprocessable(format!(
                    "per_page must be between 1 and {}",
                    limits.max_page_size
                ))
            })?;

        let page = u32::try_from(self.page.unwrap_or(1))
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| ApiError::Unprocessable("page must be at least 1".to_string()))?;

        Ok((page, per_page))
    }
}

/// Query parameters for GET /api/audits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub action: Option<String>,
    pub model_type: Option<String>,
}

impl ListQuery {
    /// Validated `(page, per_page)`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unprocessable`] if either value is out of range.
    pub fn page_request(&self, limits: &QueryConfig) -> Result<(u32, u32), ApiError> {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
        .page_request(limits)
    }

    /// Validated filter.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unprocessable`] for an unknown action.
    pub fn filter(&self) -> Result<AuditFilter, ApiError> {
        Ok(AuditFilter::parse(
            self.action.as_deref(),
            self.model_type.as_deref(),
        )?)
    }
}

/// Query parameters for GET /api/audits/recent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

impl RecentQuery {
    /// The requested limit or `default`, capped at [`MAX_RECENT_LIMIT`].
    #[must_use]
    pub fn effective_limit(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).min(MAX_RECENT_LIMIT)
    }
}

/// Records returned without paging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordList {
    pub data: Vec<AuditRecord>,
}

impl From<Vec<AuditRecord>> for RecordList {
    fn from(data: Vec<AuditRecord>) -> Self {
        Self { data }
    }
}

/// Response for GET /api/audits/:id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDetail {
    #[serde(flatten)]
    pub record: AuditRecord,
    /// Current state of the audited entity, if it still exists.
    pub entity: Option<Snapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;

    fn query(page: Option<i64>, per_page: Option<i64>) -> ListQuery {
        ListQuery {
            page,
            per_page,
            ..ListQuery::default()
        }
    }

    #[test]
    fn test_page_request_defaults() {
        let limits = QueryConfig::default();
        assert_eq!(query(None, None).page_request(&limits).unwrap(), (1, 20));
        assert_eq!(query(Some(3), Some(100)).page_request(&limits).unwrap(), (3, 100));
    }

    #[test]
    fn test_page_request_rejects_out_of_range() {
        let limits = QueryConfig::default();
        for (page, per_page) in [
            (None, Some(0)),
            (None, Some(101)),
            (None, Some(-5)),
            (Some(0), None),
            (Some(-1), None),
        ] {
            assert!(
                matches!(
                    query(page, per_page).page_request(&limits),
                    Err(ApiError::Unprocessable(_))
                ),
                "page={page:?} per_page={per_page:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_page_query_shares_limits() {
        let limits = QueryConfig::default();
        assert_eq!(PageQuery::default().page_request(&limits).unwrap(), (1, 20));
        let bad = PageQuery {
            page: None,
            per_page: Some(0),
        };
        assert!(matches!(
            bad.page_request(&limits),
            Err(ApiError::Unprocessable(_))
        ));
    }

    #[test]
    fn test_filter() {
        let q = ListQuery {
            action: Some("restored".to_string()),
            model_type: Some("blog.post".to_string()),
            ..ListQuery::default()
        };
        let filter = q.filter().unwrap();
        assert_eq!(filter.action, Some(AuditAction::Restored));
        assert_eq!(filter.entity_type.as_deref(), Some("blog.post"));

        let bad = ListQuery {
            action: Some("purged".to_string()),
            ..ListQuery::default()
        };
        assert!(matches!(bad.filter(), Err(ApiError::Unprocessable(_))));
    }

    #[test]
    fn test_recent_limit() {
        assert_eq!(RecentQuery::default().effective_limit(50), 50);
        assert_eq!(RecentQuery { limit: Some(5) }.effective_limit(50), 5);
        assert_eq!(
            RecentQuery { limit: Some(5000) }.effective_limit(50),
            MAX_RECENT_LIMIT
        );
    }
}
