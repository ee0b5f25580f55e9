//! Read-only queries over the audit log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::AuditError;
use super::schema::RECORD_COLUMNS;
use super::snapshot::Snapshot;
use super::types::{AuditAction, AuditRecord};

const NEWEST_FIRST: &str = "created_at DESC, id DESC";
const OLDEST_FIRST: &str = "created_at ASC, id ASC";

/// Parse a raw `action` filter value.
///
/// # Errors
///
/// Returns [`AuditError::InvalidFilter`] for a value outside the closed set.
pub fn parse_action_filter(raw: &str) -> Result<AuditAction, AuditError> {
    raw.parse::<AuditAction>().inspect_err(|e| {
        tracing::warn!(action = raw, error = %e, "Rejected audit filter");
    })
}

/// Optional restrictions for [`AuditQueryService::get_paged`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub entity_type: Option<String>,
}

impl AuditFilter {
    /// Build a filter from raw request values.
    ///
    /// Empty strings count as absent. Unknown actions are rejected here so no
    /// query runs with them.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidFilter`] for an action outside the closed set.
    pub fn parse(action: Option<&str>, entity_type: Option<&str>) -> Result<Self, AuditError> {
        let action = action
            .filter(|s| !s.is_empty())
            .map(parse_action_filter)
            .transpose()?;
        Ok(Self {
            action,
            entity_type: entity_type
                .filter(|s| !s.is_empty())
                .map(ToString::to_string),
        })
    }

    /// Filter on one action.
    #[must_use]
    pub fn with_action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Filter on one entity type tag.
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(action) = self.action {
            clauses.push("action = ?");
            values.push(Value::Text(action.as_str().to_string()));
        }
        if let Some(entity_type) = &self.entity_type {
            clauses.push("entity_type = ?");
            values.push(Value::Text(entity_type.clone()));
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    #[serde(rename = "per_page")]
    pub page_size: u32,
    pub total: u64,
    pub last_page: u64,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// Aggregate counts over the whole log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    #[serde(rename = "total_audits")]
    pub total: u64,
    #[serde(rename = "audits_this_month")]
    pub this_month: u64,
    #[serde(rename = "audits_today")]
    pub today: u64,
    pub by_action: BTreeMap<String, u64>,
    #[serde(rename = "by_model")]
    pub by_entity_type: BTreeMap<String, u64>,
}

/// Read-only access to stored audit records.
///
/// Every method is a pure read and runs a single query, except the paged
/// reads (count plus page) and the stats.
#[derive(Debug, Clone, Copy)]
pub struct AuditQueryService<'c> {
    conn: &'c Connection,
}

impl<'c> AuditQueryService<'c> {
    #[must_use]
    pub const fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Query`] if the read fails.
    pub fn find(&self, id: i64) -> Result<Option<AuditRecord>, AuditError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM audits WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], record_from_row)
            .optional()?)
    }

    /// Full history of one entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Query`] if the read fails.
    pub fn get_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM audits
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY created_at ASC, id ASC"
        );
        self.collect(&sql, params![entity_type, entity_id])
    }

    /// Everything one actor did, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Query`] if the read fails.
    pub fn get_by_actor(&self, actor_id: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM audits
             WHERE actor_id = ?1
             ORDER BY created_at DESC, id DESC"
        );
        self.collect(&sql, params![actor_id])
    }

    /// The most recent records across all entities.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Query`] if the read fails.
    pub fn get_recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM audits
             ORDER BY created_at DESC, id DESC
             LIMIT ?1"
        );
        self.collect(&sql, params![i64::try_from(limit).unwrap_or(i64::MAX)])
    }

    /// One page of records matching `filter`, newest first.
    ///
    /// Pages are 1-based. A page past the end returns no data with the
    /// correct totals.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidFilter`] if `page` or `page_size` is zero,
    /// or [`AuditError::Query`] if the read fails.
    pub fn get_paged(
        &self,
        filter: &AuditFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<AuditRecord>, AuditError> {
        let (where_sql, values) = filter.where_clause();
        self.page_of(&where_sql, values, NEWEST_FIRST, page, page_size)
    }

    /// One page of an entity's history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidFilter`] if `page` or `page_size` is zero,
    /// or [`AuditError::Query`] if the read fails.
    pub fn get_for_entity_paged(
        &self,
        entity_type: &str,
        entity_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<AuditRecord>, AuditError> {
        self.page_of(
            " WHERE entity_type = ? AND entity_id = ?",
            vec![
                Value::Text(entity_type.to_string()),
                Value::Text(entity_id.to_string()),
            ],
            OLDEST_FIRST,
            page,
            page_size,
        )
    }

    /// One page of an actor's records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidFilter`] if `page` or `page_size` is zero,
    /// or [`AuditError::Query`] if the read fails.
    pub fn get_by_actor_paged(
        &self,
        actor_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<AuditRecord>, AuditError> {
        self.page_of(
            " WHERE actor_id = ?",
            vec![Value::Text(actor_id.to_string())],
            NEWEST_FIRST,
            page,
            page_size,
        )
    }

    fn page_of(
        &self,
        where_sql: &str,
        mut values: Vec<Value>,
        order: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<AuditRecord>, AuditError> {
        if page == 0 {
            return Err(AuditError::InvalidFilter("page must be at least 1".to_string()));
        }
        if page_size == 0 {
            return Err(AuditError::InvalidFilter(
                "page size must be at least 1".to_string(),
            ));
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM audits{where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        let total = total.unsigned_abs();

        let offset = (u64::from(page) - 1) * u64::from(page_size);
        values.push(Value::Integer(i64::from(page_size)));
        values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM audits{where_sql}
             ORDER BY {order}
             LIMIT ? OFFSET ?"
        );
        let data = self.collect(&sql, params_from_iter(values.iter()))?;

        Ok(Page {
            data,
            meta: PageMeta {
                current_page: page,
                page_size,
                total,
                last_page: total.div_ceil(u64::from(page_size)).max(1),
            },
        })
    }

    /// Counts for the current UTC month and day.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Query`] if the read fails.
    pub fn get_stats(&self) -> Result<AuditStats, AuditError> {
        self.get_stats_at(Utc::now())
    }

    /// Counts with "this month" and "today" taken relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Query`] if the read fails.
    pub fn get_stats_at(&self, now: DateTime<Utc>) -> Result<AuditStats, AuditError> {
        let count = |sql: &str, prefix: Option<String>| -> Result<u64, AuditError> {
            let n: i64 = match prefix {
                Some(prefix) => self.conn.query_row(sql, params![prefix], |row| row.get(0))?,
                None => self.conn.query_row(sql, [], |row| row.get(0))?,
            };
            Ok(n.unsigned_abs())
        };

        let total = count("SELECT COUNT(*) FROM audits", None)?;
        let this_month = count(
            "SELECT COUNT(*) FROM audits WHERE substr(created_at, 1, 7) = ?1",
            Some(now.format("%Y-%m").to_string()),
        )?;
        let today = count(
            "SELECT COUNT(*) FROM audits WHERE substr(created_at, 1, 10) = ?1",
            Some(now.format("%Y-%m-%d").to_string()),
        )?;

        Ok(AuditStats {
            total,
            this_month,
            today,
            by_action: self.group_counts("action")?,
            by_entity_type: self.group_counts("entity_type")?,
        })
    }

    fn group_counts(&self, column: &str) -> Result<BTreeMap<String, u64>, AuditError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM audits GROUP BY {column}"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                let key: String = row.get(0)?;
                let n: i64 = row.get(1)?;
                Ok((key, n.unsigned_abs()))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }

    fn collect<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Map a row selected with `RECORD_COLUMNS` to a record.
fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let action: String = row.get(2)?;
    let action = action
        .parse::<AuditAction>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    let created_at: String = row.get(9)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(AuditRecord {
        id: row.get(0)?,
        actor_id: row.get(1)?,
        action,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        before_values: snapshot_column(row, 5)?,
        after_values: snapshot_column(row, 6)?,
        client_address: row.get(7)?,
        client_agent: row.get(8)?,
        created_at,
    })
}

fn snapshot_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Snapshot>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|json| {
        serde_json::from_str(&json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}
