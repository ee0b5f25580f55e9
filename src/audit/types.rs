//! Audit record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuditError;
use super::snapshot::Snapshot;

/// Lifecycle transition captured by an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Entity was created.
    Created,
    /// Entity attributes were changed.
    Updated,
    /// Entity was deleted (soft delete for soft-deletable entities).
    Deleted,
    /// Soft-deleted entity was brought back.
    Restored,
    /// Entity was permanently purged.
    ForceDeleted,
}

impl AuditAction {
    /// Every action, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Created,
        Self::Updated,
        Self::Deleted,
        Self::Restored,
        Self::ForceDeleted,
    ];

    /// Returns the string representation for database storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
            Self::ForceDeleted => "force_deleted",
        }
    }

    /// Whether records of this action carry the pre-change snapshot.
    #[must_use]
    pub fn has_before_values(self) -> bool {
        matches!(self, Self::Updated | Self::Deleted | Self::ForceDeleted)
    }

    /// Whether records of this action carry the post-change snapshot.
    #[must_use]
    pub fn has_after_values(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| AuditError::InvalidFilter(format!("unknown action '{s}'")))
    }
}

/// Who performed a mutation and where the request came from.
///
/// Threaded explicitly from the request boundary into every recorder call.
/// All fields are optional: system-initiated changes have no actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    /// Authenticated principal, if any.
    pub actor_id: Option<String>,
    /// Client IP address.
    pub client_address: Option<String>,
    /// Client user agent.
    pub client_agent: Option<String>,
}

impl ActorContext {
    /// Context for changes made without an authenticated principal.
    #[must_use]
    pub fn system() -> Self {
        Self::default()
    }

    /// Context for changes made by the given principal.
    #[must_use]
    pub fn actor(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            ..Self::default()
        }
    }

    /// Set the client address.
    #[must_use]
    pub fn with_client_address(mut self, address: impl Into<String>) -> Self {
        self.client_address = Some(address.into());
        self
    }

    /// Set the client user agent.
    #[must_use]
    pub fn with_client_agent(mut self, agent: impl Into<String>) -> Self {
        self.client_agent = Some(agent.into());
        self
    }
}

/// One immutable lifecycle event of one tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Surrogate key, assigned by the store and never reused.
    pub id: i64,
    /// Principal that performed the change, if any.
    pub actor_id: Option<String>,
    /// Kind of transition.
    pub action: AuditAction,
    /// Type tag of the audited entity.
    pub entity_type: String,
    /// Primary key of the audited entity, as text.
    pub entity_id: String,
    /// Attributes before the change.
    pub before_values: Option<Snapshot>,
    /// Attributes after the change.
    pub after_values: Option<Snapshot>,
    /// Client IP address.
    pub client_address: Option<String>,
    /// Client user agent.
    pub client_agent: Option<String>,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Whether this record belongs to the given entity.
    #[must_use]
    pub fn is_for(&self, entity_type: &str, entity_id: &str) -> bool {
        self.entity_type == entity_type && self.entity_id == entity_id
    }
}
