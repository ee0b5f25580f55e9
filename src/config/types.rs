//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audit::{default_audit_path, AuditHooks};

/// Default port for the report server.
pub const DEFAULT_PORT: u16 = 3000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Audit database file. Defaults to the per-user data directory.
    pub database: Option<PathBuf>,
    pub server: ServerConfig,
    pub recording: RecordingConfig,
    pub query: QueryConfig,
}

impl AppConfig {
    /// Database path to open, falling back to [`default_audit_path`].
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(default_audit_path)
    }

    /// Lifecycle hooks configured by the recording policy.
    #[must_use]
    pub fn hooks(&self) -> AuditHooks {
        AuditHooks::new(self.recording.skip_unchanged_updates)
    }
}

/// Report server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether to enable permissive CORS.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            cors_permissive: true,
        }
    }
}

impl ServerConfig {
    /// The configured address as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What gets written to the trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Leave updates that changed no attribute out of the trail.
    pub skip_unchanged_updates: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            skip_unchanged_updates: true,
        }
    }
}

/// Limits for read queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size when a request names none.
    pub default_page_size: u32,
    /// Largest page size a request may ask for.
    pub max_page_size: u32,
    /// Number of records returned by "recent" when no limit is given.
    pub recent_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            recent_limit: 50,
        }
    }
}
