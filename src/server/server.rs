//! Report HTTP server with axum router and graceful shutdown.

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ServerError;
use super::handlers::{
    actor_audits, audit_stats, entity_audits, list_audits, recent_audits, show_audit, AppState,
};
use crate::audit::{AuditLog, EntityRegistry};
use crate::config::{QueryConfig, ServerConfig};

/// Read-only HTTP server over the audit log.
pub struct ReportServer {
    /// Server configuration.
    config: ServerConfig,
    /// Application state shared across handlers.
    state: AppState,
    /// Cancelled to shut the server down.
    cancel: CancellationToken,
}

impl ReportServer {
    /// Create a new report server with default configuration.
    #[must_use]
    pub fn new(audit: AuditLog, registry: EntityRegistry, limits: QueryConfig) -> Self {
        Self {
            config: ServerConfig::default(),
            state: AppState::new(audit, registry, limits),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the server configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Token that stops the server when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/api/audits", get(list_audits))
            .route("/api/audits/stats", get(audit_stats))
            .route("/api/audits/recent", get(recent_audits))
            .route("/api/audits/:id", get(show_audit))
            .route("/api/audits/user/:user_id", get(actor_audits))
            .route("/api/audits/model/:model_type/:model_id", get(entity_audits))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Run the server, binding to the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::BindError {
                address: addr.clone(),
                source,
            })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    ///
    /// Runs until the cancellation token is triggered, then shuts down
    /// gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let cancel = self.cancel.clone();
        let app = self.build_router();

        let local = listener.local_addr()?;
        tracing::info!(address = %local, "Starting report server");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("Report server shutting down gracefully");
            })
            .await?;
        Ok(())
    }
}
