//! `GqlWsServer`: Axum host for the graphql-ws endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use gqlws_settings::{GqlWsSettings, ServerSettings};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::errors::ServerError;
use crate::gate::{Endpoint, GqlWsService};
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    endpoint: Endpoint,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

/// HTTP server exposing `/health`, `/metrics`, and the subscription endpoint.
pub struct GqlWsServer {
    settings: ServerSettings,
    endpoint: Endpoint,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    fallback: Router,
    start_time: Instant,
}

impl GqlWsServer {
    /// Create a server. `config` drives every upgraded connection.
    pub fn new(settings: &GqlWsSettings, config: Config) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let endpoint = Endpoint::new(config, shutdown.token());
        Self {
            settings: settings.server.clone(),
            endpoint,
            shutdown,
            metrics: None,
            fallback: Router::new().fallback(upgrade_required),
            start_time: Instant::now(),
        }
    }

    /// Serve Prometheus text from `handle` at `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Handle non-upgrade requests to the subscription path with `router`
    /// instead of answering `426 Upgrade Required`.
    #[must_use]
    pub fn with_fallback(mut self, router: Router) -> Self {
        self.fallback = router;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            endpoint: self.endpoint.clone(),
            shutdown: Arc::clone(&self.shutdown),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };
        let gate = GqlWsService::new(self.endpoint.clone(), self.fallback.clone());

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .route_service(&self.settings.path, gate)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve in the background.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which ends after [`ShutdownCoordinator::shutdown`].
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, path = %self.settings.path, "graphql-ws server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    token.cancelled().await;
                    info!("HTTP server received shutdown signal");
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the upgrade endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Get the server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.endpoint.connection_count(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Default response for plain HTTP requests to the subscription path.
async fn upgrade_required() -> impl IntoResponse {
    (
        StatusCode::UPGRADE_REQUIRED,
        "this endpoint speaks the graphql-ws WebSocket subprotocol",
    )
}
