//! Dashboard HTTP Server
//!
//! Serves the live chart, the start-streaming control, health checks and
//! Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health and stream status
//! - `GET /healthz` - liveness check (simple OK)
//! - `GET /chart` - mounted chart (404 while hidden)
//! - `POST /stream/start` - show the chart and start streaming
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{StreamStatus, ViewController};
use crate::infrastructure::chart::ChartBoard;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the server answers.
    pub status: &'static str,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Stream status.
    pub stream: StreamStatus,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the dashboard server.
pub struct DashboardServerState {
    version: String,
    started_at: Instant,
    controller: Arc<Mutex<ViewController>>,
    board: ChartBoard,
}

impl DashboardServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(version: String, controller: Arc<Mutex<ViewController>>, board: ChartBoard) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            controller,
            board,
        }
    }
}

/// Build the dashboard router.
pub fn router(state: Arc<DashboardServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/chart", get(chart_handler))
        .route("/stream/start", post(start_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// Dashboard HTTP server.
pub struct DashboardServer {
    port: u16,
    state: Arc<DashboardServerState>,
    cancel: CancellationToken,
}

impl DashboardServer {
    /// Create a new dashboard server.
    #[must_use]
    pub const fn new(
        port: u16,
        state: Arc<DashboardServerState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `DashboardServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), DashboardServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DashboardServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Dashboard server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| DashboardServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Dashboard server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<DashboardServerState>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        stream: state.controller.lock().status(),
    };
    (StatusCode::OK, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn chart_handler(State(state): State<Arc<DashboardServerState>>) -> impl IntoResponse {
    state.board.snapshot().map_or_else(
        || {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    error: "chart is not shown",
                }),
            )
                .into_response()
        },
        |snapshot| (StatusCode::OK, Json(snapshot)).into_response(),
    )
}

async fn start_handler(State(state): State<Arc<DashboardServerState>>) -> impl IntoResponse {
    let status = {
        let mut controller = state.controller.lock();
        controller.show_and_stream();
        controller.status()
    };
    tracing::info!(session_id = %status.session_id, "Streaming started via control endpoint");
    (StatusCode::ACCEPTED, Json(status))
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

// =============================================================================
// Errors
// =============================================================================

/// Dashboard server errors.
#[derive(Debug, thiserror::Error)]
pub enum DashboardServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
