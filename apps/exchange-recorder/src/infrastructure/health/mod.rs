//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, collection status reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status with per-stream counters
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks that data is flowing)
//! - `GET /metrics` - Prometheus metrics in text format

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{FeedState, FeedStatus, StatusRegistry, StreamKind, StreamStatus};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Recorder version.
    pub version: String,
    /// Process uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Per-stream collection status.
    pub streams: BTreeMap<StreamKind, StreamStatus>,
    /// Collection loop restarts since start.
    pub collection_restarts: u64,
    /// Trade feed status, absent when trade recording is disabled.
    pub trades: Option<FeedStatus>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every stream succeeding and the trade feed subscribed.
    Healthy,
    /// Some data flowing, some failing.
    Degraded,
    /// Nothing flowing.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    status: Arc<StatusRegistry>,
    trades_enabled: bool,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, status: Arc<StatusRegistry>, trades_enabled: bool) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            status,
            trades_enabled,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Build the router without binding.
    #[must_use]
    pub fn router(state: Arc<HealthServerState>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Self::router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let feed = state.status.feed();
    if is_ready(&state.status.streams(), &feed) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
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

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let streams = state.status.streams();
    let feed = state.status.feed();
    let status = determine_health_status(&streams, &feed, state.trades_enabled);

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        streams,
        collection_restarts: state.status.restarts(),
        trades: state.trades_enabled.then_some(feed),
    }
}

/// Ready once any stream has succeeded or the trade feed is subscribed.
fn is_ready(streams: &BTreeMap<StreamKind, StreamStatus>, feed: &FeedStatus) -> bool {
    streams.values().any(|s| s.cycles_succeeded > 0) || feed.state == FeedState::Subscribed
}

fn determine_health_status(
    streams: &BTreeMap<StreamKind, StreamStatus>,
    feed: &FeedStatus,
    trades_enabled: bool,
) -> HealthStatus {
    let succeeding = streams
        .values()
        .filter(|s| s.cycles_succeeded > 0 && s.consecutive_failures == 0)
        .count();
    let subscribed = feed.state == FeedState::Subscribed;
    let feed_ok = !trades_enabled || subscribed;

    if succeeding == StreamKind::ALL.len() && feed_ok {
        HealthStatus::Healthy
    } else if succeeding > 0 || (trades_enabled && subscribed) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
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
