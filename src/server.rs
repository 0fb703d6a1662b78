//! HTTP server for health and metrics endpoints (watch mode)

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::RelayError;
use crate::metrics;
use crate::orchestrator::RunReport;

/// Run statistics shared between the scan loop and the HTTP server
#[derive(Debug, Default, Clone, Serialize)]
pub struct RelayerStats {
    pub runs_completed: u64,
    pub runs_aborted: u64,
    pub relays_submitted: u64,
    pub relays_failed: u64,
    /// Last cursor value written per chain
    pub last_scanned: BTreeMap<String, u64>,
    pub last_error: Option<String>,
}

impl RelayerStats {
    /// Fold a run result into the totals
    pub fn record(&mut self, cursor_key: &str, result: &Result<RunReport, RelayError>) {
        match result {
            Ok(report) => {
                self.runs_completed += 1;
                self.relays_submitted += report.relay.submitted.len() as u64;
                self.relays_failed += report.relay.failed.len() as u64;
                if let Some(range) = report.range {
                    self.last_scanned.insert(cursor_key.to_string(), range.to);
                }
            }
            Err(e) => {
                self.runs_aborted += 1;
                self.last_error = Some(e.to_string());
            }
        }
    }
}

pub type SharedStats = Arc<RwLock<RelayerStats>>;

#[derive(Clone)]
struct AppState {
    stats: SharedStats,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(flatten)]
    stats: RelayerStats,
}

/// Health check endpoint handler
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.stats.read().await.clone();
    Json(HealthResponse {
        status: "healthy",
        stats,
    })
}

/// Liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    match metrics::encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response(),
    }
}

fn router(stats: SharedStats) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(AppState { stats })
}

/// Start the HTTP server for health and metrics
pub async fn start_server(port: u16, stats: SharedStats) -> eyre::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port)
        .parse()
        .map_err(|e| eyre!("Invalid metrics port {}: {}", port, e))?;

    info!("Health server listening on {}", addr);
    info!("  /health  - Run statistics (JSON)");
    info!("  /metrics - Prometheus metrics");

    metrics::UP.set(1.0);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(stats)).await?;

    Ok(())
}
