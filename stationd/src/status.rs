//! HTTP status surface of the supervisor.
//!
//! `/health` answers 200 only while the supervisor is running and at least
//! one station is mounted. `/stations` returns every station's state.

use std::net::SocketAddr;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::supervisor::{HealthReport, SupervisorHandle, SupervisorPhase};

pub fn router(handle: SupervisorHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stations", get(stations))
        .with_state(handle)
}

/// Serve the status endpoints on `addr` until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    handle: SupervisorHandle,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("status surface listening on {}", listener.local_addr()?);
    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health(State(handle): State<SupervisorHandle>) -> (StatusCode, Json<serde_json::Value>) {
    let report = handle.report();
    let (code, status) = match report.phase {
        SupervisorPhase::Running if report.mounted() > 0 => (StatusCode::OK, "ok"),
        SupervisorPhase::Running => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
        SupervisorPhase::Starting => (StatusCode::SERVICE_UNAVAILABLE, "starting"),
        SupervisorPhase::Degraded => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
        SupervisorPhase::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "stopped"),
    };
    (
        code,
        Json(json!({
            "status": status,
            "mounted": report.mounted(),
            "stations": report.stations.len(),
        })),
    )
}

async fn stations(State(handle): State<SupervisorHandle>) -> Json<HealthReport> {
    Json(handle.report())
}
