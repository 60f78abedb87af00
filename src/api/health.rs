//! Health and readiness endpoints.

use std::time::Duration;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::database::DatabaseHealthStatus;
use crate::error::Result;
use crate::server::AppState;

/// Deadline for the live probe behind `/ready`
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: DatabaseHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealthResponse {
    pub kind: String,
    pub status: String,
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: u32,
    pub max_open: u32,
    pub max_idle: u32,
    pub consecutive_failures: u32,
    pub total_recoveries: u64,
    pub total_checks: u64,
    pub last_checked_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub probe_ms: u64,
}

/// GET /health - status as last observed by the connection monitor
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = &state.database;
    let health = db.health().stats();
    let pool = db.pool_stats();
    let connected = health.status == DatabaseHealthStatus::Healthy;

    let status = if connected { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database: DatabaseHealthResponse {
            kind: db.kind().to_string(),
            status: health.status.as_str().to_string(),
            connected,
            pool_size: pool.size,
            idle_connections: pool.idle,
            max_open: pool.max_open,
            max_idle: pool.max_idle,
            consecutive_failures: health.consecutive_failures,
            total_recoveries: health.total_recoveries,
            total_checks: health.total_checks,
            last_checked_ms: health.last_checked_ms,
        },
    })
}

/// GET /ready - live probe against the store
pub async fn ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>> {
    let start = std::time::Instant::now();

    if let Err(e) = state.database.probe(READY_PROBE_TIMEOUT).await {
        tracing::warn!(error = %e, "Readiness probe failed");
        return Err(e.into());
    }

    Ok(Json(ReadyResponse {
        ready: true,
        probe_ms: start.elapsed().as_millis() as u64,
    }))
}
