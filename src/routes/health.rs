// src/routes/health.rs
//! Liveness and readiness endpoints.
//!
//! - `GET /health` answers without touching the database so orchestrators can
//!   tell the process is up.
//! - `GET /health/ready` additionally round-trips a `SELECT 1` through the
//!   pool and reports `503` when PostgreSQL is unreachable.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the health endpoints.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    data_source: String,
    sync_interval_secs: u64,
}

fn body(state: &AppState, status: &'static str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status,
        data_source: state.sync.data_source().to_string(),
        sync_interval_secs: state.sync.config().interval.as_secs(),
    })
}

/// Handle `GET /health`.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    body(&state, "ok")
}

/// Handle `GET /health/ready`.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    // ---
    match sqlx::query("SELECT 1").execute(state.store.pool()).await {
        Ok(_) => (StatusCode::OK, body(&state, "ok")),
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, body(&state, "database_unavailable"))
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}
