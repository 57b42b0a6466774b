use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Job store backend: `postgres` or `memory`.
    pub store: &'static str,
    /// Jobs currently holding a worker slot.
    pub running_jobs: usize,
    /// Configured worker pool size.
    pub pool_size: usize,
}

/// GET /health -- returns service and job store health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (store, healthy) = match &state.pool {
        Some(pool) => ("postgres", lookgen_db::health_check(pool).await.is_ok()),
        None => ("memory", true),
    };

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store,
        running_jobs: state.scheduler.running_jobs().await,
        pool_size: state.scheduler.pool_size(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
