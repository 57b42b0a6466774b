pub mod agent;
pub mod generation;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /generation/async                submit generation job (POST)
///
/// /jobs                            list jobs (GET)
/// /jobs/{job_id}                   job status (GET)
/// /jobs/{job_id}/cancel            request cancellation (POST)
///
/// /agent/tasks                     enqueue (POST), list queued (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/generation", generation::router())
        .nest("/jobs", jobs::router())
        .nest("/agent", agent::router())
}
