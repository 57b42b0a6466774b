//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                  -> list_jobs
/// GET    /{job_id}          -> get_job
/// POST   /{job_id}/cancel   -> cancel_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs))
        .route("/{job_id}", get(jobs::get_job))
        .route("/{job_id}/cancel", post(jobs::cancel_job))
}
