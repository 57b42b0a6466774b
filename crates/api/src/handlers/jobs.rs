//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lookgen_core::job::JobState;
use lookgen_core::request::JobKind;
use lookgen_core::types::JobId;
use lookgen_db::store::MAX_LIMIT;
use lookgen_db::{JobFilter, Page};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub state: Option<JobState>,
    pub kind: Option<JobKind>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Receipt for a cancellation request.
#[derive(Debug, Serialize)]
pub struct CancelAccepted {
    pub job_id: JobId,
    pub state: JobState,
    pub cancel_requested: bool,
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{job_id}
///
/// Current status of one job, read straight from the store.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let view = state.status.status(job_id).await?;
    Ok(Json(view))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// Newest first. Supports optional `state`, `kind`, `limit` and `offset`.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    if let Some(limit) = params.limit {
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
    }

    let filter = JobFilter {
        state: params.state,
        kind: params.kind,
        updated_before: None,
    };
    let page = Page {
        limit: params.limit,
        offset: params.offset,
    };
    let jobs = state.status.list(&filter, page).await?;

    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{job_id}/cancel
///
/// Request cancellation. A pending job is cancelled immediately; a running
/// job stops at its executor's next checkpoint. Terminal jobs return 409.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.scheduler.cancel(job_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CancelAccepted {
            job_id: job.id,
            state: job.state,
            cancel_requested: job.cancel_requested,
        }),
    ))
}
