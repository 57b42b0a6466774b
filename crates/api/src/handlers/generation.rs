//! Handler for asynchronous generation submissions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lookgen_core::request::GenerationRequest;
use lookgen_core::types::JobId;
use serde::Serialize;

use crate::error::AppResult;
use crate::state::AppState;

/// Receipt for an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitAccepted {
    pub job_id: JobId,
}

/// POST /api/v1/generation/async
///
/// Validate and persist a generation job, then return immediately. The job
/// starts `pending`; callers poll `GET /api/v1/jobs/{job_id}`.
pub async fn submit_async(
    State(state): State<AppState>,
    Json(input): Json<GenerationRequest>,
) -> AppResult<impl IntoResponse> {
    let kind = input.kind;
    let target = input.target.describe();
    let job_id = state.scheduler.submit(input).await?;

    tracing::info!(%job_id, %kind, %target, "Generation job accepted");

    Ok((StatusCode::ACCEPTED, Json(SubmitAccepted { job_id })))
}
