//! Handlers for agent tasks.
//!
//! The conversational agent posts generation intents here. Tasks wait in
//! memory and become jobs when the scheduler has a free slot.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lookgen_core::task::{TaskDraft, TaskSummary};
use lookgen_core::types::TaskId;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::state::AppState;

/// Default number of queued tasks returned by the listing.
const DEFAULT_TASK_LIMIT: usize = 50;
const MAX_TASK_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
pub struct TaskAccepted {
    pub task_id: TaskId,
    pub queue_depth: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TaskQueueView {
    pub depth: usize,
    pub tasks: Vec<TaskSummary>,
}

/// POST /api/v1/agent/tasks
pub async fn enqueue_task(
    State(state): State<AppState>,
    Json(draft): Json<TaskDraft>,
) -> AppResult<impl IntoResponse> {
    let (task_id, queue_depth) = state.scheduler.enqueue_task(draft).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            task_id,
            queue_depth,
        }),
    ))
}

/// GET /api/v1/agent/tasks
///
/// Tasks not yet turned into jobs, oldest first.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TASK_LIMIT)
        .clamp(1, MAX_TASK_LIMIT);
    let tasks = state.scheduler.tasks();

    Ok(Json(TaskQueueView {
        depth: tasks.depth().await,
        tasks: tasks.pending(limit).await,
    }))
}
