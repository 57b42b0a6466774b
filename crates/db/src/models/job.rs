//! Row mapping for the `generation_jobs` table.

use lookgen_core::job::Job;
use lookgen_core::outcome::JobResult;
use lookgen_core::request::GenerationRequest;
use lookgen_core::types::{JobId, TaskId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::store::StoreError;

/// A row from the `generation_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: JobId,
    pub kind: String,
    pub request: Json<GenerationRequest>,
    pub state: String,
    pub progress: i16,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub deadline: Option<Timestamp>,
    pub result: Option<Json<JobResult>>,
    pub cancel_requested: bool,
    pub source_task_id: Option<TaskId>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, value: &str| {
            StoreError::Corrupt(format!("job {} has invalid {what} '{value}'", row.id))
        };
        let kind = row.kind.parse().map_err(|_| corrupt("kind", &row.kind))?;
        let state = row.state.parse().map_err(|_| corrupt("state", &row.state))?;
        let progress =
            u8::try_from(row.progress).map_err(|_| corrupt("progress", &row.progress.to_string()))?;

        Ok(Job {
            id: row.id,
            kind,
            request: row.request.0,
            state,
            progress,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            deadline: row.deadline,
            result: row.result.map(|r| r.0),
            cancel_requested: row.cancel_requested,
            source_task_id: row.source_task_id,
        })
    }
}
