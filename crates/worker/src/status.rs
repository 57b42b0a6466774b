//! Read-only job status for pollers.
//!
//! Every call reads the store; nothing is cached, so a poll never returns a
//! state older than the last committed transition.

use std::sync::Arc;

use lookgen_core::error::CoreError;
use lookgen_core::job::{Job, JobState};
use lookgen_core::outcome::JobResult;
use lookgen_core::request::JobKind;
use lookgen_core::types::{JobId, TaskId, Timestamp};
use lookgen_db::{JobFilter, JobStore, Page};
use serde::Serialize;

/// The externally visible view of a job.
///
/// Failure diagnostics are stripped; only `error` and `code` are exposed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    pub cancel_requested: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_task_id: Option<TaskId>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        let result = job.result.map(|result| match result {
            JobResult::Failure(mut detail) => {
                detail.diagnostic = None;
                JobResult::Failure(detail)
            }
            artifact => artifact,
        });

        Self {
            job_id: job.id,
            kind: job.kind,
            state: job.state,
            progress: job.progress,
            result,
            cancel_requested: job.cancel_requested,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            source_task_id: job.source_task_id,
        }
    }
}

#[derive(Clone)]
pub struct StatusService {
    store: Arc<dyn JobStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn status(&self, id: JobId) -> Result<JobStatusView, CoreError> {
        let job = self.store.get(id).await?;
        Ok(job.into())
    }

    pub async fn list(
        &self,
        filter: &JobFilter,
        page: Page,
    ) -> Result<Vec<JobStatusView>, CoreError> {
        let jobs = self.store.list(filter, page).await?;
        Ok(jobs.into_iter().map(JobStatusView::from).collect())
    }
}
