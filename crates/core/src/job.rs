//! The job record and its state machine.
//!
//! ```text
//! pending ──> running ──> completed
//!    │           ├──────> failed
//!    │           └──────> cancelled
//!    └──────────────────> cancelled   (cancel observed before dispatch)
//! ```
//!
//! Every transition is a method on [`Job`] returning `Result<(), CoreError>`,
//! so store implementations can apply them as atomic mutations. A mutation
//! that returns an error must leave the record untouched. Transitions that
//! the scheduler may retry after a lost store acknowledgement are idempotent.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::outcome::{ArtifactRef, FailureDetail, JobResult};
use crate::progress::{clamp_percent, COMPLETE, MAX_RUNNING_PROGRESS};
use crate::request::{GenerationRequest, JobKind};
use crate::types::{JobId, TaskId, Timestamp};

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::Validation(format!("Unknown job state '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub request: GenerationRequest,
    pub state: JobState,
    pub progress: u8,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub deadline: Option<Timestamp>,
    pub result: Option<JobResult>,
    pub cancel_requested: bool,
    pub source_task_id: Option<TaskId>,
}

impl Job {
    /// Build a new pending job. The request is assumed to be validated.
    pub fn new(request: GenerationRequest, now: Timestamp) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            kind: request.kind,
            request,
            state: JobState::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            deadline: None,
            result: None,
            cancel_requested: false,
            source_task_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, next: JobState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Dispatch: `pending -> running`, or `pending -> cancelled` when a
    /// cancel was requested while the job waited for a slot.
    ///
    /// `timeout` is the default deadline; the request's own `timeout_secs`
    /// takes precedence. `now` doubles as the dispatch attempt's identity:
    /// re-applying with the same `now` on a job it already started is a
    /// no-op, while a job started by any other dispatch is a conflict.
    pub fn begin(&mut self, now: Timestamp, timeout: Option<Duration>) -> Result<(), CoreError> {
        match self.state {
            JobState::Running if self.started_at.is_some_and(|at| same_instant(at, now)) => Ok(()),
            JobState::Running => Err(CoreError::Conflict(format!(
                "Job {} was already started by another dispatcher",
                self.id
            ))),
            JobState::Pending if self.cancel_requested => {
                self.transition(JobState::Cancelled)?;
                self.finished_at = Some(now);
                Ok(())
            }
            JobState::Pending => {
                self.transition(JobState::Running)?;
                self.started_at = Some(now);
                let timeout = self
                    .request
                    .timeout_secs
                    .map(Duration::from_secs)
                    .or(timeout);
                self.deadline = timeout
                    .and_then(|t| chrono::Duration::from_std(t).ok())
                    .map(|t| now + t);
                Ok(())
            }
            state => Err(CoreError::Conflict(format!(
                "Job {} is {state} and cannot be started",
                self.id
            ))),
        }
    }

    /// Record executor progress. Values are clamped below 100 and stale
    /// (non-increasing) values are ignored.
    pub fn record_progress(&mut self, percent: i64) -> Result<(), CoreError> {
        if self.state != JobState::Running {
            return Err(CoreError::Conflict(format!(
                "Job {} is {} and no longer accepts progress",
                self.id, self.state
            )));
        }
        let percent = clamp_percent(percent).min(MAX_RUNNING_PROGRESS);
        if percent > self.progress {
            self.progress = percent;
        }
        Ok(())
    }

    /// Keep-alive for the reconciliation sweep; only valid while running.
    pub fn touch(&mut self) -> Result<(), CoreError> {
        if self.state != JobState::Running {
            return Err(CoreError::Conflict(format!("Job {} is {}", self.id, self.state)));
        }
        Ok(())
    }

    pub fn complete(&mut self, artifact: ArtifactRef, now: Timestamp) -> Result<(), CoreError> {
        let result = JobResult::Artifact { artifact };
        if self.state == JobState::Completed && self.result.as_ref() == Some(&result) {
            return Ok(());
        }
        self.transition(JobState::Completed)?;
        self.progress = COMPLETE;
        self.result = Some(result);
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, detail: FailureDetail, now: Timestamp) -> Result<(), CoreError> {
        let result = JobResult::Failure(detail);
        if self.state == JobState::Failed && self.result.as_ref() == Some(&result) {
            return Ok(());
        }
        self.transition(JobState::Failed)?;
        self.result = Some(result);
        self.finished_at = Some(now);
        Ok(())
    }

    /// The executor observed the cancel flag. Cancelled jobs carry no result.
    pub fn mark_cancelled(&mut self, now: Timestamp) -> Result<(), CoreError> {
        if self.state == JobState::Cancelled {
            return Ok(());
        }
        self.transition(JobState::Cancelled)?;
        self.result = None;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Set the write-once cancel flag. Conflicts on terminal jobs.
    pub fn request_cancel(&mut self) -> Result<(), CoreError> {
        if self.is_terminal() {
            return Err(CoreError::Conflict(
                "Job is already in a terminal state and cannot be cancelled".into(),
            ));
        }
        self.cancel_requested = true;
        Ok(())
    }

    /// Fail a running job whose last update predates `cutoff`.
    ///
    /// Re-checked inside the atomic update so a heartbeat that lands between
    /// the sweep's listing and its write keeps the job alive.
    pub fn fail_if_stale(
        &mut self,
        cutoff: Timestamp,
        detail: FailureDetail,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        if self.state != JobState::Running || self.updated_at >= cutoff {
            return Err(CoreError::Conflict(format!("Job {} is not stale", self.id)));
        }
        self.fail(detail, now)
    }
}

/// Stores keep timestamps at microsecond precision, so a start time read
/// back from one compares equal to the value that was written.
fn same_instant(a: Timestamp, b: Timestamp) -> bool {
    a.timestamp_micros() == b.timestamp_micros()
}
