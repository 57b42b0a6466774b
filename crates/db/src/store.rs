//! The job record store contract.

use async_trait::async_trait;
use lookgen_core::error::CoreError;
use lookgen_core::job::{Job, JobState};
use lookgen_core::request::JobKind;
use lookgen_core::types::{JobId, Timestamp};
use serde::Deserialize;

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 50;

/// An atomic change to one job record.
///
/// Stores run the mutation against the current record while holding that
/// record's exclusive lock. Returning an error aborts the update and leaves
/// the record untouched. Mutations may be re-run when a write is retried, so
/// they must be `Fn`, not `FnOnce`.
pub type Mutation<'a> = &'a (dyn Fn(&mut Job) -> Result<(), CoreError> + Send + Sync);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    /// The mutation refused the change (illegal transition, terminal job).
    #[error(transparent)]
    Rejected(CoreError),

    /// The backend failed in a way that may succeed on retry.
    #[error("Transient store error: {0}")]
    Transient(String),

    /// A stored row could not be decoded.
    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CoreError::job_not_found(id),
            StoreError::Rejected(core) => core,
            StoreError::Transient(msg) => CoreError::Unavailable(msg),
            StoreError::Corrupt(msg) => CoreError::Internal(msg),
        }
    }
}

/// Listing filter. All fields are optional and combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub kind: Option<JobKind>,
    /// Only jobs whose `updated_at` is strictly earlier than this.
    #[serde(skip)]
    pub updated_before: Option<Timestamp>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.state.map_or(true, |s| job.state == s)
            && self.kind.map_or(true, |k| job.kind == k)
            && self.updated_before.map_or(true, |t| job.updated_at < t)
    }
}

/// Pagination parameters (`?limit=&offset=`).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Limit clamped to `1..=MAX_LIMIT`, defaulting to [`DEFAULT_LIMIT`].
    pub fn clamp_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn clamp_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Durable keyed storage of job records.
///
/// All writes to a given job are linearizable: two concurrent `update`
/// calls on the same id never interleave. Every successful `update` bumps
/// `updated_at`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a new job. A duplicate id is rejected with a conflict.
    async fn insert(&self, job: Job) -> Result<Job, StoreError>;

    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    /// Apply `mutation` atomically and return the committed record.
    async fn update(&self, id: JobId, mutation: Mutation<'_>) -> Result<Job, StoreError>;

    /// Jobs matching `filter`, newest first.
    async fn list(&self, filter: &JobFilter, page: Page) -> Result<Vec<Job>, StoreError>;
}
