//! Shared fakes for scheduler integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lookgen_core::job::{Job, JobState};
use lookgen_core::outcome::{ArtifactFormat, ArtifactRef, FailureCode, FailureDetail};
use lookgen_core::request::{GenerationRequest, JobKind, Target};
use lookgen_core::types::JobId;
use lookgen_db::{JobFilter, JobStore, MemoryJobStore, Mutation, Page, StoreError, TaskQueue};
use lookgen_pipeline::{ExecutionOutcome, JobExecutor, ProgressSink};
use lookgen_worker::{Scheduler, SchedulerConfig, StoreRetryPolicy};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Target table names that switch the fake executor's behaviour.
pub const FAIL: &str = "fail";
pub const PANIC: &str = "panic";
pub const STUBBORN: &str = "stubborn";

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Reports 40%, then waits for a gate permit (or cancellation) before
/// completing. Tables named [`FAIL`], [`PANIC`] and [`STUBBORN`] fail,
/// panic, or ignore cancellation respectively.
pub struct FakeExecutor {
    pub gate: Semaphore,
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }
}

impl FakeExecutor {
    /// Let `n` gated runs complete.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobExecutor for FakeExecutor {
    async fn run(
        &self,
        job_id: JobId,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        match request.target.tables.first().map(String::as_str) {
            Some(FAIL) => {
                return ExecutionOutcome::Failed(
                    FailureDetail::new(FailureCode::Execution, "The target schema could not be read")
                        .with_diagnostic("relation \"fail\" does not exist"),
                );
            }
            Some(PANIC) => panic!("executor blew up"),
            Some(STUBBORN) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                return ExecutionOutcome::Cancelled;
            }
            _ => {}
        }

        progress.report(40).await;

        tokio::select! {
            _ = cancel.cancelled() => ExecutionOutcome::Cancelled,
            permit = self.gate.acquire() => {
                permit.expect("gate closed").forget();
                ExecutionOutcome::Completed(ArtifactRef {
                    uri: format!("memory://{job_id}.json"),
                    format: ArtifactFormat::Json,
                    tables: 1,
                    bytes: 2,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Flaky store
// ---------------------------------------------------------------------------

/// Wraps a [`MemoryJobStore`] and fails the first `failures` updates with
/// a transient error.
pub struct FlakyStore {
    pub inner: MemoryJobStore,
    pub failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }

    fn trip(&self) -> Result<(), StoreError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0
            && self
                .failures
                .compare_exchange(left, left - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::Transient("connection reset by peer".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn insert(&self, job: Job) -> Result<Job, StoreError> {
        self.inner.insert(job).await
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, id: JobId, mutation: Mutation<'_>) -> Result<Job, StoreError> {
        self.trip()?;
        self.inner.update(id, mutation).await
    }

    async fn list(&self, filter: &JobFilter, page: Page) -> Result<Vec<Job>, StoreError> {
        self.inner.list(filter, page).await
    }
}

// ---------------------------------------------------------------------------
// Setup and polling helpers
// ---------------------------------------------------------------------------

pub fn test_config(pool_size: usize) -> SchedulerConfig {
    SchedulerConfig {
        pool_size,
        job_timeout: None,
        heartbeat_interval: Duration::from_millis(50),
        cancel_grace: Duration::from_millis(100),
        progress_granularity: 1,
        retry: StoreRetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        },
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub store: Arc<dyn JobStore>,
    pub tasks: Arc<TaskQueue>,
    pub executor: Arc<FakeExecutor>,
}

pub fn harness(config: SchedulerConfig) -> Harness {
    harness_with_store(Arc::new(MemoryJobStore::new()), config)
}

pub fn harness_with_store(store: Arc<dyn JobStore>, config: SchedulerConfig) -> Harness {
    let tasks = Arc::new(TaskQueue::new());
    let executor = Arc::new(FakeExecutor::default());
    let scheduler = Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&tasks),
        executor.clone(),
        config,
    );
    Harness {
        scheduler,
        store,
        tasks,
        executor,
    }
}

pub fn request(table: &str) -> GenerationRequest {
    GenerationRequest::new(
        JobKind::MetadataGeneration,
        Target::from_path(&format!("sales.{table}")),
    )
}

/// Poll the store until `pred` holds for the job, or panic after 5 s.
pub async fn wait_for(store: &dyn JobStore, id: JobId, pred: impl Fn(&Job) -> bool) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = store.get(id).await.expect("job exists");
        if pred(&job) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on job {id}: state {} progress {}",
            job.state,
            job.progress
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_state(store: &dyn JobStore, id: JobId, state: JobState) -> Job {
    wait_for(store, id, |job| job.state == state).await
}

pub async fn count_in_state(store: &dyn JobStore, state: JobState) -> usize {
    let filter = JobFilter {
        state: Some(state),
        ..Default::default()
    };
    store
        .list(&filter, Page::new(100, 0))
        .await
        .expect("list jobs")
        .len()
}
