//! The job scheduler.
//!
//! Accepts submissions, keeps a FIFO wait set of pending job ids and runs at
//! most `pool_size` jobs at once. A single dispatcher task is the only place
//! where jobs are started:
//!
//! 1. acquire a worker permit from the [`Semaphore`],
//! 2. take whichever has waited longer: the head of the wait set, or the
//!    oldest agent task (converted into a new job),
//! 3. apply `pending -> running` in the store and spawn the unit.
//!
//! A unit owns its permit, so a slot is released however the unit ends. The
//! executor itself runs in a nested task so a panic surfaces as a
//! `JoinError` instead of tearing down the unit that records the outcome.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lookgen_core::error::CoreError;
use lookgen_core::job::{Job, JobState};
use lookgen_core::outcome::{FailureCode, FailureDetail};
use lookgen_core::request::GenerationRequest;
use lookgen_core::task::{Task, TaskDraft};
use lookgen_core::types::{JobId, TaskId, Timestamp};
use lookgen_db::store::MAX_LIMIT;
use lookgen_db::{JobFilter, JobStore, Mutation, Page, StoreError, TaskQueue};
use lookgen_pipeline::{ExecutionOutcome, JobExecutor, ProgressSink};
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::SchedulerConfig;
use crate::retry::jittered;

/// Fallback wake-up for the dispatcher when nothing notifies it.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A wait set entry. `since` orders it against queued agent tasks.
#[derive(Debug, Clone, Copy)]
struct Queued {
    id: JobId,
    since: Timestamp,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    tasks: Arc<TaskQueue>,
    executor: Arc<dyn JobExecutor>,
    config: SchedulerConfig,
    permits: Arc<Semaphore>,
    waiting: Mutex<VecDeque<Queued>>,
    wake: Notify,
    /// Cancellation tokens of dispatched jobs, keyed by id.
    running: Mutex<HashMap<JobId, CancellationToken>>,
    shutdown: CancellationToken,
    units: TaskTracker,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        tasks: Arc<TaskQueue>,
        executor: Arc<dyn JobExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.pool_size.max(1)));
        Self {
            inner: Arc::new(Inner {
                store,
                tasks,
                executor,
                config,
                permits,
                waiting: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
                running: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                units: TaskTracker::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    pub fn tasks(&self) -> &Arc<TaskQueue> {
        &self.inner.tasks
    }

    pub fn pool_size(&self) -> usize {
        self.inner.config.pool_size.max(1)
    }

    /// Jobs dispatched and not yet finished.
    pub async fn running_jobs(&self) -> usize {
        self.inner.running.lock().await.len()
    }

    /// Submitted jobs waiting for a worker slot.
    pub async fn waiting_jobs(&self) -> usize {
        self.inner.waiting.lock().await.len()
    }

    // -----------------------------------------------------------------------
    // Submission and cancellation
    // -----------------------------------------------------------------------

    /// Validate and persist a new pending job, then wake the dispatcher.
    ///
    /// Validation errors are returned before anything is stored.
    pub async fn submit(&self, request: GenerationRequest) -> Result<JobId, CoreError> {
        request.validate()?;

        let job = self.insert_job(Job::new(request, Utc::now())).await?;
        self.inner.waiting.lock().await.push_back(Queued {
            id: job.id,
            since: job.created_at,
        });
        self.inner.wake.notify_one();

        tracing::info!(job_id = %job.id, kind = %job.kind, "Job submitted");
        Ok(job.id)
    }

    /// Request cancellation.
    ///
    /// A pending job is cancelled on the spot. A running job keeps running
    /// until its executor observes the tripped token; the returned record
    /// then has `cancel_requested` set and is still `running`.
    pub async fn cancel(&self, id: JobId) -> Result<Job, CoreError> {
        let now = Utc::now();
        let request_cancel = move |job: &mut Job| -> Result<(), CoreError> {
            job.request_cancel()?;
            if job.state == JobState::Pending {
                job.mark_cancelled(now)?;
            }
            Ok(())
        };
        let mutation: Mutation<'_> = &request_cancel;
        let store = self.inner.store.as_ref();

        let job = self
            .inner
            .config
            .retry
            .run("cancel", id, move || store.update(id, mutation))
            .await?;

        match job.state {
            JobState::Running => {
                if let Some(token) = self.inner.running.lock().await.get(&id) {
                    token.cancel();
                }
            }
            JobState::Cancelled => {
                self.inner.waiting.lock().await.retain(|waiting| waiting.id != id);
            }
            _ => {}
        }

        tracing::info!(job_id = %id, state = %job.state, "Job cancellation requested");
        Ok(job)
    }

    /// Queue an agent task; the dispatcher turns it into a job when a slot
    /// frees up and no submitted job has waited longer. Returns the task id
    /// and the new queue depth.
    pub async fn enqueue_task(&self, draft: TaskDraft) -> Result<(TaskId, usize), CoreError> {
        let task = Task::from_draft(draft, Utc::now())?;
        let task_id = task.id;
        let depth = self.inner.tasks.enqueue(task).await;
        self.inner.wake.notify_one();

        tracing::info!(%task_id, depth, "Agent task enqueued");
        Ok((task_id, depth))
    }

    /// Put every stored `pending` job into the wait set, oldest first.
    ///
    /// Called once before [`Scheduler::start`] when the store outlives the
    /// process, so jobs accepted by a previous instance still run. Returns
    /// how many were queued.
    pub async fn recover_pending(&self) -> Result<usize, CoreError> {
        let filter = JobFilter {
            state: Some(JobState::Pending),
            ..Default::default()
        };

        let mut pending = Vec::new();
        loop {
            let page = Page::new(MAX_LIMIT, pending.len() as i64);
            let batch = self.inner.store.list(&filter, page).await?;
            let short = batch.len() < MAX_LIMIT as usize;
            pending.extend(batch);
            if short {
                break;
            }
        }
        pending.sort_by_key(|job| job.created_at);

        let mut waiting = self.inner.waiting.lock().await;
        for job in &pending {
            if !waiting.iter().any(|queued| queued.id == job.id) {
                waiting.push_back(Queued {
                    id: job.id,
                    since: job.created_at,
                });
            }
        }
        drop(waiting);
        self.inner.wake.notify_one();

        tracing::info!(recovered = pending.len(), "Pending jobs recovered");
        Ok(pending.len())
    }

    // -----------------------------------------------------------------------
    // Dispatcher
    // -----------------------------------------------------------------------

    /// Spawn the dispatcher loop.
    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run().await })
    }

    /// Run the dispatcher until [`Scheduler::shutdown`] is called.
    pub async fn run(&self) {
        tracing::info!(pool_size = self.pool_size(), "Job scheduler started");

        loop {
            let permit = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                permit = Arc::clone(&self.inner.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(next) = self.next_job().await else {
                break;
            };
            self.dispatch(next, permit).await;
        }

        tracing::info!("Job scheduler shutting down");
    }

    /// Stop dispatching, cancel running units and wait up to `grace` for
    /// them to record their outcomes.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.shutdown.cancel();
        self.inner.units.close();
        if tokio::time::timeout(grace, self.inner.units.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                running = self.running_jobs().await,
                "Jobs still running after shutdown grace period",
            );
        }
    }

    /// Wait for the next job to start. `None` once shutdown begins.
    ///
    /// The wait set and the task queue are each FIFO; between them the entry
    /// that has waited longer goes first, so neither source starves the other.
    async fn next_job(&self) -> Option<Queued> {
        loop {
            if self.inner.shutdown.is_cancelled() {
                return None;
            }
            let head_since = self.inner.waiting.lock().await.front().map(|q| q.since);
            let task_since = self.inner.tasks.oldest_enqueued_at().await;
            let task_first = match (head_since, task_since) {
                (Some(job_at), Some(task_at)) => task_at < job_at,
                (None, Some(_)) => true,
                _ => false,
            };

            if task_first {
                if let Some(next) = self.drain_task().await {
                    return Some(next);
                }
            }
            if let Some(next) = self.inner.waiting.lock().await.pop_front() {
                return Some(next);
            }

            tokio::select! {
                _ = self.inner.shutdown.cancelled() => return None,
                _ = self.inner.wake.notified() => {}
                _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
            }
        }
    }

    /// Convert the oldest agent task into a stored job.
    ///
    /// The task leaves the queue only here, under the dispatcher's single
    /// loop, so it becomes at most one job. If the insert fails transiently
    /// the task goes back to the front of the queue.
    async fn drain_task(&self) -> Option<Queued> {
        let task = self.inner.tasks.drain_next().await?;
        let task_id = task.id;

        match self.insert_job(task.into_job(Utc::now())).await {
            Ok(job) => {
                tracing::info!(job_id = %job.id, %task_id, kind = %job.kind, "Agent task became a job");
                Some(Queued {
                    id: job.id,
                    since: task.enqueued_at,
                })
            }
            Err(e) if e.is_transient() => {
                tracing::error!(%task_id, error = %e, "Could not create job for agent task, requeued");
                self.inner.tasks.restore_front(task).await;
                None
            }
            Err(e) => {
                tracing::error!(%task_id, error = %e, "Agent task rejected by the store, dropped");
                None
            }
        }
    }

    async fn dispatch(&self, next: Queued, permit: OwnedSemaphorePermit) {
        let job_id = next.id;
        // Registered before `begin` so a cancel that sees the job running
        // always finds its token.
        let token = self.inner.shutdown.child_token();
        self.inner.running.lock().await.insert(job_id, token.clone());

        let now = Utc::now();
        let timeout = self.inner.config.job_timeout;
        let begin = move |job: &mut Job| job.begin(now, timeout);
        let mutation: Mutation<'_> = &begin;
        let store = self.inner.store.as_ref();

        let started = self
            .inner
            .config
            .retry
            .run("begin", job_id, move || store.update(job_id, mutation))
            .await;

        match started {
            Ok(job) if job.state == JobState::Running => {
                tracing::info!(%job_id, kind = %job.kind, deadline = ?job.deadline, "Job started");
                let scheduler = self.clone();
                self.inner
                    .units
                    .spawn(async move { scheduler.execute(job, token, permit).await });
            }
            Ok(job) => {
                self.forget(job_id).await;
                tracing::info!(%job_id, state = %job.state, "Job cancelled before dispatch");
            }
            Err(e) if e.is_transient() => {
                self.forget(job_id).await;
                tracing::warn!(%job_id, error = %e, "Could not start job, requeueing");
                self.requeue_later(next);
            }
            Err(e) => {
                self.forget(job_id).await;
                tracing::debug!(%job_id, error = %e, "Skipping job that can no longer start");
            }
        }
    }

    /// Put a job back at the head of the wait set after a backoff.
    fn requeue_later(&self, queued: Queued) {
        let inner = Arc::clone(&self.inner);
        let delay = jittered(inner.config.retry.max_delay);
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    inner.waiting.lock().await.push_front(queued);
                    inner.wake.notify_one();
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Unit of execution
    // -----------------------------------------------------------------------

    async fn execute(self, job: Job, token: CancellationToken, permit: OwnedSemaphorePermit) {
        let _permit = permit;
        let job_id = job.id;

        let sink = StoreProgress {
            store: Arc::clone(&self.inner.store),
            job_id,
        };
        let executor = Arc::clone(&self.inner.executor);
        let request = job.request.clone();
        let exec_token = token.clone();
        let mut handle = tokio::spawn(async move {
            executor.run(job_id, &request, &sink, &exec_token).await
        });

        let until_deadline = job
            .deadline
            .map(|d| (d - Utc::now()).to_std().unwrap_or(Duration::ZERO));
        let expiry = async {
            match until_deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mut heartbeat = tokio::time::interval(self.inner.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        heartbeat.tick().await;

        let outcome = loop {
            tokio::select! {
                joined = &mut handle => break Some(join_outcome(joined)),
                _ = heartbeat.tick() => self.heartbeat(job_id).await,
                () = &mut expiry => {
                    self.expire(&job, &token, &mut handle).await;
                    break None;
                }
            }
        };

        if let Some(outcome) = outcome {
            self.finalize(job_id, outcome).await;
        }
        self.forget(job_id).await;
    }

    async fn heartbeat(&self, job_id: JobId) {
        match self.inner.store.update(job_id, &|job: &mut Job| job.touch()).await {
            Ok(_) => tracing::trace!(%job_id, "Heartbeat"),
            Err(StoreError::Rejected(e)) => tracing::debug!(%job_id, error = %e, "Heartbeat skipped"),
            Err(e) => tracing::warn!(%job_id, error = %e, "Heartbeat failed"),
        }
    }

    /// The job ran past its deadline: record the timeout, trip the token and
    /// give the executor `cancel_grace` to wind down before aborting it.
    async fn expire(
        &self,
        job: &Job,
        token: &CancellationToken,
        handle: &mut JoinHandle<ExecutionOutcome>,
    ) {
        let timeout_secs = job
            .deadline
            .zip(job.started_at)
            .map(|(deadline, started)| (deadline - started).num_seconds().max(0) as u64)
            .unwrap_or_default();
        tracing::warn!(job_id = %job.id, timeout_secs, "Job exceeded its deadline");

        token.cancel();
        self.finalize(
            job.id,
            ExecutionOutcome::Failed(FailureDetail::timeout(timeout_secs)),
        )
        .await;

        match tokio::time::timeout(self.inner.config.cancel_grace, &mut *handle).await {
            Ok(late) => {
                tracing::debug!(job_id = %job.id, outcome = ?join_outcome(late), "Late outcome dropped");
            }
            Err(_) => {
                tracing::warn!(job_id = %job.id, "Executor ignored cancellation, aborting");
                handle.abort();
            }
        }
    }

    /// Record a terminal outcome, retrying transient store failures. When
    /// retries run out a last `store_failure` write is attempted.
    async fn finalize(&self, job_id: JobId, outcome: ExecutionOutcome) {
        let now = Utc::now();
        let apply = move |job: &mut Job| match &outcome {
            ExecutionOutcome::Completed(artifact) => job.complete(artifact.clone(), now),
            ExecutionOutcome::Failed(detail) => job.fail(detail.clone(), now),
            ExecutionOutcome::Cancelled => job.mark_cancelled(now),
        };
        let mutation: Mutation<'_> = &apply;
        let store = self.inner.store.as_ref();

        let recorded = self
            .inner
            .config
            .retry
            .run("finalize", job_id, move || store.update(job_id, mutation))
            .await;

        match recorded {
            Ok(job) => {
                tracing::info!(%job_id, state = %job.state, progress = job.progress, "Job finished");
            }
            Err(StoreError::Rejected(e)) => {
                tracing::warn!(%job_id, error = %e, "Outcome not recorded, job already settled");
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Could not record job outcome");
                let detail = FailureDetail::store_failure(e.to_string());
                let fail = move |job: &mut Job| job.fail(detail.clone(), now);
                if let Err(e) = store.update(job_id, &fail).await {
                    tracing::error!(%job_id, error = %e, "Could not record store failure");
                }
            }
        }
    }

    async fn forget(&self, job_id: JobId) {
        self.inner.running.lock().await.remove(&job_id);
    }

    /// Insert through the retry policy. A conflict after a retried insert
    /// means an earlier attempt landed before its acknowledgement was lost.
    async fn insert_job(&self, job: Job) -> Result<Job, StoreError> {
        let id = job.id;
        let store = self.inner.store.as_ref();
        let inserted = self
            .inner
            .config
            .retry
            .run("insert", id, move || store.insert(job.clone()))
            .await;

        match inserted {
            Err(StoreError::Rejected(e)) if e.is_conflict() => match store.get(id).await {
                Ok(job) => Ok(job),
                Err(_) => Err(StoreError::Rejected(e)),
            },
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Forwards executor progress to the job record. Best effort: a dropped
/// write is superseded by the next one or by the final outcome.
struct StoreProgress {
    store: Arc<dyn JobStore>,
    job_id: JobId,
}

#[async_trait]
impl ProgressSink for StoreProgress {
    async fn report(&self, percent: u8) {
        let value = i64::from(percent);
        let record = move |job: &mut Job| job.record_progress(value);
        match self.store.update(self.job_id, &record).await {
            Ok(job) => tracing::debug!(job_id = %self.job_id, progress = job.progress, "Progress"),
            Err(e) => tracing::debug!(job_id = %self.job_id, error = %e, "Progress not recorded"),
        }
    }
}

fn join_outcome(joined: Result<ExecutionOutcome, JoinError>) -> ExecutionOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            let diagnostic = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                "executor task was aborted".to_string()
            };
            ExecutionOutcome::Failed(
                FailureDetail::new(FailureCode::Panicked, "Generation stopped unexpectedly")
                    .with_diagnostic(diagnostic),
            )
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "executor panicked".to_string()
    }
}
