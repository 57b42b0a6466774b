//! PostgreSQL job store over the `generation_jobs` table.
//!
//! `update` runs inside a transaction holding `SELECT ... FOR UPDATE` on the
//! row, so concurrent updates to the same job serialize in the database the
//! same way they do on the in-memory store's per-job lock.

use async_trait::async_trait;
use chrono::Utc;
use lookgen_core::error::CoreError;
use lookgen_core::job::Job;
use lookgen_core::types::JobId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::job::JobRow;
use crate::store::{JobFilter, JobStore, Mutation, Page, StoreError};

/// Column list for `generation_jobs` queries.
const COLUMNS: &str = "\
    id, kind, request, state, progress, \
    created_at, updated_at, started_at, finished_at, deadline, \
    result, cancel_requested, source_task_id";

/// PostgreSQL unique violation.
const UNIQUE_VIOLATION: &str = "23505";

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Everything except a unique violation is worth retrying: connection
/// resets, pool timeouts, serialization failures.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Rejected(CoreError::Conflict(format!(
                "Duplicate job: {}",
                db_err.constraint().unwrap_or("unknown")
            )));
        }
    }
    if let sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) = &err {
        return StoreError::Corrupt(err.to_string());
    }
    StoreError::Transient(err.to_string())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: Job) -> Result<Job, StoreError> {
        sqlx::query(
            "INSERT INTO generation_jobs \
                 (id, kind, request, state, progress, created_at, updated_at, \
                  started_at, finished_at, deadline, result, cancel_requested, source_task_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(job.id)
        .bind(job.kind.as_str())
        .bind(Json(&job.request))
        .bind(job.state.as_str())
        .bind(i16::from(job.progress))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.deadline)
        .bind(job.result.as_ref().map(Json))
        .bind(job.cancel_requested)
        .bind(job.source_task_id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?
            .ok_or(StoreError::NotFound(id))?;
        Job::try_from(row)
    }

    async fn update(&self, id: JobId, mutation: Mutation<'_>) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?
            .ok_or(StoreError::NotFound(id))?;

        let mut job = Job::try_from(row)?;
        // Dropping `tx` on the error path rolls back and releases the lock.
        mutation(&mut job).map_err(StoreError::Rejected)?;
        job.updated_at = Utc::now().max(job.updated_at);

        sqlx::query(
            "UPDATE generation_jobs \
             SET state = $2, progress = $3, updated_at = $4, started_at = $5, \
                 finished_at = $6, deadline = $7, result = $8, cancel_requested = $9 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(job.state.as_str())
        .bind(i16::from(job.progress))
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.deadline)
        .bind(job.result.as_ref().map(Json))
        .bind(job.cancel_requested)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(job)
    }

    async fn list(&self, filter: &JobFilter, page: Page) -> Result<Vec<Job>, StoreError> {
        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if filter.state.is_some() {
            conditions.push(format!("state = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.kind.is_some() {
            conditions.push(format!("kind = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.updated_before.is_some() {
            conditions.push(format!("updated_at < ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, JobRow>(&query);
        if let Some(state) = filter.state {
            q = q.bind(state.as_str());
        }
        if let Some(kind) = filter.kind {
            q = q.bind(kind.as_str());
        }
        if let Some(before) = filter.updated_before {
            q = q.bind(before);
        }
        q = q.bind(page.clamp_limit()).bind(page.clamp_offset());

        let rows = q.fetch_all(&self.pool).await.map_err(classify)?;
        rows.into_iter().map(Job::try_from).collect()
    }
}
