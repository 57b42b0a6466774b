//! In-process job store.
//!
//! The map itself sits behind an `RwLock` that is only write-locked to
//! insert; every record has its own `Mutex`. Updates to one job therefore
//! serialize on that job's lock alone, and status reads of other jobs never
//! wait on them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lookgen_core::error::CoreError;
use lookgen_core::job::Job;
use lookgen_core::types::JobId;
use tokio::sync::{Mutex, RwLock};

use crate::store::{JobFilter, JobStore, Mutation, Page, StoreError};

#[derive(Default)]
pub struct MemoryJobStore {
    // UUIDv7 keys: iteration order is submission order.
    jobs: RwLock<BTreeMap<JobId, Arc<Mutex<Job>>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    async fn slot(&self, id: JobId) -> Result<Arc<Mutex<Job>>, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Rejected(CoreError::Conflict(format!(
                "Job {} already exists",
                job.id
            ))));
        }
        jobs.insert(job.id, Arc::new(Mutex::new(job.clone())));
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let slot = self.slot(id).await?;
        let job = slot.lock().await;
        Ok(job.clone())
    }

    async fn update(&self, id: JobId, mutation: Mutation<'_>) -> Result<Job, StoreError> {
        let slot = self.slot(id).await?;
        let mut current = slot.lock().await;

        // Mutate a copy so a rejected mutation leaves no partial writes.
        let mut draft = current.clone();
        mutation(&mut draft).map_err(StoreError::Rejected)?;
        draft.updated_at = Utc::now().max(current.updated_at);

        *current = draft;
        Ok(current.clone())
    }

    async fn list(&self, filter: &JobFilter, page: Page) -> Result<Vec<Job>, StoreError> {
        let slots: Vec<Arc<Mutex<Job>>> = self.jobs.read().await.values().cloned().collect();

        let offset = page.clamp_offset() as usize;
        let limit = page.clamp_limit() as usize;

        let mut matched = Vec::new();
        let mut skipped = 0usize;
        for slot in slots.iter().rev() {
            let job = slot.lock().await;
            if !filter.matches(&job) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            matched.push(job.clone());
            if matched.len() == limit {
                break;
            }
        }
        Ok(matched)
    }
}
