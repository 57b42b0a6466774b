//! Integration tests for `PgJobStore` against a real database.
//!
//! Each test gets a fresh database with the crate's migrations applied:
//! - Insert and get
//! - Duplicate ids as conflicts
//! - Rejected mutations leave the row untouched
//! - Successful updates bump `updated_at`
//! - Concurrent updates to one row serialize
//! - List filters combined with pagination

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use lookgen_core::error::CoreError;
use lookgen_core::job::{Job, JobState};
use lookgen_core::outcome::{ArtifactFormat, ArtifactRef};
use lookgen_core::request::{GenerationRequest, JobKind, Target};
use lookgen_db::{JobFilter, JobStore, Page, PgJobStore, StoreError};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn pending_job(kind: JobKind, table: &str) -> Job {
    Job::new(GenerationRequest::new(kind, Target::table(table)), Utc::now())
}

fn artifact() -> ArtifactRef {
    ArtifactRef {
        uri: "file:///tmp/orders.json".into(),
        format: ArtifactFormat::Json,
        tables: 1,
        bytes: 42,
    }
}

// ---------------------------------------------------------------------------
// Test: insert then get
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_insert_then_get(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let job = pending_job(JobKind::LookmlGeneration, "orders");

    store.insert(job.clone()).await.unwrap();
    let fetched = store.get(job.id).await.unwrap();

    assert_eq!(fetched.id, job.id);
    assert_eq!(fetched.kind, JobKind::LookmlGeneration);
    assert_eq!(fetched.request, job.request);
    assert_eq!(fetched.state, JobState::Pending);
    assert_eq!(fetched.progress, 0);
    assert_eq!(
        fetched.created_at.timestamp_micros(),
        job.created_at.timestamp_micros()
    );
    assert!(fetched.result.is_none());
    assert!(!fetched.cancel_requested);
}

// ---------------------------------------------------------------------------
// Test: unknown ids and duplicate inserts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_unknown_id_is_not_found(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let id = uuid::Uuid::now_v7();

    assert_matches!(store.get(id).await, Err(StoreError::NotFound(missing)) if missing == id);
    assert_matches!(
        store.update(id, &|j: &mut Job| j.request_cancel()).await,
        Err(StoreError::NotFound(_))
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn test_duplicate_insert_is_a_conflict(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let job = pending_job(JobKind::MetadataGeneration, "orders");
    store.insert(job.clone()).await.unwrap();

    let err = store.insert(job).await.unwrap_err();

    assert_matches!(err, StoreError::Rejected(e) if e.is_conflict());
}

// ---------------------------------------------------------------------------
// Test: a rejected mutation leaves the row unchanged
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_rejected_mutation_leaves_row_unchanged(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let job = pending_job(JobKind::MetadataGeneration, "orders");
    store.insert(job.clone()).await.unwrap();
    let before = store.get(job.id).await.unwrap();

    let err = store
        .update(job.id, &|j: &mut Job| {
            j.progress = 77;
            j.complete(artifact(), Utc::now())
        })
        .await
        .unwrap_err();

    assert_matches!(err, StoreError::Rejected(CoreError::Conflict(_)));
    let after = store.get(job.id).await.unwrap();
    assert_eq!(after, before);
}

// ---------------------------------------------------------------------------
// Test: a successful update persists the transition and bumps updated_at
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_update_persists_and_bumps_updated_at(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let mut job = pending_job(JobKind::MetadataGeneration, "orders");
    job.updated_at = Utc::now() - Duration::seconds(60);
    store.insert(job.clone()).await.unwrap();

    let started = store
        .update(job.id, &|j: &mut Job| j.begin(Utc::now(), None))
        .await
        .unwrap();
    assert_eq!(started.state, JobState::Running);
    assert!(started.updated_at > job.updated_at);

    store
        .update(job.id, &|j: &mut Job| j.complete(artifact(), Utc::now()))
        .await
        .unwrap();

    let done = store.get(job.id).await.unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.result.as_ref().and_then(|r| r.artifact()), Some(&artifact()));
    assert!(done.started_at.is_some());
    assert!(done.finished_at.is_some());
    assert!(done.updated_at >= started.updated_at);
}

// ---------------------------------------------------------------------------
// Test: concurrent updates on one row serialize under FOR UPDATE
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_concurrent_updates_serialize(pool: PgPool) {
    let store = Arc::new(PgJobStore::new(pool));
    let job = pending_job(JobKind::MetadataGeneration, "orders");
    store.insert(job.clone()).await.unwrap();
    store
        .update(job.id, &|j: &mut Job| j.begin(Utc::now(), None))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for percent in 1..=20_i64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .update(job.id, &|j: &mut Job| j.record_progress(percent))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.get(job.id).await.unwrap().progress, 20);
}

// ---------------------------------------------------------------------------
// Test: list filters combine with pagination
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_list_filters_and_paginates(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let base = Utc::now() - Duration::seconds(100);

    let mut metadata = Vec::new();
    for i in 0..5 {
        let mut job = pending_job(JobKind::MetadataGeneration, &format!("m{i}"));
        job.created_at = base + Duration::seconds(i);
        job.updated_at = job.created_at;
        store.insert(job.clone()).await.unwrap();
        metadata.push(job);
    }
    for i in 0..3 {
        let mut job = pending_job(JobKind::LookmlGeneration, &format!("l{i}"));
        job.created_at = base + Duration::seconds(10 + i);
        job.updated_at = job.created_at;
        store.insert(job).await.unwrap();
    }
    store
        .update(metadata[0].id, &|j: &mut Job| j.begin(Utc::now(), None))
        .await
        .unwrap();

    let all = store.list(&JobFilter::default(), Page::new(100, 0)).await.unwrap();
    assert_eq!(all.len(), 8);

    let pending_metadata = JobFilter {
        state: Some(JobState::Pending),
        kind: Some(JobKind::MetadataGeneration),
        ..Default::default()
    };
    let first = store.list(&pending_metadata, Page::new(2, 0)).await.unwrap();
    let second = store.list(&pending_metadata, Page::new(2, 2)).await.unwrap();
    let third = store.list(&pending_metadata, Page::new(2, 4)).await.unwrap();

    // Newest first.
    let ids: Vec<_> = first.iter().chain(&second).chain(&third).map(|j| j.id).collect();
    let expected: Vec<_> = metadata[1..].iter().rev().map(|j| j.id).collect();
    assert_eq!(ids, expected);
    assert!(third.is_empty());

    let lookml = JobFilter {
        kind: Some(JobKind::LookmlGeneration),
        ..Default::default()
    };
    assert_eq!(store.list(&lookml, Page::new(10, 1)).await.unwrap().len(), 2);

    let stale = JobFilter {
        state: Some(JobState::Pending),
        updated_before: Some(base + Duration::seconds(2)),
        ..Default::default()
    };
    let stale_ids: Vec<_> = store
        .list(&stale, Page::new(10, 0))
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(stale_ids, vec![metadata[1].id]);
}
