//! Tests for `MemoryJobStore`.
//!
//! Exercise the store contract directly: insert/get, atomic updates, rejected
//! mutations, per-job serialization under concurrency, and filtered listing.

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use lookgen_core::error::CoreError;
use lookgen_core::job::{Job, JobState};
use lookgen_core::request::{GenerationRequest, JobKind, Target};
use lookgen_db::{JobFilter, JobStore, MemoryJobStore, Page, StoreError};

fn pending_job(kind: JobKind, table: &str) -> Job {
    Job::new(GenerationRequest::new(kind, Target::table(table)), Utc::now())
}

// ---------------------------------------------------------------------------
// Test: insert then get returns the same record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_then_get_round_trips() {
    let store = MemoryJobStore::new();
    let job = pending_job(JobKind::MetadataGeneration, "orders");

    store.insert(job.clone()).await.unwrap();
    let fetched = store.get(job.id).await.unwrap();

    assert_eq!(fetched, job);
    assert_eq!(store.len().await, 1);
}

// ---------------------------------------------------------------------------
// Test: unknown id is NotFound for get and update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_id_is_not_found() {
    let store = MemoryJobStore::new();
    let id = uuid::Uuid::now_v7();

    assert_matches!(store.get(id).await, Err(StoreError::NotFound(missing)) if missing == id);
    assert_matches!(
        store.update(id, &|j: &mut Job| j.request_cancel()).await,
        Err(StoreError::NotFound(_))
    );
}

// ---------------------------------------------------------------------------
// Test: duplicate insert is rejected as a conflict
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_insert_conflicts() {
    let store = MemoryJobStore::new();
    let job = pending_job(JobKind::MetadataGeneration, "orders");
    store.insert(job.clone()).await.unwrap();

    assert_matches!(
        store.insert(job).await,
        Err(StoreError::Rejected(CoreError::Conflict(_)))
    );
}

// ---------------------------------------------------------------------------
// Test: update applies the mutation and bumps updated_at
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_applies_mutation_and_bumps_updated_at() {
    let store = MemoryJobStore::new();
    let job = pending_job(JobKind::MetadataGeneration, "orders");
    let before = job.updated_at;
    store.insert(job.clone()).await.unwrap();

    let updated = store
        .update(job.id, &|j: &mut Job| j.begin(Utc::now(), None))
        .await
        .unwrap();

    assert_eq!(updated.state, JobState::Running);
    assert!(updated.updated_at >= before);
    assert_eq!(store.get(job.id).await.unwrap().state, JobState::Running);
}

// ---------------------------------------------------------------------------
// Test: a rejected mutation leaves the record untouched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_mutation_leaves_record_untouched() {
    let store = MemoryJobStore::new();
    let job = pending_job(JobKind::MetadataGeneration, "orders");
    store.insert(job.clone()).await.unwrap();

    // Partially mutate, then refuse.
    let res = store
        .update(job.id, &|j: &mut Job| {
            j.progress = 77;
            Err(CoreError::Conflict("nope".into()))
        })
        .await;

    assert_matches!(res, Err(StoreError::Rejected(CoreError::Conflict(_))));
    assert_eq!(store.get(job.id).await.unwrap(), job);
}

// ---------------------------------------------------------------------------
// Test: concurrent updates on one job never interleave
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_are_serialized() {
    let store = Arc::new(MemoryJobStore::new());
    let job = pending_job(JobKind::MetadataGeneration, "orders");
    store.insert(job.clone()).await.unwrap();
    store
        .update(job.id, &|j: &mut Job| j.begin(Utc::now(), None))
        .await
        .unwrap();

    // Each writer reads progress and writes progress + 1 inside one
    // mutation; interleaving would lose increments.
    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = Arc::clone(&store);
        let id = job.id;
        handles.push(tokio::spawn(async move {
            store
                .update(id, &|j: &mut Job| {
                    let next = i64::from(j.progress) + 1;
                    j.record_progress(next)
                })
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(store.get(job.id).await.unwrap().progress, 50);
}

// ---------------------------------------------------------------------------
// Test: list filters by state and kind, newest first, with pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_filters_and_paginates_newest_first() {
    let store = MemoryJobStore::new();
    let mut ids = Vec::new();
    for i in 0..5 {
        let kind = if i % 2 == 0 {
            JobKind::MetadataGeneration
        } else {
            JobKind::LookmlGeneration
        };
        let job = pending_job(kind, &format!("t{i}"));
        ids.push(job.id);
        store.insert(job).await.unwrap();
    }
    store
        .update(ids[0], &|j: &mut Job| j.begin(Utc::now(), None))
        .await
        .unwrap();

    let all = store.list(&JobFilter::default(), Page::default()).await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].id, ids[4], "newest first");

    let running = JobFilter {
        state: Some(JobState::Running),
        ..Default::default()
    };
    let listed = store.list(&running, Page::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, ids[0]);

    let metadata = JobFilter {
        kind: Some(JobKind::MetadataGeneration),
        ..Default::default()
    };
    let page = store.list(&metadata, Page::new(1, 1)).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, ids[2]);
}

// ---------------------------------------------------------------------------
// Test: updated_before only returns older records
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_updated_before_excludes_recent_records() {
    let store = MemoryJobStore::new();
    let job = pending_job(JobKind::MetadataGeneration, "orders");
    store.insert(job.clone()).await.unwrap();

    let past = JobFilter {
        updated_before: Some(job.updated_at - chrono::Duration::seconds(1)),
        ..Default::default()
    };
    assert!(store.list(&past, Page::default()).await.unwrap().is_empty());

    let future = JobFilter {
        updated_before: Some(Utc::now() + chrono::Duration::seconds(60)),
        ..Default::default()
    };
    assert_eq!(store.list(&future, Page::default()).await.unwrap().len(), 1);
}
