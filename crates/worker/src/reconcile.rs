//! Periodic sweep that fails orphaned running jobs.
//!
//! A job is orphaned when its process died mid-run: it stays `running` and
//! its heartbeat stops. Anything `running` whose `updated_at` is older than
//! the staleness threshold is marked `failed` with code `stale`. This is an
//! operational recovery path; it does not make execution exactly-once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lookgen_core::job::{Job, JobState};
use lookgen_core::outcome::FailureDetail;
use lookgen_core::types::Timestamp;
use lookgen_db::store::MAX_LIMIT;
use lookgen_db::{JobFilter, JobStore, Page, StoreError};
use tokio_util::sync::CancellationToken;

use crate::config::ReconcileConfig;

/// Fail every running job not updated within `staleness` of `now`.
/// Returns how many were marked.
pub async fn sweep_once(
    store: &dyn JobStore,
    staleness: Duration,
    now: Timestamp,
) -> Result<usize, StoreError> {
    let cutoff = chrono::Duration::from_std(staleness)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(now);
    let filter = JobFilter {
        state: Some(JobState::Running),
        kind: None,
        updated_before: Some(cutoff),
    };
    let detail = FailureDetail::stale(staleness.as_secs());
    let mark_stale = move |job: &mut Job| job.fail_if_stale(cutoff, detail.clone(), now);

    let mut swept = 0;
    loop {
        // Marked jobs drop out of the filter, so the first page is always
        // the next batch.
        let batch = store.list(&filter, Page::new(MAX_LIMIT, 0)).await?;
        let mut marked_in_batch = 0;

        for job in &batch {
            match store.update(job.id, &mark_stale).await {
                Ok(_) => {
                    tracing::warn!(job_id = %job.id, updated_at = %job.updated_at, "Marked stale job failed");
                    marked_in_batch += 1;
                }
                // Heartbeat or completion landed after the listing.
                Err(StoreError::Rejected(_)) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        swept += marked_in_batch;
        if batch.len() < MAX_LIMIT as usize || marked_in_batch == 0 {
            break;
        }
    }

    Ok(swept)
}

/// Run the sweep every `config.interval` until `cancel` is triggered.
pub async fn run(store: Arc<dyn JobStore>, config: ReconcileConfig, cancel: CancellationToken) {
    tracing::info!(
        staleness_secs = config.staleness.as_secs(),
        interval_secs = config.interval.as_secs(),
        "Reconciliation sweep started"
    );

    let mut interval = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconciliation sweep stopping");
                break;
            }
            _ = interval.tick() => {
                match sweep_once(store.as_ref(), config.staleness, Utc::now()).await {
                    Ok(0) => tracing::debug!("Reconciliation: no stale jobs"),
                    Ok(swept) => tracing::info!(swept, "Reconciliation: failed stale jobs"),
                    Err(e) => tracing::error!(error = %e, "Reconciliation sweep failed"),
                }
            }
        }
    }
}
