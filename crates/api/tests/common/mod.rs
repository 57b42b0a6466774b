//! Shared setup for HTTP integration tests.
//!
//! Requests go straight to the router through `tower::ServiceExt::oneshot`;
//! jobs live in a [`MemoryJobStore`] and run on a gated fake executor.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use lookgen_api::config::ServerConfig;
use lookgen_api::router::build_app_router;
use lookgen_api::state::AppState;
use lookgen_core::outcome::{ArtifactFormat, ArtifactRef, FailureCode, FailureDetail};
use lookgen_core::request::GenerationRequest;
use lookgen_core::types::JobId;
use lookgen_db::{JobStore, MemoryJobStore, TaskQueue};
use lookgen_pipeline::{ExecutionOutcome, JobExecutor, ProgressSink};
use lookgen_worker::{Scheduler, SchedulerConfig, StatusService, StoreRetryPolicy};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
    }
}

/// Reports 40% and completes once the gate is opened. A first table named
/// `fail` fails instead.
pub struct GatedExecutor {
    pub gate: Semaphore,
}

impl GatedExecutor {
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl JobExecutor for GatedExecutor {
    async fn run(
        &self,
        job_id: JobId,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        if request.target.tables.first().map(String::as_str) == Some("fail") {
            return ExecutionOutcome::Failed(
                FailureDetail::new(FailureCode::Execution, "The target schema could not be read")
                    .with_diagnostic("relation \"fail\" does not exist"),
            );
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

pub struct TestApp {
    pub router: Router,
    pub scheduler: Scheduler,
    pub store: Arc<dyn JobStore>,
    pub executor: Arc<GatedExecutor>,
}

impl TestApp {
    /// A fresh handle on the router for one request.
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router with all middleware layers over an
/// in-memory store. The dispatcher is running.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(GatedExecutor {
        gate: Semaphore::new(0),
    });

    let scheduler = Scheduler::new(
        Arc::clone(&store),
        Arc::new(TaskQueue::new()),
        executor.clone(),
        SchedulerConfig {
            pool_size: 2,
            job_timeout: None,
            heartbeat_interval: Duration::from_millis(50),
            cancel_grace: Duration::from_millis(100),
            progress_granularity: 1,
            retry: StoreRetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                multiplier: 2.0,
            },
        },
    );
    scheduler.start();

    let state = AppState {
        scheduler: scheduler.clone(),
        status: StatusService::new(Arc::clone(&store)),
        pool: None,
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        scheduler,
        store,
        executor,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::post(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `GET /api/v1/jobs/{id}` until `pred` holds, or panic after 5 s.
pub async fn poll_until(
    test: &TestApp,
    job_id: &str,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let json = body_json(get(test.app(), &format!("/api/v1/jobs/{job_id}")).await).await;
        if pred(&json) {
            return json;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out polling job {job_id}: {json}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
