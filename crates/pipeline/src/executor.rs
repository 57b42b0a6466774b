//! The job executor: runs one generation request to a terminal outcome.
//!
//! Stages and the progress band each one covers:
//!
//! | Stage                  | Progress  |
//! |------------------------|-----------|
//! | Schema analysis        | 5 -> 30   |
//! | Description synthesis  | 30 -> 90  |
//! | Artifact assembly/save | 90 -> 95  |
//!
//! The scheduler writes 100 when it records the completion.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lookgen_core::outcome::{ArtifactFormat, ArtifactRef, FailureCode, FailureDetail};
use lookgen_core::progress::ProgressTracker;
use lookgen_core::request::{GenerationRequest, JobKind};
use lookgen_core::types::JobId;
use tokio_util::sync::CancellationToken;

use crate::artifact::ArtifactSink;
use crate::collaborators::{
    CollaboratorError, DescriptionModel, SchemaIntrospector, TableDescription,
};
use crate::{lookml, metadata};

const SCHEMA_START: i64 = 5;
const SCHEMA_DONE: i64 = 30;
const DESCRIPTIONS_DONE: i64 = 90;
const ARTIFACT_SAVED: i64 = 95;

/// Default minimum step between forwarded progress values.
pub const DEFAULT_GRANULARITY: u8 = 5;

/// How a single execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed(ArtifactRef),
    Failed(FailureDetail),
    Cancelled,
}

/// Receives progress percentages while a job runs.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8);
}

/// Runs a generation request to completion.
///
/// Implementations must turn every failure into an [`ExecutionOutcome`]
/// and should stop promptly once `cancel` is tripped.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn run(
        &self,
        job_id: JobId,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome;
}

// ---------------------------------------------------------------------------
// GenerationExecutor
// ---------------------------------------------------------------------------

pub struct GenerationExecutor {
    introspector: Arc<dyn SchemaIntrospector>,
    model: Arc<dyn DescriptionModel>,
    sink: Arc<dyn ArtifactSink>,
    granularity: u8,
}

impl GenerationExecutor {
    pub fn new(
        introspector: Arc<dyn SchemaIntrospector>,
        model: Arc<dyn DescriptionModel>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            introspector,
            model,
            sink,
            granularity: DEFAULT_GRANULARITY,
        }
    }

    pub fn with_granularity(mut self, granularity: u8) -> Self {
        self.granularity = granularity;
        self
    }

    async fn pipeline(
        &self,
        job_id: JobId,
        request: &GenerationRequest,
        progress: &mut Reporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<ArtifactRef, Stop> {
        if cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        progress.report(SCHEMA_START).await;

        // --- Schema analysis ---
        let mut snapshot =
            cancellable(cancel, self.introspector.introspect(&request.target)).await??;

        if snapshot.tables.is_empty() {
            return Err(CollaboratorError::MalformedSchema(format!(
                "no tables found for {}",
                request.target.describe()
            ))
            .into());
        }
        if let Some(table) = snapshot.tables.iter().find(|t| t.columns.is_empty()) {
            return Err(CollaboratorError::MalformedSchema(format!(
                "table {} has no columns",
                table.qualified_name()
            ))
            .into());
        }
        if let Some(max) = request.options.max_tables {
            snapshot.tables.truncate(max as usize);
        }
        let tables = snapshot.tables;
        tracing::debug!(%job_id, tables = tables.len(), "Schema analysed");
        progress.report(SCHEMA_DONE).await;

        // --- Description synthesis ---
        let total = tables.len() as i64;
        let band = DESCRIPTIONS_DONE - SCHEMA_DONE;
        let mut descriptions: Vec<TableDescription> = Vec::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }
            let mut description =
                cancellable(cancel, self.model.describe(table, &request.options)).await??;
            if !request.options.include_columns {
                description.columns.clear();
            }
            descriptions.push(description);
            progress
                .report(SCHEMA_DONE + band * (i as i64 + 1) / total)
                .await;
        }

        // --- Artifact assembly ---
        let (format, bytes) = match request.kind {
            JobKind::MetadataGeneration => {
                let doc = metadata::build(job_id, Utc::now(), &tables, &descriptions);
                let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| {
                    Stop::Failed(
                        FailureDetail::new(
                            FailureCode::Execution,
                            "The metadata document could not be assembled",
                        )
                        .with_diagnostic(e.to_string()),
                    )
                })?;
                (ArtifactFormat::Json, bytes)
            }
            JobKind::LookmlGeneration => (
                ArtifactFormat::Lookml,
                lookml::render(&tables, &descriptions).into_bytes(),
            ),
        };

        let stored = match cancellable(cancel, self.sink.store(job_id, format, &bytes)).await {
            Ok(Ok(uri)) => Ok(uri),
            Ok(Err(e)) => Err(Stop::Failed(
                FailureDetail::new(
                    FailureCode::Execution,
                    "The generated artifact could not be saved",
                )
                .with_diagnostic(e.to_string()),
            )),
            Err(stop) => Err(stop),
        };
        let uri = match stored {
            Ok(uri) => uri,
            Err(stop) => {
                self.sink.discard(job_id, format).await;
                return Err(stop);
            }
        };
        progress.report(ARTIFACT_SAVED).await;

        // A cancel or deadline that lands after the write means the artifact
        // will never be reported.
        if cancel.is_cancelled() {
            self.sink.discard(job_id, format).await;
            return Err(Stop::Cancelled);
        }

        Ok(ArtifactRef {
            uri,
            format,
            tables: tables.len() as u32,
            bytes: bytes.len() as u64,
        })
    }
}

#[async_trait]
impl JobExecutor for GenerationExecutor {
    async fn run(
        &self,
        job_id: JobId,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        tracing::info!(
            %job_id,
            kind = %request.kind,
            target = %request.target.describe(),
            "Generation started",
        );

        let mut reporter = Reporter {
            tracker: ProgressTracker::new(self.granularity),
            sink: progress,
        };

        match self.pipeline(job_id, request, &mut reporter, cancel).await {
            Ok(artifact) => {
                tracing::info!(%job_id, uri = %artifact.uri, tables = artifact.tables, "Generation finished");
                ExecutionOutcome::Completed(artifact)
            }
            Err(Stop::Cancelled) => {
                tracing::info!(%job_id, "Generation cancelled");
                ExecutionOutcome::Cancelled
            }
            Err(Stop::Failed(detail)) => {
                tracing::warn!(
                    %job_id,
                    error = %detail.error,
                    diagnostic = detail.diagnostic.as_deref().unwrap_or(""),
                    "Generation failed",
                );
                ExecutionOutcome::Failed(detail)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

enum Stop {
    Cancelled,
    Failed(FailureDetail),
}

impl From<CollaboratorError> for Stop {
    fn from(err: CollaboratorError) -> Self {
        Stop::Failed(
            FailureDetail::new(FailureCode::Execution, err.user_message())
                .with_diagnostic(err.to_string()),
        )
    }
}

/// Race `fut` against cancellation. Cancellation wins ties.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, Stop> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Stop::Cancelled),
        out = fut => Ok(out),
    }
}

struct Reporter<'a> {
    tracker: ProgressTracker,
    sink: &'a dyn ProgressSink,
}

impl Reporter<'_> {
    async fn report(&mut self, value: i64) {
        if let Some(percent) = self.tracker.advance(value) {
            self.sink.report(percent).await;
        }
    }
}
