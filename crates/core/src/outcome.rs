//! Terminal job results: artifact references and failure details.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Serialization format of a generated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    Json,
    Lookml,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Lookml => "view.lkml",
        }
    }
}

/// Where a completed job's artifact was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub uri: String,
    pub format: ArtifactFormat,
    /// Number of tables covered by the artifact.
    pub tables: u32,
    pub bytes: u64,
}

/// Machine-readable failure category stored alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// The executor reported an unrecoverable failure.
    Execution,
    /// The job ran past its deadline.
    Timeout,
    /// Store writes kept failing after retries.
    StoreFailure,
    /// Marked failed by the reconciliation sweep.
    Stale,
    /// The executor panicked.
    Panicked,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Execution => "execution",
            Self::Timeout => "timeout",
            Self::StoreFailure => "store_failure",
            Self::Stale => "stale",
            Self::Panicked => "panicked",
        };
        f.write_str(s)
    }
}

/// Failure detail recorded on a failed job.
///
/// `error` is shown to users; `diagnostic` is internal detail (collaborator
/// responses, store errors) and is never exposed by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub error: String,
    pub code: FailureCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl FailureDetail {
    pub fn new(code: FailureCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn timeout(after_secs: u64) -> Self {
        Self::new(
            FailureCode::Timeout,
            format!("Generation did not finish within {after_secs} seconds"),
        )
    }

    pub fn stale(threshold_secs: u64) -> Self {
        Self::new(
            FailureCode::Stale,
            "Generation stopped responding and was abandoned",
        )
        .with_diagnostic(format!(
            "no heartbeat for more than {threshold_secs}s, marked failed by reconciliation sweep"
        ))
    }

    pub fn store_failure(diagnostic: impl Into<String>) -> Self {
        Self::new(
            FailureCode::StoreFailure,
            "Job state could not be saved; please resubmit",
        )
        .with_diagnostic(diagnostic)
    }
}

/// The `result` field of a terminal job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Artifact { artifact: ArtifactRef },
    Failure(FailureDetail),
}

impl JobResult {
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        match self {
            Self::Artifact { artifact } => Some(artifact),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        match self {
            Self::Artifact { .. } => None,
            Self::Failure(detail) => Some(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_serializes_flat_with_error_field() {
        let result = JobResult::Failure(FailureDetail::new(FailureCode::Execution, "boom"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error"], "boom");
        assert_eq!(json["code"], "execution");
        assert!(json.get("diagnostic").is_none());
    }

    #[test]
    fn artifact_result_parses_back() {
        let json = serde_json::json!({
            "artifact": {"uri": "file:///tmp/a.json", "format": "json", "tables": 1, "bytes": 10}
        });
        let result: JobResult = serde_json::from_value(json).unwrap();
        assert_eq!(result.artifact().unwrap().tables, 1);
        assert!(result.failure().is_none());
    }

    #[test]
    fn stale_detail_keeps_diagnostic_separate() {
        let detail = FailureDetail::stale(600);
        assert_eq!(detail.code, FailureCode::Stale);
        assert!(!detail.error.contains("600"));
        assert!(detail.diagnostic.unwrap().contains("600s"));
    }
}
