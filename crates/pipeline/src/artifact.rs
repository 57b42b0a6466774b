//! Artifact persistence.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use lookgen_core::outcome::ArtifactFormat;
use lookgen_core::types::JobId;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Stores a finished artifact and returns its URI.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn store(
        &self,
        job_id: JobId,
        format: ArtifactFormat,
        bytes: &[u8],
    ) -> Result<String, ArtifactError>;

    /// Best-effort removal of whatever `store` left behind for a job that
    /// will not report it, including a partially written file.
    async fn discard(&self, job_id: JobId, format: ArtifactFormat);
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// Writes `<dir>/<job_id>.<ext>`.
///
/// The file is written under a temporary name and renamed into place, so a
/// reader never sees a partial artifact.
pub struct FsArtifactSink {
    dir: PathBuf,
}

impl FsArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `ARTIFACT_DIR`, defaulting to `./artifacts`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("ARTIFACT_DIR").unwrap_or_else(|_| "./artifacts".into()))
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Final and temporary paths for a job's artifact.
    fn paths(&self, job_id: JobId, format: ArtifactFormat) -> (PathBuf, PathBuf) {
        let file_name = format!("{job_id}.{}", format.extension());
        let tmp = self.dir.join(format!(".{file_name}.tmp"));
        (self.dir.join(file_name), tmp)
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    async fn store(
        &self,
        job_id: JobId,
        format: ArtifactFormat,
        bytes: &[u8],
    ) -> Result<String, ArtifactError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ArtifactError::io(&self.dir, e))?;

        let (path, tmp) = self.paths(job_id, format);

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| ArtifactError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ArtifactError::io(&path, e))?;

        let absolute = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| ArtifactError::io(&path, e))?;
        Ok(format!("file://{}", absolute.display()))
    }

    async fn discard(&self, job_id: JobId, format: ArtifactFormat) {
        let (path, tmp) = self.paths(job_id, format);
        for file in [path, tmp] {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => tracing::debug!(%job_id, path = %file.display(), "Artifact discarded"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(%job_id, path = %file.display(), error = %e, "Could not discard artifact");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keeps artifacts in memory under `memory://<job_id>.<ext>`.
#[derive(Default)]
pub struct MemoryArtifactSink {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.artifacts.lock().await.get(uri).cloned()
    }

    pub async fn len(&self) -> usize {
        self.artifacts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.lock().await.is_empty()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn store(
        &self,
        job_id: JobId,
        format: ArtifactFormat,
        bytes: &[u8],
    ) -> Result<String, ArtifactError> {
        let uri = format!("memory://{job_id}.{}", format.extension());
        self.artifacts
            .lock()
            .await
            .insert(uri.clone(), bytes.to_vec());
        Ok(uri)
    }

    async fn discard(&self, job_id: JobId, format: ArtifactFormat) {
        let uri = format!("memory://{job_id}.{}", format.extension());
        self.artifacts.lock().await.remove(&uri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_sink_writes_file_and_returns_uri() {
        let dir = std::env::temp_dir().join(format!("lookgen-artifacts-{}", uuid::Uuid::new_v4()));
        let sink = FsArtifactSink::new(&dir);
        let job_id = uuid::Uuid::now_v7();

        let uri = sink
            .store(job_id, ArtifactFormat::Lookml, b"view: orders {}\n")
            .await
            .unwrap();

        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with(&format!("{job_id}.view.lkml")));
        let written = std::fs::read(dir.join(format!("{job_id}.view.lkml"))).unwrap();
        assert_eq!(written, b"view: orders {}\n");
        assert!(!dir.join(format!(".{job_id}.view.lkml.tmp")).exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn fs_sink_discard_removes_final_and_partial_files() {
        let dir = std::env::temp_dir().join(format!("lookgen-artifacts-{}", uuid::Uuid::new_v4()));
        let sink = FsArtifactSink::new(&dir);
        let job_id = uuid::Uuid::now_v7();
        sink.store(job_id, ArtifactFormat::Json, b"{}").await.unwrap();
        let partial = dir.join(format!(".{job_id}.json.tmp"));
        std::fs::write(&partial, b"{").unwrap();

        sink.discard(job_id, ArtifactFormat::Json).await;

        assert!(!dir.join(format!("{job_id}.json")).exists());
        assert!(!partial.exists());
        // Nothing left to remove is not an error.
        sink.discard(job_id, ArtifactFormat::Json).await;

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn memory_sink_round_trips() {
        let sink = MemoryArtifactSink::new();
        let job_id = uuid::Uuid::now_v7();
        let uri = sink.store(job_id, ArtifactFormat::Json, b"{}").await.unwrap();

        assert_eq!(uri, format!("memory://{job_id}.json"));
        assert_eq!(sink.get(&uri).await.as_deref(), Some(&b"{}"[..]));
        assert_eq!(sink.len().await, 1);
    }
}
