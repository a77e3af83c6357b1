use async_trait::async_trait;
use recipient_core::error::DashboardError;
use recipient_core::service::{ExportArtifact, Exporter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Writes artifacts into a directory. Path separators in the artifact name
/// (the issue date is `DD/MM/YYYY`) are replaced with `-`.
#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, artifact: &ExportArtifact) -> PathBuf {
        self.dir.join(artifact.file_name.replace(['/', '\\'], "-"))
    }
}

#[async_trait]
impl Exporter for FileExporter {
    async fn deliver(&self, artifact: ExportArtifact) -> Result<(), DashboardError> {
        let path = self.path_for(&artifact);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DashboardError::Export(format!("{}: {e}", self.dir.display())))?;
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| DashboardError::Export(format!("{}: {e}", path.display())))?;

        info!(
            path = %path.display(),
            content_type = artifact.content_type,
            bytes = artifact.bytes.len(),
            "export written"
        );
        Ok(())
    }
}

/// Keeps delivered artifacts in memory.
#[derive(Debug, Default)]
pub struct MemoryExporter {
    delivered: Mutex<Vec<ExportArtifact>>,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Result<Vec<ExportArtifact>, DashboardError> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .map_err(|_| DashboardError::InvariantViolation("exporter lock poisoned".to_string()))
    }
}

#[async_trait]
impl Exporter for MemoryExporter {
    async fn deliver(&self, artifact: ExportArtifact) -> Result<(), DashboardError> {
        let mut delivered = self
            .delivered
            .lock()
            .map_err(|_| DashboardError::InvariantViolation("exporter lock poisoned".to_string()))?;
        delivered.push(artifact);
        Ok(())
    }
}
