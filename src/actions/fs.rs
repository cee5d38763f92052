//! Filesystem actions for the service's persisted-state directory.

use std::path::PathBuf;

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::info;

use crate::stage::{Probe, StageAction, StageError};

/// Creates a directory (and parents). The directory's contents are
/// opaque to the engine.
pub struct EnsureDirAction {
    path: PathBuf,
}

impl EnsureDirAction {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StageAction for EnsureDirAction {
    async fn run(&self) -> Result<String, StageError> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|e| StageError::fatal(anyhow!("create {}: {e}", self.path.display())))?;
        info!(dir = %self.path.display(), "directory created");
        Ok(format!("created {}", self.path.display()))
    }
}

/// Probe true iff the path exists and is a directory.
pub struct DirExistsProbe {
    path: PathBuf,
}

impl DirExistsProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Probe for DirExistsProbe {
    async fn evaluate(&self) -> Result<bool, StageError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StageError::transient(anyhow!(
                "stat {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// Compensation that removes a directory tree created by the run.
pub struct RemoveDirAction {
    path: PathBuf,
}

impl RemoveDirAction {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StageAction for RemoveDirAction {
    async fn run(&self) -> Result<String, StageError> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                info!(dir = %self.path.display(), "directory removed");
                Ok(format!("removed {}", self.path.display()))
            }
            // Already gone is fine for an undo.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(StageError::non_fatal(anyhow!(
                "remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
