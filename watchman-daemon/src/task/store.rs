//! Durable task storage.
//!
//! Tasks persist as a pretty-printed JSON array. Every save rewrites the
//! whole file through a temporary sibling that is synced and then renamed
//! over the previous one, so a crash leaves either the old or the new file.

use super::BackupTask;
use crate::utils::errors::StoreError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    /// Open the store at `path`, creating the containing directory.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all tasks. A missing or empty file means no tasks.
    pub async fn load(&self) -> Result<Vec<BackupTask>, StoreError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Task file {} does not exist, starting with no tasks", self.path.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if data.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tasks: Vec<BackupTask> =
            serde_json::from_str(&data).map_err(|source| StoreError::Format {
                path: self.path.clone(),
                source,
            })?;

        debug!("Loaded {} tasks from {}", tasks.len(), self.path.display());
        Ok(tasks)
    }

    /// Replace the stored task list with `tasks`.
    pub async fn save(&self, tasks: &[BackupTask]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(tasks).map_err(|source| StoreError::Format {
            path: self.path.clone(),
            source,
        })?;

        let temp_path = self.temp_path();
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        let mut file = fs::File::create(&temp_path).await.map_err(io_err(&temp_path))?;
        file.write_all(&data).await.map_err(io_err(&temp_path))?;
        file.sync_all().await.map_err(io_err(&temp_path))?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(io_err(&self.path))?;

        debug!("Saved {} tasks to {}", tasks.len(), self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tasks.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}
