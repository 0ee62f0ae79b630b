//! Custom error types for the watchman daemon.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while hashing or scanning files.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => FileError::PermissionDenied(path.to_path_buf()),
            _ => FileError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FileError::NotFound(path) | FileError::PermissionDenied(path) => path,
            FileError::Io { path, .. } => path,
        }
    }
}

/// Errors that abort a single sync pass.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to create target directory {}: {source}", path.display())]
    PrepareTarget {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to scan source directory: {0}")]
    ScanSource(#[source] FileError),

    #[error("failed to scan target directory: {0}")]
    ScanTarget(#[source] FileError),

    #[error("failed to apply {relative_path}: {source}")]
    Apply {
        relative_path: String,
        #[source]
        source: FileError,
    },

    #[error("sync aborted: {0}")]
    Aborted(String),
}

/// Errors returned by task manager operations.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task {0} does not exist")]
    NotFound(String),

    #[error("task {0} already exists")]
    AlreadyExists(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("task store error: {0}")]
    Store(#[from] StoreError),

    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Errors reading or rewriting the persisted task file.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed task file {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the daemon glue (config, socket, process singleton).
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("watchman daemon is already running (pid {0})")]
    AlreadyRunning(i32),

    #[error("Daemon error: {0}")]
    Daemon(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_classifies_kinds() {
        let path = Path::new("/tmp/missing");

        let err = FileError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, FileError::NotFound(_)));

        let err = FileError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, FileError::PermissionDenied(_)));

        let err = FileError::from_io(path, io::Error::other("disk on fire"));
        assert!(matches!(err, FileError::Io { .. }));
        assert_eq!(err.path(), path);
    }

    #[test]
    fn test_task_error_messages() {
        assert_eq!(
            TaskError::AlreadyExists("docs".into()).to_string(),
            "task docs already exists"
        );
        assert_eq!(
            TaskError::NotFound("docs".into()).to_string(),
            "task docs does not exist"
        );
    }
}
