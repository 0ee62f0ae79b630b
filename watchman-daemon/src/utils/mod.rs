//! Utility modules for the watchman daemon.

pub mod errors;
pub mod logger;

pub use errors::{DaemonError, FileError, Result, StoreError, SyncError, TaskError};
