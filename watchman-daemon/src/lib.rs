//! Watchman backup daemon library
//!
//! Incremental one-way directory backup: content-hash scanning, diff/apply
//! sync, scheduled tasks with durable state, and a Unix socket control
//! boundary for the `watchman` CLI.

pub mod config;
pub mod daemon;
pub mod fs;
pub mod ipc;
pub mod sync;
pub mod task;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use sync::{SyncEngine, SyncReport};
pub use task::{BackupTask, NewTask, Schedule, TaskManager, TaskStatus, TaskStore};
pub use utils::errors::{DaemonError, Result};
