//! Configuration management for the watchman daemon.
//!
//! Loads configuration from a TOML file. Every key is optional; missing
//! sections and keys fall back to the defaults below.

use crate::fs::scanner::{ScanOptions, DEFAULT_HASH_WORKERS, DEFAULT_QUEUE_CAPACITY};
use crate::ipc::DEFAULT_SOCKET_PATH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Control socket location
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// PID file location
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Persisted task list
    #[serde(default = "default_tasks_file")]
    pub tasks_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of hashing threads per scan
    #[serde(default = "default_hash_workers")]
    pub hash_workers: usize,

    /// Bound of the scan job and result queues
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/watchman.pid")
}

fn default_tasks_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".watchman")
        .join("tasks.json")
}

fn default_hash_workers() -> usize {
    DEFAULT_HASH_WORKERS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            pid_file: default_pid_file(),
            tasks_file: default_tasks_file(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hash_workers: default_hash_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SyncConfig {
    /// Scanner settings, with zero values raised to 1.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            workers: self.hash_workers.max(1),
            queue_capacity: self.queue_capacity.max(1),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
