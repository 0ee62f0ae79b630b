//! Snapshot records and modification-time handling.
//!
//! A [`FileRecord`] is built fresh on every scan and never mutated. Records
//! are compared structurally (digest equality), never by inode or other
//! stable identity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, Metadata};
use std::io;
use std::path::{Component, Path};
use std::time::{Duration, UNIX_EPOCH};

/// Point-in-time mapping from relative path to record for one tree.
pub type Snapshot = HashMap<String, FileRecord>;

/// One entry in a directory snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// `/`-joined path relative to the scan root
    pub relative_path: String,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Lowercase hex SHA-256 of the content; empty for directories
    pub digest: String,

    /// Last modified time (seconds since Unix epoch)
    pub modified: i64,

    /// Is this a directory?
    pub is_dir: bool,
}

impl FileRecord {
    pub fn directory(relative_path: String, metadata: &Metadata) -> Self {
        Self {
            relative_path,
            size: 0,
            digest: String::new(),
            modified: modified_secs(metadata),
            is_dir: true,
        }
    }

    pub fn file(relative_path: String, metadata: &Metadata, digest: String) -> Self {
        Self {
            relative_path,
            size: metadata.len(),
            digest,
            modified: modified_secs(metadata),
            is_dir: false,
        }
    }

    /// Whether `other` (the target-side record) already matches this source record.
    pub fn matches(&self, other: &FileRecord) -> bool {
        match (self.is_dir, other.is_dir) {
            (true, true) => true,
            (false, false) => self.digest == other.digest,
            _ => false,
        }
    }
}

/// Render `path` relative to `root` with forward slashes.
///
/// Returns `None` when `path` is not below `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Join a `/`-separated snapshot key onto a native root path.
pub fn join_key(root: &Path, key: &str) -> std::path::PathBuf {
    key.split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Modification time truncated to whole seconds.
pub fn modified_secs(metadata: &Metadata) -> i64 {
    match metadata.modified() {
        Ok(time) => match time.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}

/// Set the modification time of an open, writable file.
pub fn set_modified_secs(file: &File, secs: i64) -> io::Result<()> {
    let time = if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    };
    file.set_modified(time)
}
