//! Filesystem side of a sync pass: create, copy and remove entries.

use super::diff::{Orphan, PlannedEntry};
use crate::fs::metadata::{join_key, set_modified_secs};
use crate::utils::errors::FileError;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::debug;

/// What applying one planned entry did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    CreatedDir,
    Copied { bytes: u64 },
}

/// Materialize one sync-set entry under `target_root`.
///
/// Files are streamed from `source_root` and stamped with the source's
/// recorded modification time, not the copy time. A symlink already sitting
/// at the target path is replaced, never written through.
pub fn apply_entry(
    source_root: &Path,
    target_root: &Path,
    entry: &PlannedEntry,
) -> Result<Applied, FileError> {
    let record = &entry.record;
    let target_path = join_key(target_root, &record.relative_path);

    if entry.replaces_other_kind {
        remove_path(&target_path, !record.is_dir)?;
    }
    unlink_symlink(&target_path)?;

    if record.is_dir {
        fs::create_dir_all(&target_path).map_err(|e| FileError::from_io(&target_path, e))?;
        debug!("Created directory {}", target_path.display());
        return Ok(Applied::CreatedDir);
    }

    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|e| FileError::from_io(parent, e))?;
    }

    let source_path = join_key(source_root, &record.relative_path);
    let bytes = copy_file(&source_path, &target_path, record.modified)?;
    debug!("Copied {} ({} bytes)", record.relative_path, bytes);

    Ok(Applied::Copied { bytes })
}

/// Copy `src` to `dst` and set the destination mtime to `modified`.
///
/// # Returns
/// * `Ok(u64)` - Number of bytes written
/// * `Err(FileError)` - If either side cannot be opened, read or written
pub fn copy_file(src: &Path, dst: &Path, modified: i64) -> Result<u64, FileError> {
    let mut reader = File::open(src).map_err(|e| FileError::from_io(src, e))?;
    let mut writer = File::create(dst).map_err(|e| FileError::from_io(dst, e))?;

    let bytes = io::copy(&mut reader, &mut writer).map_err(|e| FileError::from_io(dst, e))?;
    set_modified_secs(&writer, modified).map_err(|e| FileError::from_io(dst, e))?;

    Ok(bytes)
}

/// Remove a target-only entry, recursively for directories.
///
/// Returns `false` when the path was already gone.
pub fn remove_orphan(target_root: &Path, orphan: &Orphan) -> Result<bool, FileError> {
    let path = join_key(target_root, &orphan.relative_path);
    let removed = remove_path(&path, orphan.is_dir)?;
    if removed {
        debug!("Removed {}", orphan.relative_path);
    }
    Ok(removed)
}

fn unlink_symlink(path: &Path) -> Result<(), FileError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            debug!("Replacing symlink {}", path.display());
            fs::remove_file(path).map_err(|e| FileError::from_io(path, e))
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FileError::from_io(path, e)),
    }
}

fn remove_path(path: &Path, is_dir: bool) -> Result<bool, FileError> {
    let result = if is_dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FileError::from_io(path, e)),
    }
}
