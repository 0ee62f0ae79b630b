//! Single-instance guard backed by a PID file.

use crate::utils::errors::{DaemonError, Result};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Holds the PID file for as long as the daemon runs; removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claim `path` for the current process.
    ///
    /// Fails with [`DaemonError::AlreadyRunning`] when the file names a live
    /// process. Unreadable or stale files are replaced.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(pid) = read_pid(&path) {
            if pid != std::process::id() as i32 && is_alive(pid) {
                return Err(DaemonError::AlreadyRunning(pid));
            }
            info!("Removing stale PID file {} (pid {})", path.display(), pid);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{}\n", std::process::id()))?;
        debug!("Wrote PID file {}", path.display());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove PID file {}: {}", self.path.display(), e);
        }
    }
}

fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0)
}

/// Check a process with signal 0. EPERM still means it exists.
fn is_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_writes_and_drop_removes() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("run/watchman.pid");

        let pid_file = PidFile::acquire(&path)?;
        assert_eq!(read_pid(&path), Some(std::process::id() as i32));
        assert_eq!(pid_file.path(), path);

        drop(pid_file);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_live_process_blocks_acquire() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("watchman.pid");

        let mut child = Command::new("sleep").arg("30").spawn()?;
        fs::write(&path, child.id().to_string())?;

        let result = PidFile::acquire(&path);
        child.kill()?;
        child.wait()?;

        assert!(matches!(result, Err(DaemonError::AlreadyRunning(pid)) if pid == child.id() as i32));
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_stale_and_garbage_files_are_replaced() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("watchman.pid");

        let mut child = Command::new("true").spawn()?;
        child.wait()?;
        fs::write(&path, child.id().to_string())?;
        let pid_file = PidFile::acquire(&path)?;
        assert_eq!(read_pid(&path), Some(std::process::id() as i32));
        drop(pid_file);

        fs::write(&path, "not a pid")?;
        let _pid_file = PidFile::acquire(&path)?;
        assert_eq!(read_pid(&path), Some(std::process::id() as i32));
        Ok(())
    }
}
