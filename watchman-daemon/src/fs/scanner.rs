//! Concurrent directory scanning.
//!
//! A walker thread discovers entries and feeds regular files into a bounded
//! job queue. A fixed pool of hash workers drains the queue and publishes
//! records on a results channel. The calling thread is the only writer of
//! the snapshot map.

use super::hasher::hash_file;
use super::metadata::{relative_key, FileRecord, Snapshot};
use crate::utils::errors::FileError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Default number of hash workers per scan
pub const DEFAULT_HASH_WORKERS: usize = 8;

/// Default capacity of the job and result queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

type ScanResult = Result<FileRecord, FileError>;

/// Options for tree scanning
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Number of hash worker threads
    pub workers: usize,

    /// Bound of the job and result queues
    pub queue_capacity: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_HASH_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// A regular file waiting to be hashed
struct HashJob {
    path: PathBuf,
    key: String,
    metadata: Metadata,
}

enum Discovered {
    Directory(FileRecord),
    File(HashJob),
}

/// Builds content-addressed snapshots of directory trees.
#[derive(Debug, Clone, Default)]
pub struct TreeScanner {
    options: ScanOptions,
}

impl TreeScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Scan `root` and return a snapshot keyed by `/`-joined relative path.
    ///
    /// Entries whose name starts with `.` are skipped, and hidden directories
    /// are not descended. The first error aborts the scan; outstanding work is
    /// drained before it is returned, so no producer is left blocked.
    ///
    /// # Example
    /// ```no_run
    /// use watchman_daemon::fs::scanner::TreeScanner;
    /// use std::path::Path;
    ///
    /// let snapshot = TreeScanner::default().scan(Path::new("/data")).unwrap();
    /// println!("Found {} entries", snapshot.len());
    /// ```
    pub fn scan(&self, root: &Path) -> Result<Snapshot, FileError> {
        let root_metadata = std::fs::metadata(root).map_err(|e| FileError::from_io(root, e))?;
        if !root_metadata.is_dir() {
            return Err(FileError::Io {
                path: root.to_path_buf(),
                source: io::Error::other("scan root is not a directory"),
            });
        }

        let workers = self.options.workers.max(1);
        let capacity = self.options.queue_capacity.max(1);

        let (job_tx, job_rx) = bounded::<HashJob>(capacity);
        let (result_tx, result_rx) = bounded::<ScanResult>(capacity);
        let abort = AtomicBool::new(false);

        let snapshot = thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let abort = &abort;
                scope.spawn(move || hash_worker(job_rx, result_tx, abort));
            }
            drop(job_rx);

            let walker_results = result_tx.clone();
            let abort_ref = &abort;
            scope.spawn(move || walk_tree(root, job_tx, walker_results, abort_ref));
            drop(result_tx);

            aggregate(result_rx, &abort)
        })?;

        debug!("Scanned {} ({} entries)", root.display(), snapshot.len());
        Ok(snapshot)
    }
}

/// Producer: walk the tree and route entries to the queue or straight to results.
fn walk_tree(root: &Path, jobs: Sender<HashJob>, results: Sender<ScanResult>, abort: &AtomicBool) {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        if abort.load(Ordering::Relaxed) {
            break;
        }

        let discovered = entry
            .map_err(|e| walk_error(root, e))
            .and_then(|entry| discover(&entry, root));

        let sent = match discovered {
            Ok(Some(Discovered::Directory(record))) => results.send(Ok(record)).is_ok(),
            Ok(Some(Discovered::File(job))) => jobs.send(job).is_ok(),
            Ok(None) => true,
            Err(err) => {
                let _ = results.send(Err(err));
                false
            }
        };

        if !sent {
            break;
        }
    }
}

/// Consumer: hash queued files until the queue closes.
fn hash_worker(jobs: Receiver<HashJob>, results: Sender<ScanResult>, abort: &AtomicBool) {
    for job in jobs {
        // keep draining after an abort so the walker never blocks on a full queue
        if abort.load(Ordering::Relaxed) {
            continue;
        }

        let result = hash_file(&job.path).map(|digest| FileRecord::file(job.key, &job.metadata, digest));
        if results.send(result).is_err() {
            break;
        }
    }
}

/// Fan-in: the only writer of the snapshot map.
fn aggregate(results: Receiver<ScanResult>, abort: &AtomicBool) -> Result<Snapshot, FileError> {
    let mut snapshot = Snapshot::new();
    let mut first_error = None;

    for result in results {
        match result {
            Ok(record) if first_error.is_none() => {
                snapshot.insert(record.relative_path.clone(), record);
            }
            Ok(_) => {}
            Err(err) => {
                if first_error.is_none() {
                    debug!("Scan aborted: {}", err);
                    abort.store(true, Ordering::Relaxed);
                    first_error = Some(err);
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(snapshot),
    }
}

/// Classify a walk entry. Symlinks are resolved to their target; links to
/// directories, broken links and special files yield `None`.
fn discover(entry: &DirEntry, root: &Path) -> Result<Option<Discovered>, FileError> {
    if entry.depth() == 0 {
        return Ok(None);
    }

    let path = entry.path();
    let Some(key) = relative_key(root, path) else {
        return Ok(None);
    };

    if entry.path_is_symlink() {
        return Ok(match std::fs::metadata(path) {
            Ok(resolved) if resolved.is_file() => Some(Discovered::File(HashJob {
                path: path.to_path_buf(),
                key,
                metadata: resolved,
            })),
            _ => None,
        });
    }

    let metadata = entry.metadata().map_err(|e| walk_error(root, e))?;
    if metadata.is_dir() {
        Ok(Some(Discovered::Directory(FileRecord::directory(key, &metadata))))
    } else if metadata.is_file() {
        Ok(Some(Discovered::File(HashJob {
            path: path.to_path_buf(),
            key,
            metadata,
        })))
    } else {
        Ok(None)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn walk_error(root: &Path, err: walkdir::Error) -> FileError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());

    match err.into_io_error() {
        Some(io_err) => FileError::from_io(&path, io_err),
        None => FileError::Io {
            path,
            source: io::Error::other("filesystem loop detected"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_empty_directory() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let snapshot = TreeScanner::default().scan(temp_dir.path())?;
        assert!(snapshot.is_empty());
        Ok(())
    }

    #[test]
    fn test_scan_with_subdirectories() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let snapshot = TreeScanner::default().scan(temp_dir.path())?;
        assert_eq!(snapshot.len(), 3);

        let dir = &snapshot["subdir"];
        assert!(dir.is_dir);
        assert!(dir.digest.is_empty());
        assert_eq!(dir.size, 0);

        let nested = &snapshot["subdir/file2.txt"];
        assert!(!nested.is_dir);
        assert_eq!(nested.size, 8);
        assert_eq!(nested.digest, hash_file(&temp_dir.path().join("subdir/file2.txt"))?);

        Ok(())
    }

    #[test]
    fn test_hidden_entries_are_skipped() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("keep.txt"), b"keep")?;
        fs::write(temp_dir.path().join(".DS_Store"), b"exclude")?;
        fs::create_dir_all(temp_dir.path().join(".git/objects"))?;
        fs::write(temp_dir.path().join(".git/objects/blob"), b"exclude")?;
        fs::create_dir(temp_dir.path().join("visible"))?;
        fs::write(temp_dir.path().join("visible/.hidden"), b"exclude")?;

        let snapshot = TreeScanner::default().scan(temp_dir.path())?;
        let mut keys: Vec<_> = snapshot.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["keep.txt", "visible"]);

        Ok(())
    }

    #[test]
    fn test_scan_more_files_than_queue_capacity() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        for i in 0..250 {
            let dir = temp_dir.path().join(format!("d{}", i % 5));
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(format!("f{i}.txt")), format!("payload {i}"))?;
        }

        let scanner = TreeScanner::new(ScanOptions {
            workers: 3,
            queue_capacity: 4,
        });
        let snapshot = scanner.scan(temp_dir.path())?;
        assert_eq!(snapshot.len(), 255);
        assert_eq!(snapshot["d2/f7.txt"].size, "payload 7".len() as u64);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_unreadable_file_aborts_without_deadlock() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::mpsc;
        use std::time::Duration;

        if nix::unistd::geteuid().is_root() {
            return Ok(());
        }

        let temp_dir = TempDir::new()?;
        for i in 0..200 {
            fs::write(temp_dir.path().join(format!("f{i:03}.txt")), format!("payload {i}"))?;
        }
        let locked = temp_dir.path().join("f007.txt");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;

        let root = temp_dir.path().to_path_buf();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let scanner = TreeScanner::new(ScanOptions {
                workers: 2,
                queue_capacity: 1,
            });
            let _ = tx.send(scanner.scan(&root));
        });

        let result = rx.recv_timeout(Duration::from_secs(30));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644))?;

        let err = result.expect("scan did not return").unwrap_err();
        assert!(matches!(err, FileError::PermissionDenied(ref p) if p == &locked));

        Ok(())
    }

    #[test]
    fn test_scan_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let err = TreeScanner::default()
            .scan(&temp_dir.path().join("does-not-exist"))
            .unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_resolve_to_files_only() -> anyhow::Result<()> {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new()?;
        let outside = TempDir::new()?;
        fs::write(outside.path().join("real.txt"), b"linked")?;
        fs::create_dir(outside.path().join("dir"))?;

        symlink(outside.path().join("real.txt"), temp_dir.path().join("link.txt"))?;
        symlink(outside.path().join("dir"), temp_dir.path().join("link-dir"))?;
        symlink(outside.path().join("gone"), temp_dir.path().join("broken"))?;

        let snapshot = TreeScanner::default().scan(temp_dir.path())?;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["link.txt"].size, 6);

        Ok(())
    }
}
