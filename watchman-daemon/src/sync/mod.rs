//! Incremental one-way synchronization.
//!
//! A pass scans both trees, plans the differences and converges the target
//! onto the source:
//! - missing or content-changed entries are created/copied (sync set)
//! - target-only entries are removed afterwards
//!
//! Nothing is rolled back on failure. The next pass re-diffs from scratch, so
//! a partially converged target is simply finished later.

pub mod apply;
pub mod diff;
pub mod progress;

use crate::fs::scanner::TreeScanner;
use crate::utils::errors::SyncError;
use apply::{apply_entry, remove_orphan, Applied};
use progress::{ProgressCounter, ProgressSink};
use std::path::Path;
use tracing::{debug, info};

pub use progress::{ChannelSink, NoProgress};

/// Summary of what one pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub copied_files: usize,
    pub copied_bytes: u64,
    pub created_dirs: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl SyncReport {
    /// True when the pass wrote nothing to the target.
    pub fn is_noop(&self) -> bool {
        self.copied_files == 0 && self.created_dirs == 0 && self.removed == 0
    }
}

/// Drives scan, diff and apply for one source/target pair.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    scanner: TreeScanner,
}

impl SyncEngine {
    pub fn new(scanner: TreeScanner) -> Self {
        Self { scanner }
    }

    /// Converge `target` onto `source`.
    ///
    /// Progress is reported after every sync-set entry as the applied
    /// fraction of the set, followed by a final `100`. An empty sync set
    /// reports a single `100`. Emitted values never decrease.
    pub fn sync(
        &self,
        source: &Path,
        target: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<SyncReport, SyncError> {
        std::fs::create_dir_all(target).map_err(|err| SyncError::PrepareTarget {
            path: target.to_path_buf(),
            source: err,
        })?;

        let source_snapshot = self.scanner.scan(source).map_err(SyncError::ScanSource)?;
        let target_snapshot = self.scanner.scan(target).map_err(SyncError::ScanTarget)?;

        let plan = diff::plan(&source_snapshot, &target_snapshot);
        info!(
            "Sync {} -> {}: {} to apply, {} unchanged, {} to remove",
            source.display(),
            target.display(),
            plan.sync_set.len(),
            plan.unchanged,
            plan.orphans.len()
        );

        let mut report = SyncReport {
            unchanged: plan.unchanged,
            ..Default::default()
        };

        let mut counter = ProgressCounter::new(progress, plan.sync_set.len());
        for entry in &plan.sync_set {
            let applied = apply_entry(source, target, entry).map_err(|err| SyncError::Apply {
                relative_path: entry.record.relative_path.clone(),
                source: err,
            })?;

            match applied {
                Applied::CreatedDir => report.created_dirs += 1,
                Applied::Copied { bytes } => {
                    report.copied_files += 1;
                    report.copied_bytes += bytes;
                }
            }
            counter.advance();
        }

        // removal runs last so an entry being replaced is never missing in between
        for orphan in &plan.orphans {
            let removed = remove_orphan(target, orphan).map_err(|err| SyncError::Apply {
                relative_path: orphan.relative_path.clone(),
                source: err,
            })?;
            if removed {
                report.removed += 1;
            }
        }

        counter.complete();
        debug!("Sync finished: {:?}", report);

        Ok(report)
    }
}
