//! Snapshot comparison.
//!
//! Produces the sync set (source entries the target lacks or holds with
//! different content) and the orphan roots (target-only entries whose parent
//! survives the pass).

use crate::fs::metadata::{FileRecord, Snapshot};
use std::collections::HashSet;

/// One source entry that has to be materialized in the target
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    /// Source-side record (carries the digest and mtime to reproduce)
    pub record: FileRecord,

    /// Target holds the path with the other kind (file vs directory) and
    /// that entry must be removed first
    pub replaces_other_kind: bool,
}

/// A target-only path scheduled for removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    pub relative_path: String,
    pub is_dir: bool,
}

/// Everything one sync pass needs to do, in application order
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Sync set, sorted by path so parents precede children
    pub sync_set: Vec<PlannedEntry>,

    /// Topmost target-only paths, sorted by path
    pub orphans: Vec<Orphan>,

    /// Source entries already present in the target
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.sync_set.is_empty() && self.orphans.is_empty()
    }
}

/// Compare two snapshots.
///
/// Directories are compared by presence only; files by digest.
pub fn plan(source: &Snapshot, target: &Snapshot) -> SyncPlan {
    let mut sync_set = Vec::new();
    let mut unchanged = 0;
    let mut replaced: HashSet<&str> = HashSet::new();

    for (key, record) in source {
        match target.get(key) {
            Some(existing) if record.matches(existing) => unchanged += 1,
            Some(existing) => {
                let replaces_other_kind = existing.is_dir != record.is_dir;
                if replaces_other_kind {
                    replaced.insert(key.as_str());
                }
                sync_set.push(PlannedEntry {
                    record: record.clone(),
                    replaces_other_kind,
                });
            }
            None => sync_set.push(PlannedEntry {
                record: record.clone(),
                replaces_other_kind: false,
            }),
        }
    }
    sync_set.sort_by(|a, b| a.record.relative_path.cmp(&b.record.relative_path));

    let is_orphan = |key: &str| target.contains_key(key) && !source.contains_key(key);

    let mut orphans: Vec<Orphan> = target
        .values()
        .filter(|record| !source.contains_key(&record.relative_path))
        .filter(|record| match parent_key(&record.relative_path) {
            // the parent is removed recursively, or replaced by a file
            Some(parent) => !is_orphan(parent) && !replaced.contains(parent),
            None => true,
        })
        .map(|record| Orphan {
            relative_path: record.relative_path.clone(),
            is_dir: record.is_dir,
        })
        .collect();
    orphans.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    SyncPlan {
        sync_set,
        orphans,
        unchanged,
    }
}

fn parent_key(key: &str) -> Option<&str> {
    key.rsplit_once('/').map(|(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, digest: &str) -> (String, FileRecord) {
        (
            path.to_string(),
            FileRecord {
                relative_path: path.to_string(),
                size: digest.len() as u64,
                digest: digest.to_string(),
                modified: 100,
                is_dir: false,
            },
        )
    }

    fn dir(path: &str, modified: i64) -> (String, FileRecord) {
        (
            path.to_string(),
            FileRecord {
                relative_path: path.to_string(),
                size: 0,
                digest: String::new(),
                modified,
                is_dir: true,
            },
        )
    }

    fn keys(plan: &SyncPlan) -> Vec<&str> {
        plan.sync_set
            .iter()
            .map(|e| e.record.relative_path.as_str())
            .collect()
    }

    #[test]
    fn test_missing_and_changed_files_are_planned() {
        let source: Snapshot = [file("a.txt", "x"), file("b.txt", "y"), file("c.txt", "z")].into();
        let target: Snapshot = [file("a.txt", "x"), file("b.txt", "old")].into();

        let plan = plan(&source, &target);
        assert_eq!(keys(&plan), vec!["b.txt", "c.txt"]);
        assert_eq!(plan.unchanged, 1);
        assert!(plan.orphans.is_empty());
    }

    #[test]
    fn test_directories_compare_by_presence() {
        let source: Snapshot = [dir("docs", 10), dir("new", 10)].into();
        let target: Snapshot = [dir("docs", 99)].into();

        let plan = plan(&source, &target);
        assert_eq!(keys(&plan), vec!["new"]);
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn test_only_orphan_roots_are_listed() {
        let source: Snapshot = [file("keep.txt", "k")].into();
        let target: Snapshot = [
            file("keep.txt", "k"),
            file("c.txt", "c"),
            dir("old", 1),
            dir("old/deeper", 1),
            file("old/deeper/x.bin", "x"),
        ]
        .into();

        let plan = plan(&source, &target);
        assert!(plan.sync_set.is_empty());
        assert_eq!(
            plan.orphans,
            vec![
                Orphan {
                    relative_path: "c.txt".into(),
                    is_dir: false
                },
                Orphan {
                    relative_path: "old".into(),
                    is_dir: true
                },
            ]
        );
        assert!(!plan.is_noop());
    }

    #[test]
    fn test_kind_change_replaces_entry() {
        let source: Snapshot = [file("x", "now-a-file")].into();
        let target: Snapshot = [dir("x", 1), file("x/inner.txt", "i")].into();

        let plan = plan(&source, &target);
        assert_eq!(keys(&plan), vec!["x"]);
        assert!(plan.sync_set[0].replaces_other_kind);
        // x/inner.txt disappears together with the replaced directory
        assert!(plan.orphans.is_empty());
    }

    #[test]
    fn test_identical_snapshots_are_noop() {
        let source: Snapshot = [dir("d", 1), file("d/a", "1")].into();
        let plan = plan(&source, &source.clone());
        assert!(plan.is_noop());
        assert_eq!(plan.unchanged, 2);
    }
}
