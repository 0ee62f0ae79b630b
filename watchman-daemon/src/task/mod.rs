//! Backup tasks: model, schedules, persistence and the scheduler-owning manager.

pub mod manager;
pub mod schedule;
pub mod store;

pub use manager::TaskManager;
pub use schedule::Schedule;
pub use store::TaskStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle state of a backup task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Idle with the schedule armed
    Ready,
    /// A sync pass is in progress
    Running,
    /// Schedule disarmed by an explicit stop
    Stopped,
    /// Last pass failed; the schedule stays armed and retries on the next tick
    Error,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Ready => "Ready",
            TaskStatus::Running => "Running",
            TaskStatus::Stopped => "Stopped",
            TaskStatus::Error => "Error",
        };
        f.pad(label)
    }
}

/// Parameters for a new task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub schedule: Schedule,
}

/// A configured backup task, as held in memory and in the task store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupTask {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Unique task name (primary key)
    pub name: String,

    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub schedule: Schedule,
    pub status: TaskStatus,

    /// Progress of the current or last pass, 0-100
    pub progress: f64,

    /// Completion time of the last successful pass
    #[serde(default)]
    pub last_backup: Option<DateTime<Utc>>,

    /// Message of the last failed pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl BackupTask {
    /// A freshly added task: `Ready`, progress 100, never run.
    pub fn new(params: NewTask) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: params.name,
            source_path: params.source_path,
            target_path: params.target_path,
            schedule: params.schedule,
            status: TaskStatus::Ready,
            progress: 100.0,
            last_backup: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn begin_run(&mut self) {
        self.status = TaskStatus::Running;
        self.progress = 0.0;
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn set_progress(&mut self, percent: f64) {
        self.progress = percent.clamp(0.0, 100.0);
    }

    pub fn finish_success(&mut self) {
        let now = Utc::now();
        self.status = TaskStatus::Ready;
        self.progress = 100.0;
        self.error = None;
        self.last_backup = Some(now);
        self.updated_at = now;
    }

    pub fn finish_failure(&mut self, message: String) {
        self.status = TaskStatus::Error;
        self.progress = 0.0;
        self.error = Some(message);
        self.updated_at = Utc::now();
    }

    pub fn mark_stopped(&mut self) {
        self.status = TaskStatus::Stopped;
        self.progress = 0.0;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BackupTask {
        BackupTask::new(NewTask {
            name: "docs".to_string(),
            source_path: PathBuf::from("/home/me/docs"),
            target_path: PathBuf::from("/mnt/backup/docs"),
            schedule: Schedule::Interval { minutes: 10 },
        })
    }

    #[test]
    fn test_new_task_is_ready() {
        let task = sample();
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.progress, 100.0);
        assert!(task.last_backup.is_none());
        assert!(task.error.is_none());
    }

    #[test]
    fn test_failure_then_success_clears_error() {
        let mut task = sample();
        task.begin_run();
        task.set_progress(42.0);
        task.finish_failure("disk full".to_string());
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.progress, 0.0);
        assert_eq!(task.error.as_deref(), Some("disk full"));
        assert!(task.last_backup.is_none());

        task.begin_run();
        assert!(task.error.is_none());
        task.finish_success();
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.progress, 100.0);
        assert!(task.last_backup.is_some());
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut task = sample();
        task.set_progress(250.0);
        assert_eq!(task.progress, 100.0);
        task.set_progress(-1.0);
        assert_eq!(task.progress, 0.0);
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let json = r#"{
            "name": "photos",
            "source_path": "/src",
            "target_path": "/dst",
            "schedule": "5",
            "status": "Stopped",
            "progress": 0
        }"#;
        let task: BackupTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.schedule, Schedule::Interval { minutes: 5 });
        assert_eq!(task.status, TaskStatus::Stopped);
        assert!(task.last_backup.is_none());
    }
}
