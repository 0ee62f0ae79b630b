//! Task manager: owns the task set, the scheduler and the task store.
//!
//! All task state lives behind one registry lock. Lock order is registry
//! first, then scheduler. Sync passes run on the blocking pool and report
//! progress back over a channel that is folded into the registry here.

use super::{BackupTask, NewTask, TaskStatus, TaskStore};
use crate::sync::{ChannelSink, SyncEngine, SyncReport};
use crate::utils::errors::{StoreError, SyncError, TaskError};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type TickFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

struct Inner {
    registry: RwLock<Registry>,
    store: TaskStore,
    scheduler: Mutex<JobScheduler>,
    engine: SyncEngine,
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<String, BackupTask>,
    /// Armed schedules by task name
    jobs: HashMap<String, Uuid>,
    /// Ids of tasks with a sync pass in flight
    running: HashSet<Uuid>,
}

impl Registry {
    fn snapshot(&self) -> Vec<BackupTask> {
        let mut tasks: Vec<BackupTask> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        tasks
    }
}

fn scheduler_error(err: impl std::fmt::Display) -> TaskError {
    TaskError::Scheduler(err.to_string())
}

impl TaskManager {
    /// Load persisted tasks and re-arm every task that is not stopped.
    ///
    /// Tasks persisted as `Running` were interrupted by a shutdown and come
    /// back as `Ready`. A task whose schedule fails to arm is kept and logged.
    pub async fn open(store: TaskStore, engine: SyncEngine) -> Result<Self, TaskError> {
        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        scheduler.start().await.map_err(scheduler_error)?;

        let persisted = store.load().await?;
        let manager = Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(Registry::default()),
                store,
                scheduler: Mutex::new(scheduler),
                engine,
            }),
        };

        let mut guard = manager.inner.registry.write().await;
        let registry = &mut *guard;
        for mut task in persisted {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Ready;
            }
            registry.tasks.insert(task.name.clone(), task);
        }

        let to_arm: Vec<String> = registry
            .tasks
            .values()
            .filter(|t| t.status != TaskStatus::Stopped)
            .map(|t| t.name.clone())
            .collect();
        for name in &to_arm {
            if let Err(e) = manager.inner.arm(registry, name).await {
                error!(task = %name, error = %e, "Failed to arm schedule");
            }
        }

        manager.inner.persist(registry).await?;
        info!(
            tasks = registry.tasks.len(),
            armed = registry.jobs.len(),
            "Task manager ready"
        );
        drop(guard);

        Ok(manager)
    }

    /// Register, arm and persist a new task, then start its first pass.
    ///
    /// Either all of that happens or nothing does.
    pub async fn add_task(&self, params: NewTask) -> Result<BackupTask, TaskError> {
        let mut guard = self.inner.registry.write().await;
        let registry = &mut *guard;

        if registry.tasks.contains_key(&params.name) {
            return Err(TaskError::AlreadyExists(params.name));
        }

        let task = BackupTask::new(params);
        let name = task.name.clone();
        registry.tasks.insert(name.clone(), task.clone());

        if let Err(e) = self.inner.arm(registry, &name).await {
            registry.tasks.remove(&name);
            return Err(e);
        }

        if let Err(e) = self.inner.persist(registry).await {
            self.inner.disarm(registry, &name).await;
            registry.tasks.remove(&name);
            return Err(e.into());
        }

        info!(task = %name, schedule = %task.schedule, "Task added");
        Ok(task)
    }

    /// Every task, oldest first.
    pub async fn list_tasks(&self) -> Vec<BackupTask> {
        self.inner.registry.read().await.snapshot()
    }

    /// Disarm a task's schedule and mark it `Stopped`.
    ///
    /// A pass already in flight finishes but its result is discarded.
    pub async fn stop_task(&self, name: &str) -> Result<BackupTask, TaskError> {
        let mut guard = self.inner.registry.write().await;
        let registry = &mut *guard;

        if !registry.tasks.contains_key(name) {
            return Err(TaskError::NotFound(name.to_string()));
        }
        self.inner.disarm(registry, name).await;

        let stopped = match registry.tasks.get_mut(name) {
            Some(task) => {
                task.mark_stopped();
                task.clone()
            }
            None => return Err(TaskError::NotFound(name.to_string())),
        };

        self.inner.persist(registry).await?;
        info!(task = %name, "Task stopped");
        Ok(stopped)
    }

    /// Disarm and forget a task. The target directory is left untouched.
    pub async fn delete_task(&self, name: &str) -> Result<(), TaskError> {
        let mut guard = self.inner.registry.write().await;
        let registry = &mut *guard;

        if !registry.tasks.contains_key(name) {
            return Err(TaskError::NotFound(name.to_string()));
        }
        self.inner.disarm(registry, name).await;
        registry.tasks.remove(name);

        self.inner.persist(registry).await?;
        info!(task = %name, "Task deleted");
        Ok(())
    }

    /// Disarm every schedule and stop the scheduler.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.registry.write().await;
        let registry = &mut *guard;
        let armed: Vec<String> = registry.jobs.keys().cloned().collect();
        for name in &armed {
            self.inner.disarm(registry, name).await;
        }
        drop(guard);

        if let Err(e) = self.inner.scheduler.lock().await.shutdown().await {
            warn!(error = %e, "Scheduler did not shut down cleanly");
        }
        info!("Task manager shut down");
    }
}

impl Inner {
    async fn persist(&self, registry: &Registry) -> Result<(), StoreError> {
        self.store.save(&registry.snapshot()).await
    }

    /// Add the task's schedule to the scheduler and kick off one pass now.
    async fn arm(self: &Arc<Self>, registry: &mut Registry, name: &str) -> Result<(), TaskError> {
        let schedule = registry
            .tasks
            .get(name)
            .map(|t| t.schedule.clone())
            .ok_or_else(|| TaskError::NotFound(name.to_string()))?;

        let weak = Arc::downgrade(self);
        let job = match schedule.interval()? {
            Some(period) => Job::new_repeated_async(period, on_tick(weak.clone(), name.to_string())),
            None => Job::new_async(
                schedule.to_string().as_str(),
                on_tick(weak.clone(), name.to_string()),
            ),
        }
        .map_err(|e| TaskError::InvalidSchedule(format!("{}: {}", schedule, e)))?;

        let job_id = self
            .scheduler
            .lock()
            .await
            .add(job)
            .await
            .map_err(scheduler_error)?;
        registry.jobs.insert(name.to_string(), job_id);
        debug!(task = %name, schedule = %schedule, "Schedule armed");

        let name = name.to_string();
        tokio::spawn(async move {
            if let Some(inner) = weak.upgrade() {
                inner.run_once(name).await;
            }
        });

        Ok(())
    }

    async fn disarm(&self, registry: &mut Registry, name: &str) {
        if let Some(job_id) = registry.jobs.remove(name) {
            if let Err(e) = self.scheduler.lock().await.remove(&job_id).await {
                warn!(task = %name, error = %e, "Failed to remove schedule");
            }
            debug!(task = %name, "Schedule disarmed");
        }
    }

    /// One scheduled pass: claim, sync on the blocking pool, fold the result.
    async fn run_once(self: Arc<Self>, name: String) {
        let Some((run_id, source, target)) = self.begin_run(&name).await else {
            return;
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = self.engine.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let sink = ChannelSink::new(tx);
            engine.sync(&source, &target, &sink)
        });

        while let Some(percent) = rx.recv().await {
            self.record_progress(&name, run_id, percent).await;
        }

        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::Aborted(e.to_string())),
        };
        self.finish_run(&name, run_id, outcome).await;
    }

    /// Claim a pass for `name`. Returns the claimed task id and its paths.
    async fn begin_run(&self, name: &str) -> Option<(Uuid, PathBuf, PathBuf)> {
        let mut guard = self.registry.write().await;
        let registry = &mut *guard;

        if !registry.jobs.contains_key(name) {
            debug!(task = %name, "Ignoring tick for disarmed task");
            return None;
        }
        let task = registry.tasks.get_mut(name)?;
        if task.status == TaskStatus::Stopped {
            return None;
        }
        if !registry.running.insert(task.id) {
            warn!(task = %name, "Skipping scheduled run: sync already in progress");
            return None;
        }

        task.begin_run();
        let claim = (task.id, task.source_path.clone(), task.target_path.clone());
        info!(
            task = %name,
            source = %claim.1.display(),
            target = %claim.2.display(),
            "Starting backup"
        );

        if let Err(e) = self.persist(registry).await {
            error!(task = %name, error = %e, "Failed to persist task state");
        }
        Some(claim)
    }

    async fn record_progress(&self, name: &str, run_id: Uuid, percent: f64) {
        let mut registry = self.registry.write().await;
        if let Some(task) = registry.tasks.get_mut(name) {
            if task.id == run_id && task.status == TaskStatus::Running {
                task.set_progress(percent);
            }
        }
    }

    async fn finish_run(&self, name: &str, run_id: Uuid, outcome: Result<SyncReport, SyncError>) {
        let mut guard = self.registry.write().await;
        let registry = &mut *guard;
        registry.running.remove(&run_id);

        let Some(task) = registry.tasks.get_mut(name).filter(|t| t.id == run_id) else {
            debug!(task = %name, "Discarding result for deleted task");
            return;
        };
        if task.status != TaskStatus::Running {
            info!(task = %name, status = %task.status, "Discarding result of interrupted pass");
            return;
        }

        match outcome {
            Ok(report) => {
                task.finish_success();
                info!(
                    task = %name,
                    copied = report.copied_files,
                    bytes = report.copied_bytes,
                    removed = report.removed,
                    "Backup completed"
                );
            }
            Err(e) => {
                error!(task = %name, error = %e, "Backup failed");
                task.finish_failure(e.to_string());
            }
        }

        if let Err(e) = self.persist(registry).await {
            error!(task = %name, error = %e, "Failed to persist task state");
        }
    }
}

/// Scheduler callback for one task. Holds only a weak handle so armed jobs
/// never keep the manager alive.
fn on_tick(
    inner: Weak<Inner>,
    name: String,
) -> impl FnMut(Uuid, JobScheduler) -> TickFuture + Send + Sync + 'static {
    move |_uuid, _lock| {
        let inner = inner.clone();
        let name = name.clone();
        Box::pin(async move {
            if let Some(inner) = inner.upgrade() {
                inner.run_once(name).await;
            }
        })
    }
}
