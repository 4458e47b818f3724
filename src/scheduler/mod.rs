//! Periodic task scheduling.
//!
//! A single scan loop wakes every `tick_interval`, reloads the active tasks
//! and failed-site monitors from storage and fires the ones that are due.
//! Each firing runs on a worker (bounded by `worker_pool_size`), never on the
//! scan loop itself.
//!
//! Mutual exclusion is enforced through the persisted `is_running` flag: a
//! job is only launched after an atomic check-and-set succeeds, and the flag
//! is cleared on every exit path, including errors and panics. The next run
//! is scheduled from the completion time (fixed delay).

mod execution;
mod registry;
mod timing;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::batch::BatchRunner;
use crate::config::{MonitorDefaults, SchedulerConfig};
use crate::error_handling::{DatabaseError, SchedulerError};
use crate::models::{validate_interval, DetectionTask};
use crate::notify::Notifier;
use crate::storage::Storage;

pub use registry::{JobKey, JobRegistry, ScheduledJob};
pub use timing::{is_due, next_run_after, parse_timestamp};

/// Result of a manual trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunNow {
    Started,
    /// The task is already executing; nothing was launched.
    AlreadyRunning,
}

struct Inner {
    storage: Storage,
    runner: BatchRunner,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    monitor_defaults: MonitorDefaults,
    registry: JobRegistry,
    workers: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Cheap to clone; clones share the same loop and workers.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        storage: Storage,
        runner: BatchRunner,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
        monitor_defaults: MonitorDefaults,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Self {
            inner: Arc::new(Inner {
                storage,
                runner,
                notifier,
                config,
                monitor_defaults,
                registry: JobRegistry::new(),
                workers,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    /// Activates a task's schedule. The first run happens at `first_run_at`,
    /// or on the next tick when absent. Starting an already started task
    /// replaces its schedule.
    pub async fn start_task(
        &self,
        task_id: i64,
        interval: Option<Duration>,
        first_run_at: Option<DateTime<Utc>>,
    ) -> Result<DetectionTask, SchedulerError> {
        self.ensure_open()?;
        if let Some(interval) = interval {
            validate_interval(interval)?;
        }
        let first_run_at = first_run_at.unwrap_or_else(Utc::now);
        let task = self
            .inner
            .storage
            .set_task_schedule(task_id, true, interval, Some(first_run_at))
            .await
            .map_err(|e| unknown_task(e, task_id))?;

        if let Some(monitor) = self.inner.storage.monitor_for_parent(task_id).await? {
            let resume_at = next_run_after(Utc::now(), monitor.interval);
            let monitor = self
                .inner
                .storage
                .set_monitor_schedule(monitor.id, true, Some(resume_at))
                .await?;
            self.inner.registry.insert(ScheduledJob::from(&monitor));
        }

        self.inner.registry.insert(ScheduledJob::from(&task));
        info!(
            "Scheduled task {task_id} every {}s, first run at {first_run_at}",
            task.interval.as_secs()
        );
        Ok(task)
    }

    /// Deactivates a task and pauses its failed-site monitor. An in-flight
    /// execution finishes normally. Stopping a stopped task is a no-op.
    pub async fn stop_task(&self, task_id: i64) -> Result<DetectionTask, SchedulerError> {
        let task = self
            .inner
            .storage
            .set_task_schedule(task_id, false, None, None)
            .await
            .map_err(|e| unknown_task(e, task_id))?;
        self.inner.registry.remove(JobKey::Detection(task_id));

        if let Some(monitor) = self.inner.storage.monitor_for_parent(task_id).await? {
            self.inner
                .storage
                .set_monitor_schedule(monitor.id, false, None)
                .await?;
            self.inner.registry.remove(JobKey::FailedMonitor(monitor.id));
        }
        info!("Stopped task {task_id}");
        Ok(task)
    }

    /// Launches one execution of a task immediately, unless it is already
    /// running.
    pub async fn run_task_now(&self, task_id: i64) -> Result<RunNow, SchedulerError> {
        self.ensure_open()?;
        let task = self
            .inner
            .storage
            .load_task(task_id)
            .await
            .map_err(|e| unknown_task(e, task_id))?;
        if !self.inner.storage.try_mark_running(task_id).await? {
            info!("Task {task_id} is already running; run-now ignored");
            return Ok(RunNow::AlreadyRunning);
        }
        self.launch(ScheduledJob::from(&task));
        Ok(RunNow::Started)
    }

    /// One scan: reload the registry and fire every due job that is not
    /// already running. Returns how many jobs were launched.
    pub async fn tick(&self) -> Result<usize, SchedulerError> {
        self.ensure_open()?;
        let storage = &self.inner.storage;
        let tasks = storage.list_active_tasks().await?;
        let monitors = storage.list_active_monitors().await?;
        self.inner.registry.replace_all(
            tasks
                .iter()
                .map(ScheduledJob::from)
                .chain(monitors.iter().map(ScheduledJob::from)),
        );

        let mut fired = 0;
        for job in self.inner.registry.due(Utc::now()) {
            let claimed = match job.key {
                JobKey::Detection(id) => storage.try_mark_running(id).await?,
                JobKey::FailedMonitor(id) => storage.try_mark_monitor_running(id).await?,
            };
            if !claimed {
                debug!("{} is due but still running; skipped", job.key);
                continue;
            }
            info!("Firing {}", job.key);
            self.launch(job);
            fired += 1;
        }
        Ok(fired)
    }

    /// Spawns the scan loop. Stale `is_running` flags from a previous process
    /// are cleared before the first tick.
    pub fn spawn_loop(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.inner.storage.reset_stale_running().await {
                error!("Failed to reset stale running flags: {e}");
            }
            let mut interval = tokio::time::interval(scheduler.inner.config.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = scheduler.tick().await {
                            if matches!(e, SchedulerError::Stopped) {
                                break;
                            }
                            error!("Scheduler tick failed: {e}");
                        }
                    }
                    _ = scheduler.inner.shutdown.cancelled() => {
                        break;
                    }
                }
            }
            debug!("Scheduler loop exited");
        })
    }

    /// Stops accepting fires and waits for in-flight executions.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        let in_flight = self.inner.tracker.len();
        if in_flight > 0 {
            info!("Waiting for {in_flight} running job(s) to finish");
        }
        self.inner.tracker.wait().await;
        info!("Scheduler stopped");
    }

    fn ensure_open(&self) -> Result<(), SchedulerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerError::Stopped);
        }
        Ok(())
    }

    /// Runs a claimed job on a worker. The caller must have set its
    /// `is_running` flag.
    fn launch(&self, job: ScheduledJob) {
        let inner = Arc::clone(&self.inner);
        self.inner.tracker.spawn(async move {
            let _permit = Arc::clone(&inner.workers).acquire_owned().await.ok();

            // Nested task so a panic inside the cycle is observed here
            let exec_inner = Arc::clone(&inner);
            let key = job.key;
            let joined =
                tokio::spawn(async move { execution::execute_job(&exec_inner, key).await }).await;

            match joined {
                Ok(Ok(report)) => {
                    info!(
                        "{key} finished: {} checked, {} failed, {} change(s), {} recovered",
                        report.summary.total,
                        report.summary.failed,
                        report.changes.len(),
                        report.recovered.len()
                    );
                }
                Ok(Err(e)) => error!("{key} failed: {e:#}"),
                Err(e) => error!("{key} aborted: {e}"),
            }

            let completed_at = Utc::now();
            let next_run_at = next_run_after(completed_at, job.interval);
            if let Err(e) = finish(&inner.storage, key, completed_at, next_run_at).await {
                warn!("Could not record completion of {key}: {e}; clearing running flag");
                if let Err(e) = clear(&inner.storage, key).await {
                    error!("Could not clear running flag of {key}: {e}");
                }
            }
        });
    }
}

async fn finish(
    storage: &Storage,
    key: JobKey,
    completed_at: DateTime<Utc>,
    next_run_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    match key {
        JobKey::Detection(id) => storage.finish_run(id, completed_at, next_run_at).await,
        JobKey::FailedMonitor(id) => storage.finish_monitor_run(id, completed_at, next_run_at).await,
    }
}

async fn clear(storage: &Storage, key: JobKey) -> Result<(), DatabaseError> {
    match key {
        JobKey::Detection(id) => storage.clear_running(id).await,
        JobKey::FailedMonitor(id) => storage.clear_monitor_running(id).await,
    }
}

fn unknown_task(err: DatabaseError, task_id: i64) -> SchedulerError {
    match err {
        DatabaseError::NotFound { .. } => SchedulerError::UnknownTask(task_id),
        other => SchedulerError::Database(other),
    }
}
