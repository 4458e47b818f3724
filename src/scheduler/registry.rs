//! In-memory view of the scheduled jobs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::timing::is_due;
use crate::models::{DetectionTask, FailedSiteMonitorTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKey {
    Detection(i64),
    FailedMonitor(i64),
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKey::Detection(id) => write!(f, "task {id}"),
            JobKey::FailedMonitor(id) => write!(f, "failed-site monitor {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub key: JobKey,
    pub interval: Duration,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl From<&DetectionTask> for ScheduledJob {
    fn from(task: &DetectionTask) -> Self {
        Self {
            key: JobKey::Detection(task.id),
            interval: task.interval,
            last_run_at: task.last_run_at,
            next_run_at: task.next_run_at,
        }
    }
}

impl From<&FailedSiteMonitorTask> for ScheduledJob {
    fn from(monitor: &FailedSiteMonitorTask) -> Self {
        Self {
            key: JobKey::FailedMonitor(monitor.id),
            interval: monitor.interval,
            last_run_at: monitor.last_run_at,
            next_run_at: monitor.next_run_at,
        }
    }
}

/// Job id -> schedule. Inserting an existing key replaces it.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobKey, ScheduledJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobKey, ScheduledJob>> {
        // No critical section leaves the map inconsistent, so poisoning is ignored
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, job: ScheduledJob) {
        self.lock().insert(job.key, job);
    }

    pub fn remove(&self, key: JobKey) -> Option<ScheduledJob> {
        self.lock().remove(&key)
    }

    pub fn get(&self, key: JobKey) -> Option<ScheduledJob> {
        self.lock().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Replaces every entry with `jobs`.
    pub fn replace_all(&self, jobs: impl IntoIterator<Item = ScheduledJob>) {
        let mut map = self.lock();
        map.clear();
        map.extend(jobs.into_iter().map(|job| (job.key, job)));
    }

    /// Jobs due at `now`, in key order.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let mut due: Vec<ScheduledJob> = self
            .lock()
            .values()
            .filter(|job| is_due(job.last_run_at, job.next_run_at, now))
            .cloned()
            .collect();
        due.sort_by_key(|job| job.key);
        due
    }
}
