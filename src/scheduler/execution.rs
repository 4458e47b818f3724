//! One execution cycle of a detection task or a failed-site monitor.
//!
//! Both follow the same pipeline: batch probe, persist records, detect and
//! persist status changes, notify, refresh the parent's watch list. Monitor
//! records are written under the parent task's id so each website keeps a
//! single history.

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;

use super::registry::JobKey;
use super::Inner;
use crate::batch::{BatchOptions, BatchSummary};
use crate::models::{NewDetectionRecord, RecoveredWebsite, StatusChangeEvent, Website};
use crate::monitor::{recovered_from_events, refresh_watch_list};
use crate::notify::dispatch;
use crate::status_change::detect_changes;

#[derive(Debug, Clone)]
pub(super) struct CycleReport {
    pub summary: BatchSummary,
    pub changes: Vec<StatusChangeEvent>,
    pub recovered: Vec<RecoveredWebsite>,
}

pub(super) async fn execute_job(inner: &Inner, key: JobKey) -> Result<CycleReport> {
    match key {
        JobKey::Detection(task_id) => execute_detection_task(inner, task_id).await,
        JobKey::FailedMonitor(monitor_id) => execute_monitor_task(inner, monitor_id).await,
    }
}

async fn execute_detection_task(inner: &Inner, task_id: i64) -> Result<CycleReport> {
    let task = inner
        .storage
        .load_task(task_id)
        .await
        .with_context(|| format!("loading task {task_id}"))?;
    let websites = inner
        .storage
        .list_active_websites(task_id)
        .await
        .with_context(|| format!("listing websites of task {task_id}"))?;
    info!("Task {task_id} ({}): checking {} website(s)", task.name, websites.len());

    let options = BatchOptions {
        concurrency_limit: task.max_concurrency,
        timeout: task.timeout,
        max_retries: task.retry_count,
        verify_tls: inner.runner.config().verify_ssl,
    };
    let (summary, changes) = probe_and_record(inner, task_id, &websites, &options).await?;

    refresh_watch_list(&inner.storage, task_id, &inner.monitor_defaults)
        .await
        .with_context(|| format!("refreshing failed-site monitor of task {task_id}"))?;

    Ok(CycleReport {
        summary,
        changes,
        recovered: Vec::new(),
    })
}

async fn execute_monitor_task(inner: &Inner, monitor_id: i64) -> Result<CycleReport> {
    let monitor = inner
        .storage
        .load_monitor(monitor_id)
        .await
        .with_context(|| format!("loading failed-site monitor {monitor_id}"))?;
    let parent_task_id = monitor.parent_task_id;
    let watched = inner
        .storage
        .monitor_websites(monitor_id)
        .await
        .with_context(|| format!("listing watch list of monitor {monitor_id}"))?;
    info!(
        "Failed-site monitor {monitor_id} (task {parent_task_id}): re-checking {} website(s)",
        watched.len()
    );

    let options = BatchOptions {
        concurrency_limit: monitor.max_concurrency,
        timeout: monitor.timeout,
        max_retries: monitor.retry_count,
        verify_tls: inner.runner.config().verify_ssl,
    };
    let (summary, changes) = probe_and_record(inner, parent_task_id, &watched, &options).await?;

    let recovered = recovered_from_events(&changes, &watched);
    for site in &recovered {
        info!(
            "Recovered: website {} ({}) is {}",
            site.website.id, site.website.url, site.current_status
        );
    }

    refresh_watch_list(&inner.storage, parent_task_id, &inner.monitor_defaults)
        .await
        .with_context(|| format!("refreshing watch list of monitor {monitor_id}"))?;

    Ok(CycleReport {
        summary,
        changes,
        recovered,
    })
}

/// Probes `websites` and records the outcomes under `task_id`.
async fn probe_and_record(
    inner: &Inner,
    task_id: i64,
    websites: &[Website],
    options: &BatchOptions,
) -> Result<(BatchSummary, Vec<StatusChangeEvent>)> {
    let urls: Vec<String> = websites.iter().map(|w| w.normalized_url.clone()).collect();
    let report = inner.runner.run_batch(&urls, options, None).await;

    let detected_at = Utc::now();
    let records: Vec<NewDetectionRecord> = websites
        .iter()
        .zip(&report.outcomes)
        .map(|(website, outcome)| NewDetectionRecord::from_outcome(task_id, website.id, outcome, detected_at))
        .collect();

    let saved = inner
        .storage
        .save_records(&records)
        .await
        .with_context(|| format!("saving {} detection record(s) for task {task_id}", records.len()))?;
    let changes = detect_changes(&inner.storage, task_id, &saved)
        .await
        .context("detecting status changes")?;
    inner
        .storage
        .save_status_changes(&changes)
        .await
        .context("saving status changes")?;

    dispatch(inner.notifier.clone(), changes.clone());
    Ok((report.summary, changes))
}
