//! Concurrent batch detection.
//!
//! [`BatchRunner::run_batch`] probes a list of URLs under a concurrency limit
//! and returns exactly one outcome per input URL, in input order, no matter
//! which probe finishes first. Small batches use a fixed worker pool; batches
//! at or above the configured threshold use an event-loop strategy with
//! per-host connection caps and a tighter per-request timeout.
//!
//! Each probe runs in its own Tokio task. A probe that panics yields a
//! synthetic `failed` outcome for its slot instead of aborting the batch.

mod event_loop;
mod pool;
mod summary;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::config::DetectorConfig;
use crate::error_handling::{ConfigError, FailureReason, ProcessingStats};
use crate::models::{ProbeError, ProbeOutcome};
use crate::probe::{ProbeSettings, Prober};
use crate::retry::probe_with_retry;

pub use summary::BatchSummary;

/// Called with `(completed, total)` after each outcome arrives.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Per-batch settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    pub concurrency_limit: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub verify_tls: bool,
}

impl BatchOptions {
    /// Rejects a zero timeout or concurrency limit. A zero timeout would
    /// fail every site as timed out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than 0".into()));
        }
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// One-off batches default to the detector's own settings.
impl From<&DetectorConfig> for BatchOptions {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            concurrency_limit: config.max_concurrent,
            timeout: config.timeout,
            max_retries: config.retry_times,
            verify_tls: config.verify_ssl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    WorkerPool,
    EventLoop,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// `outcomes[i]` belongs to `urls[i]`.
    pub outcomes: Vec<ProbeOutcome>,
    pub summary: BatchSummary,
    pub mode: BatchMode,
}

/// One retry-wrapped probe, cheap to clone into tasks.
#[derive(Clone)]
pub(crate) struct ProbeJob {
    prober: Arc<dyn Prober>,
    settings: ProbeSettings,
    max_retries: u32,
    backoff_unit: Duration,
}

impl ProbeJob {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        probe_with_retry(
            self.prober.as_ref(),
            url,
            &self.settings,
            self.max_retries,
            self.backoff_unit,
        )
        .await
    }

    /// Runs the probe on its own task so a panic stays contained.
    async fn run_isolated(&self, url: String) -> ProbeOutcome {
        let job = self.clone();
        let task_url = url.clone();
        let joined = tokio::spawn(async move { job.probe(&task_url).await }).await;
        outcome_from_join(&url, joined)
    }
}

pub(crate) fn outcome_from_join(url: &str, joined: Result<ProbeOutcome, JoinError>) -> ProbeOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Probe task for {url} did not complete: {e}");
            ProbeOutcome::failure(
                url,
                ProbeError::new(
                    FailureReason::UnknownError,
                    format!("probe task failed: {e}"),
                ),
            )
        }
    }
}

/// Runs batches against a shared prober and statistics object.
#[derive(Clone)]
pub struct BatchRunner {
    prober: Arc<dyn Prober>,
    config: DetectorConfig,
    stats: Arc<ProcessingStats>,
}

impl BatchRunner {
    pub fn new(prober: Arc<dyn Prober>, config: DetectorConfig, stats: Arc<ProcessingStats>) -> Self {
        Self {
            prober,
            config,
            stats,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<ProcessingStats> {
        &self.stats
    }

    /// Strategy used for a batch of `len` URLs.
    pub fn mode_for(&self, len: usize) -> BatchMode {
        if len >= self.config.event_loop_threshold {
            BatchMode::EventLoop
        } else {
            BatchMode::WorkerPool
        }
    }

    /// Probes every URL and returns outcomes in input order.
    ///
    /// Duplicates are probed independently. A panicking progress callback is
    /// logged and otherwise ignored.
    pub async fn run_batch(
        &self,
        urls: &[String],
        options: &BatchOptions,
        progress: Option<ProgressCallback>,
    ) -> BatchReport {
        let started = Instant::now();
        let total = urls.len();
        let mode = self.mode_for(total);

        if total == 0 {
            return BatchReport {
                outcomes: Vec::new(),
                summary: BatchSummary::from_outcomes(&[], started.elapsed()),
                mode,
            };
        }

        let urls = Arc::new(urls.to_vec());
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ProbeOutcome)>();

        let dispatch = {
            let urls = Arc::clone(&urls);
            let limit = options.concurrency_limit.max(1);
            match mode {
                BatchMode::WorkerPool => {
                    let workers = limit.min(total);
                    info!("Probing {total} URL(s) with a pool of {workers} worker(s)");
                    let job = self.job(options, options.timeout);
                    futures::future::Either::Left(pool::run(job, urls, workers, tx))
                }
                BatchMode::EventLoop => {
                    let concurrency = self
                        .config
                        .event_loop_max_concurrent
                        .min(total.saturating_mul(2))
                        .max(1);
                    let timeout = options.timeout.min(self.config.event_loop_timeout);
                    info!(
                        "Probing {total} URL(s) in event-loop mode (concurrency {concurrency}, {} per host, timeout {:.1}s)",
                        self.config.per_host_limit,
                        timeout.as_secs_f64()
                    );
                    let job = self.job(options, timeout);
                    futures::future::Either::Right(event_loop::run(
                        job,
                        urls,
                        concurrency,
                        self.config.per_host_limit.max(1),
                        tx,
                    ))
                }
            }
        };

        let collect = async {
            let mut slots: Vec<Option<ProbeOutcome>> = vec![None; total];
            let mut completed = 0usize;
            while let Some((idx, outcome)) = rx.recv().await {
                debug!(
                    "[{}/{}] {} -> {}",
                    completed + 1,
                    total,
                    outcome.url,
                    outcome.status()
                );
                if let Some(slot) = slots.get_mut(idx) {
                    *slot = Some(outcome);
                }
                completed += 1;
                if let Some(callback) = &progress {
                    report_progress(callback, completed, total);
                }
            }
            slots
        };

        let ((), slots) = tokio::join!(dispatch, collect);

        let outcomes: Vec<ProbeOutcome> = slots
            .into_iter()
            .zip(urls.iter())
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| {
                    ProbeOutcome::failure(
                        url.as_str(),
                        ProbeError::new(FailureReason::UnknownError, "detection result missing"),
                    )
                })
            })
            .collect();

        for outcome in &outcomes {
            self.stats.record_probe(outcome.retries_used);
            if let Some(reason) = outcome.failure_reason() {
                self.stats.increment_failure(reason);
            }
        }

        let summary = BatchSummary::from_outcomes(&outcomes, started.elapsed());
        summary.log();

        BatchReport {
            outcomes,
            summary,
            mode,
        }
    }

    fn job(&self, options: &BatchOptions, timeout: Duration) -> ProbeJob {
        ProbeJob {
            prober: Arc::clone(&self.prober),
            settings: ProbeSettings {
                timeout,
                verify_tls: options.verify_tls,
            },
            max_retries: options.max_retries,
            backoff_unit: self.config.backoff_unit,
        }
    }
}

fn report_progress(callback: &ProgressCallback, completed: usize, total: usize) {
    if catch_unwind(AssertUnwindSafe(|| callback(completed, total))).is_err() {
        warn!("Progress callback panicked at {completed}/{total}; continuing");
    }
}
