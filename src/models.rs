//! Domain data model.
//!
//! Websites and tasks are long-lived and user-managed. Detection records and
//! status-change events are append-only facts. [`ProbeOutcome`] is the
//! in-memory result of one probe (after retries) before it becomes a record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::classifier::classify;
use crate::config::MAX_ERROR_MESSAGE_LENGTH;
use crate::error_handling::{ConfigError, FailureReason};

/// Classification of one detection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    /// Reached the same site (possibly after a scheme, `www.` or subdomain hop).
    Standard,
    /// Ended on a different site.
    Redirected,
    Failed,
}

impl DetectionStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// `standard` and `redirected` both count as accessible.
    pub fn is_accessible(&self) -> bool {
        !matches!(self, DetectionStatus::Failed)
    }
}

/// Kind of transition between two consecutive detections.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    BecameAccessible,
    BecameFailed,
    /// Same accessibility, different raw status.
    StatusChanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Website {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub normalized_url: String,
    pub domain: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Parameters for a new detection task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub interval: Duration,
    pub max_concurrency: usize,
    pub timeout: Duration,
    pub retry_count: u32,
}

impl NewTask {
    /// Rejects zero intervals, zero timeouts and a zero concurrency limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_interval(self.interval)?;
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("task timeout must be greater than 0".into()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "task max_concurrency must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// A zero interval would make a task due again on every scan.
pub fn validate_interval(interval: Duration) -> Result<(), ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::Invalid("task interval must be greater than 0".into()));
    }
    Ok(())
}

/// A periodic detection task.
///
/// `is_running` is set for exactly the duration of one in-flight execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionTask {
    pub id: i64,
    pub name: String,
    pub interval: Duration,
    pub max_concurrency: usize,
    pub timeout: Duration,
    pub retry_count: u32,
    pub is_active: bool,
    pub is_running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Secondary task that re-probes only the currently failed websites of its
/// parent at a shorter interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSiteMonitorTask {
    pub id: i64,
    pub parent_task_id: i64,
    pub name: String,
    pub interval: Duration,
    pub max_concurrency: usize,
    pub timeout: Duration,
    pub retry_count: u32,
    pub is_active: bool,
    pub is_running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// A detection record before it has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDetectionRecord {
    pub task_id: i64,
    pub website_id: i64,
    pub status: DetectionStatus,
    pub response_time: Option<f64>,
    pub http_status_code: Option<u16>,
    pub final_url: Option<String>,
    pub error_message: Option<String>,
    pub failure_reason: Option<FailureReason>,
    pub retry_count_used: u32,
    pub detected_at: DateTime<Utc>,
}

impl NewDetectionRecord {
    /// Converts a probe outcome into a record for `website_id` under `task_id`.
    pub fn from_outcome(
        task_id: i64,
        website_id: i64,
        outcome: &ProbeOutcome,
        detected_at: DateTime<Utc>,
    ) -> Self {
        let (error_message, failure_reason) = match &outcome.error {
            Some(err) => (
                Some(truncate_chars(&err.message, MAX_ERROR_MESSAGE_LENGTH)),
                Some(err.kind),
            ),
            None => (None, None),
        };
        Self {
            task_id,
            website_id,
            status: outcome.status(),
            response_time: outcome.response_time,
            http_status_code: outcome.http_status,
            final_url: outcome.final_url.clone(),
            error_message,
            failure_reason,
            retry_count_used: outcome.retries_used,
            detected_at,
        }
    }
}

/// An immutable, persisted detection fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub task_id: i64,
    pub website_id: i64,
    pub status: DetectionStatus,
    pub response_time: Option<f64>,
    pub http_status_code: Option<u16>,
    pub final_url: Option<String>,
    pub error_message: Option<String>,
    pub failure_reason: Option<FailureReason>,
    pub retry_count_used: u32,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChangeEvent {
    pub website_id: i64,
    pub task_id: i64,
    pub previous_status: DetectionStatus,
    pub current_status: DetectionStatus,
    pub change_type: ChangeType,
    pub previous_record_id: i64,
    pub current_record_id: i64,
    pub detected_at: DateTime<Utc>,
}

/// Certificate details from the inspection handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TlsInfo {
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub expires_in_days: Option<i64>,
    pub expired: bool,
    /// Whether the chain verified against the bundled web roots.
    pub valid: bool,
    pub error: Option<String>,
}

/// Why a probe failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeError {
    pub kind: FailureReason,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: FailureReason, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of probing one URL.
///
/// Probe failures are carried in `error` rather than returned as `Err`, so
/// every input URL always has an outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    /// The URL as requested by the caller.
    pub url: String,
    pub final_url: Option<String>,
    pub http_status: Option<u16>,
    /// Seconds spent on the HTTP exchange, redirects included.
    pub response_time: Option<f64>,
    /// Every URL requested, in order, ending with the final one.
    pub redirect_chain: Vec<String>,
    pub page_title: Option<String>,
    /// Body bytes read (capped).
    pub content_length: Option<u64>,
    pub tls_info: Option<TlsInfo>,
    pub error: Option<ProbeError>,
    pub retries_used: u32,
    /// Seconds spent on the whole probe, TLS inspection included.
    pub detection_duration: f64,
}

impl ProbeOutcome {
    /// An outcome carrying only an error.
    pub fn failure(url: impl Into<String>, error: ProbeError) -> Self {
        Self {
            url: url.into(),
            final_url: None,
            http_status: None,
            response_time: None,
            redirect_chain: Vec::new(),
            page_title: None,
            content_length: None,
            tls_info: None,
            error: Some(error),
            retries_used: 0,
            detection_duration: 0.0,
        }
    }

    /// Derived classification: any error is a failure, otherwise the
    /// original and final URLs decide.
    pub fn status(&self) -> DetectionStatus {
        if self.error.is_some() {
            return DetectionStatus::Failed;
        }
        classify(&self.url, self.final_url.as_deref().unwrap_or(""))
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Accessibility counts over each website's latest detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessibilitySummary {
    pub total: u64,
    pub accessible: u64,
    pub failed: u64,
    pub standard: u64,
    pub redirected: u64,
    /// Percentage in `0.0..=100.0`; zero when nothing was detected.
    pub accessibility_rate: f64,
    pub failure_rate: f64,
}

impl AccessibilitySummary {
    pub fn from_counts(standard: u64, redirected: u64, failed: u64) -> Self {
        let accessible = standard + redirected;
        let total = accessible + failed;
        let rate = |n: u64| {
            if total == 0 {
                0.0
            } else {
                (n as f64 / total as f64 * 10_000.0).round() / 100.0
            }
        };
        Self {
            total,
            accessible,
            failed,
            standard,
            redirected,
            accessibility_rate: rate(accessible),
            failure_rate: rate(failed),
        }
    }
}

/// A website that came back, with the event that showed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveredWebsite {
    pub website: Website,
    pub recovered_at: DateTime<Utc>,
    pub current_status: DetectionStatus,
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
