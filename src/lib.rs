//! site_sentinel library: scheduled website availability detection
//!
//! Probes websites over HTTP(S), classifies each result as `standard`,
//! `redirected` or `failed`, records the history in SQLite, detects status
//! changes between consecutive detections and runs detection tasks on a
//! fixed-delay schedule. A failed-site monitor re-checks a task's failed
//! websites at a shorter interval to notice recoveries early.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use site_sentinel::{BatchOptions, BatchRunner, DetectorConfig, HttpProber, ProcessingStats};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! site_sentinel::initialization::init_crypto_provider();
//! let config = DetectorConfig::default();
//! let prober = Arc::new(HttpProber::new(&config)?);
//! let runner = BatchRunner::new(prober, config, Arc::new(ProcessingStats::new()));
//!
//! let urls = vec!["example.com".to_string(), "https://www.rust-lang.org".to_string()];
//! let options = BatchOptions {
//!     concurrency_limit: 4,
//!     timeout: std::time::Duration::from_secs(10),
//!     max_retries: 1,
//!     verify_tls: false,
//! };
//! let report = runner.run_batch(&urls, &options, None).await;
//! for (url, outcome) in urls.iter().zip(&report.outcomes) {
//!     println!("{url}: {}", outcome.status());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime.

pub mod batch;
pub mod classifier;
pub mod config;
pub mod error_handling;
pub mod initialization;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod probe;
pub mod retry;
pub mod scheduler;
pub mod status_change;
pub mod storage;
mod tls;

// Re-export public API
pub use batch::{BatchMode, BatchOptions, BatchReport, BatchRunner, BatchSummary, ProgressCallback};
pub use classifier::classify;
pub use config::{Config, DetectorConfig, LogFormat, LogLevel, MonitorDefaults, SchedulerConfig};
pub use error_handling::{DatabaseError, FailureReason, ProcessingStats, SchedulerError};
pub use models::{
    AccessibilitySummary, ChangeType, DetectionRecord, DetectionStatus, DetectionTask,
    FailedSiteMonitorTask, NewDetectionRecord, NewTask, ProbeError, ProbeOutcome,
    RecoveredWebsite, StatusChangeEvent, TlsInfo, Website,
};
pub use notify::{LogNotifier, Notifier};
pub use probe::{HttpProber, ProbeSettings, Prober};
pub use retry::probe_with_retry;
pub use scheduler::{RunNow, Scheduler};
pub use status_change::{classify_transition, detect_changes};
pub use storage::{run_migrations, Storage};
pub use tls::TlsInspector;
