//! Configuration constants.
//!
//! Defaults for the detector, scheduler and failed-site monitor. Every value
//! here can be overridden through the typed configuration structs.

use std::time::Duration;

pub const DB_PATH: &str = "./site_sentinel.db";

// Probe defaults
/// Per-request timeout used when a task does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Retries after the first attempt.
pub const DEFAULT_RETRY_TIMES: u32 = 3;
/// Concurrent probes for one batch.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;
/// Maximum redirect hops followed before the last response is taken as final.
pub const MAX_REDIRECT_HOPS: usize = 3;
/// Maximum response body bytes read per probe (256KB).
pub const MAX_RESPONSE_BODY_SIZE: usize = 256 * 1024;
/// Page titles longer than this are truncated.
pub const MAX_TITLE_CHARS: usize = 200;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

// Batch strategy
/// Batches with at least this many URLs use the event-loop strategy.
pub const EVENT_LOOP_THRESHOLD: usize = 10;
/// Concurrent connections allowed to one host in event-loop mode.
pub const PER_HOST_LIMIT: usize = 2;
/// Per-request timeout ceiling in event-loop mode.
pub const EVENT_LOOP_TIMEOUT: Duration = Duration::from_secs(10);
pub const EVENT_LOOP_MAX_CONCURRENT: usize = 200;

// Retry
/// Backoff unit: the delay before retry `n` (0-based) is `2^n` units.
pub const RETRY_BACKOFF_UNIT: Duration = Duration::from_secs(1);

// TLS inspection
/// Per-connection limits; the probe's remaining timeout caps inspection too.
pub const TLS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// Scheduler
/// How often the scheduler scans for due jobs.
pub const SCHEDULER_TICK: Duration = Duration::from_secs(10);
/// Task executions allowed to run at the same time.
pub const SCHEDULER_WORKERS: usize = 4;

// Failed-site monitor
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);
pub const MONITOR_MAX_CONCURRENCY: usize = 5;
pub const MONITOR_TIMEOUT: Duration = Duration::from_secs(20);
pub const MONITOR_RETRY_COUNT: u32 = 2;

/// Error messages longer than this are truncated before they are stored.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 2000;
