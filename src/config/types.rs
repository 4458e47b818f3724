//! Configuration types.
//!
//! Typed configuration for the detector, the scheduler and the failed-site
//! monitor. Values are validated once with [`Config::validate`] before any
//! component is built from them.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::config::constants::*;
use crate::error_handling::ConfigError;

/// Logging level for the application.
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// One JSON object per line
    Json,
}

/// Probe and batch settings.
///
/// `timeout`, `retry_times` and `max_concurrent` are the defaults for one-off
/// batches (see `BatchOptions::from`); scheduled tasks carry their own values.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub timeout: Duration,
    pub retry_times: u32,
    pub max_concurrent: usize,
    /// Fail probes whose certificate does not verify.
    pub verify_ssl: bool,
    pub user_agent: String,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
    /// Batches with at least this many URLs use the event-loop strategy.
    pub event_loop_threshold: usize,
    pub per_host_limit: usize,
    /// Per-request timeout ceiling in event-loop mode.
    pub event_loop_timeout: Duration,
    pub event_loop_max_concurrent: usize,
    /// Delay before retry `n` is `2^n * backoff_unit`.
    pub backoff_unit: Duration,
    pub title_max_chars: usize,
    /// TCP connect limit for the certificate inspection connection.
    pub tls_connect_timeout: Duration,
    pub tls_handshake_timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry_times: DEFAULT_RETRY_TIMES,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            verify_ssl: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: MAX_REDIRECT_HOPS,
            max_body_bytes: MAX_RESPONSE_BODY_SIZE,
            event_loop_threshold: EVENT_LOOP_THRESHOLD,
            per_host_limit: PER_HOST_LIMIT,
            event_loop_timeout: EVENT_LOOP_TIMEOUT,
            event_loop_max_concurrent: EVENT_LOOP_MAX_CONCURRENT,
            backoff_unit: RETRY_BACKOFF_UNIT,
            title_max_chars: MAX_TITLE_CHARS,
            tls_connect_timeout: TLS_CONNECT_TIMEOUT,
            tls_handshake_timeout: TLS_HANDSHAKE_TIMEOUT,
        }
    }
}

impl DetectorConfig {
    /// Checks value ranges. Called by [`Config::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than 0".into()));
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be greater than 0".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent must not be empty".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than 0".into(),
            ));
        }
        if self.event_loop_threshold == 0 {
            return Err(ConfigError::Invalid(
                "event_loop_threshold must be greater than 0".into(),
            ));
        }
        if self.per_host_limit == 0 {
            return Err(ConfigError::Invalid(
                "per_host_limit must be greater than 0".into(),
            ));
        }
        if self.event_loop_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "event_loop_timeout must be greater than 0".into(),
            ));
        }
        if self.event_loop_max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "event_loop_max_concurrent must be greater than 0".into(),
            ));
        }
        if self.tls_connect_timeout.is_zero() || self.tls_handshake_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "TLS inspection timeouts must be greater than 0".into(),
            ));
        }
        // 2^retry_times backoff units must stay representable
        if self.retry_times > 16 {
            return Err(ConfigError::Invalid(format!(
                "retry_times {} is too large (max 16)",
                self.retry_times
            )));
        }
        Ok(())
    }
}

/// Scheduler loop settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Task executions allowed to run at once across all jobs.
    pub worker_pool_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: SCHEDULER_TICK,
            worker_pool_size: SCHEDULER_WORKERS,
        }
    }
}

/// Settings given to a failed-site monitor when it is first created for a
/// parent task.
#[derive(Debug, Clone)]
pub struct MonitorDefaults {
    pub interval: Duration,
    pub max_concurrency: usize,
    pub timeout: Duration,
    pub retry_count: u32,
}

impl Default for MonitorDefaults {
    fn default() -> Self {
        Self {
            interval: MONITOR_INTERVAL,
            max_concurrency: MONITOR_MAX_CONCURRENCY,
            timeout: MONITOR_TIMEOUT,
            retry_count: MONITOR_RETRY_COUNT,
        }
    }
}

/// Library configuration (no CLI dependencies).
///
/// # Examples
///
/// ```no_run
/// use site_sentinel::Config;
/// use std::path::PathBuf;
///
/// let config = Config {
///     db_path: PathBuf::from("monitor.db"),
///     ..Default::default()
/// };
/// config.validate().expect("valid configuration");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Database path (SQLite file)
    pub db_path: PathBuf,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub detector: DetectorConfig,
    pub scheduler: SchedulerConfig,
    pub monitor: MonitorDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DB_PATH),
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            detector: DetectorConfig::default(),
            scheduler: SchedulerConfig::default(),
            monitor: MonitorDefaults::default(),
        }
    }
}

impl Config {
    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        if self.scheduler.tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "tick_interval must be greater than 0".into(),
            ));
        }
        if self.scheduler.worker_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "worker_pool_size must be greater than 0".into(),
            ));
        }
        if self.monitor.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "monitor interval must be greater than 0".into(),
            ));
        }
        if self.monitor.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "monitor max_concurrency must be greater than 0".into(),
            ));
        }
        if self.monitor.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "monitor timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
