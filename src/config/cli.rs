//! Command-line interface definition.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::constants::{DB_PATH, DEFAULT_USER_AGENT, SCHEDULER_TICK};
use crate::config::types::{Config, DetectorConfig, LogFormat, LogLevel, SchedulerConfig};

#[derive(Debug, Parser)]
#[command(
    name = "site_sentinel",
    about = "Scheduled website availability detection with status-change tracking."
)]
pub struct Cli {
    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain, global = true)]
    pub log_format: LogFormat,

    /// Database path (SQLite file)
    #[arg(long, value_parser, default_value = DB_PATH, global = true)]
    pub db_path: PathBuf,

    /// HTTP User-Agent header value
    #[arg(long, default_value = DEFAULT_USER_AGENT, global = true)]
    pub user_agent: String,

    /// Fail probes whose TLS certificate does not verify
    #[arg(long, global = true)]
    pub verify_ssl: bool,

    /// Seconds between scheduler scans for due tasks
    #[arg(long, default_value_t = SCHEDULER_TICK.as_secs(), global = true)]
    pub tick_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database and apply migrations
    Init,

    /// Register a website
    AddWebsite {
        name: String,
        url: String,
    },

    /// Create a detection task (inactive until started)
    AddTask {
        name: String,
        #[arg(long, default_value_t = 6 * 60 * 60)]
        interval_secs: u64,
        #[arg(long, default_value_t = 10)]
        max_concurrency: usize,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
        #[arg(long, default_value_t = 3)]
        retry_count: u32,
        /// Website to include (repeatable)
        #[arg(long = "website-id")]
        website_ids: Vec<i64>,
    },

    /// Probe URLs once and print the outcomes
    Check {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Defaults to the detector's max_concurrent
        #[arg(long)]
        concurrency: Option<usize>,
        /// Defaults to the detector's timeout
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Defaults to the detector's retry_times
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Run one cycle of a task in the foreground
    RunNow { task_id: i64 },

    /// Activate a task's schedule
    Start {
        task_id: i64,
        /// Replace the task's interval
        #[arg(long)]
        interval_secs: Option<u64>,
        /// First fire time: RFC 3339, or `YYYY-MM-DD HH:MM:SS` read as UTC
        #[arg(long)]
        first_run_at: Option<String>,
    },

    /// Deactivate a task's schedule
    Stop { task_id: i64 },

    /// Run the scheduler until Ctrl-C
    Serve,

    /// Accessibility summary over each website's latest record
    Summary {
        #[arg(long)]
        task_id: Option<i64>,
    },

    /// Recent status changes
    Changes {
        #[arg(long)]
        task_id: Option<i64>,
        #[arg(long, default_value_t = 24)]
        hours: u32,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Websites that recovered under a task
    Recovered {
        task_id: i64,
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
}

impl Cli {
    /// Builds the library configuration from the global flags.
    pub fn to_config(&self) -> Config {
        Config {
            db_path: self.db_path.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
            detector: DetectorConfig {
                verify_ssl: self.verify_ssl,
                user_agent: self.user_agent.clone(),
                ..Default::default()
            },
            scheduler: SchedulerConfig {
                tick_interval: Duration::from_secs(self.tick_secs),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
