//! Main application entry point (CLI binary).
//!
//! A thin wrapper around the `site_sentinel` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - JSON output of returned data
//!
//! All core functionality is implemented in the library crate.

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::info;
use serde::Serialize;
use serde_json::json;

use site_sentinel::config::{Cli, Command};
use site_sentinel::initialization::{init_crypto_provider, init_logger_with};
use site_sentinel::scheduler::parse_timestamp;
use site_sentinel::{
    BatchOptions, BatchRunner, Config, HttpProber, LogNotifier, NewTask, ProcessingStats,
    Scheduler, Storage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = cli.to_config();
    config.validate().context("Invalid configuration")?;

    init_logger_with(config.log_level.clone().into(), config.log_format.clone())
        .context("Failed to initialize logger")?;

    // Initialize crypto provider for TLS operations
    init_crypto_provider();

    if let Err(e) = run(cli.command, config).await {
        eprintln!("site_sentinel error: {e:#}");
        process::exit(1);
    }
    Ok(())
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Init => {
            open_storage(&config).await?;
            print_json(&json!({ "db_path": config.db_path, "status": "ready" }))
        }
        Command::AddWebsite { name, url } => {
            let storage = open_storage(&config).await?;
            let website = storage.add_website(&name, &url).await?;
            print_json(&website)
        }
        Command::AddTask {
            name,
            interval_secs,
            max_concurrency,
            timeout_secs,
            retry_count,
            website_ids,
        } => {
            let storage = open_storage(&config).await?;
            let task = storage
                .create_task(&NewTask {
                    name,
                    interval: Duration::from_secs(interval_secs),
                    max_concurrency,
                    timeout: Duration::from_secs(timeout_secs),
                    retry_count,
                })
                .await?;
            storage.assign_websites(task.id, &website_ids).await?;
            print_json(&task)
        }
        Command::Check {
            urls,
            concurrency,
            timeout_secs,
            retries,
        } => {
            let stats = Arc::new(ProcessingStats::new());
            let runner = build_runner(&config, Arc::clone(&stats))?;
            let defaults = BatchOptions::from(&config.detector);
            let options = BatchOptions {
                concurrency_limit: concurrency.unwrap_or(defaults.concurrency_limit),
                timeout: timeout_secs.map_or(defaults.timeout, Duration::from_secs),
                max_retries: retries.unwrap_or(defaults.max_retries),
                ..defaults
            };
            options.validate().context("Invalid check options")?;
            let report = runner.run_batch(&urls, &options, None).await;
            stats.log_summary();
            print_json(&report)
        }
        Command::RunNow { task_id } => {
            let storage = open_storage(&config).await?;
            let stats = Arc::new(ProcessingStats::new());
            let scheduler = build_scheduler(storage.clone(), &config, Arc::clone(&stats))?;
            let started = scheduler.run_task_now(task_id).await?;
            // Waits for the launched cycle to finish
            scheduler.shutdown().await;
            stats.log_summary();
            let task = storage.load_task(task_id).await?;
            let summary = storage.accessibility_summary(Some(task_id)).await?;
            print_json(&json!({ "run": started, "task": task, "summary": summary }))
        }
        Command::Start {
            task_id,
            interval_secs,
            first_run_at,
        } => {
            let first_run_at = first_run_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .context("Invalid --first-run-at")?;
            let storage = open_storage(&config).await?;
            let scheduler =
                build_scheduler(storage, &config, Arc::new(ProcessingStats::new()))?;
            let task = scheduler
                .start_task(task_id, interval_secs.map(Duration::from_secs), first_run_at)
                .await?;
            print_json(&task)
        }
        Command::Stop { task_id } => {
            let storage = open_storage(&config).await?;
            let scheduler =
                build_scheduler(storage, &config, Arc::new(ProcessingStats::new()))?;
            let task = scheduler.stop_task(task_id).await?;
            print_json(&task)
        }
        Command::Serve => {
            let storage = open_storage(&config).await?;
            let stats = Arc::new(ProcessingStats::new());
            let scheduler = build_scheduler(storage, &config, Arc::clone(&stats))?;
            let scan_loop = scheduler.spawn_loop();
            info!(
                "Scheduler running (tick {}s); press Ctrl-C to stop",
                config.scheduler.tick_interval.as_secs()
            );

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
            scheduler.shutdown().await;
            let _ = scan_loop.await;
            stats.log_summary();
            Ok(())
        }
        Command::Summary { task_id } => {
            let storage = open_storage(&config).await?;
            print_json(&storage.accessibility_summary(task_id).await?)
        }
        Command::Changes {
            task_id,
            hours,
            limit,
        } => {
            let storage = open_storage(&config).await?;
            let since = Utc::now() - chrono::Duration::hours(i64::from(hours));
            print_json(&storage.recent_status_changes(task_id, since, limit).await?)
        }
        Command::Recovered { task_id, hours } => {
            let storage = open_storage(&config).await?;
            let since = Utc::now() - chrono::Duration::hours(i64::from(hours));
            print_json(&storage.recovered_websites(task_id, since).await?)
        }
    }
}

async fn open_storage(config: &Config) -> Result<Storage> {
    Storage::open(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))
}

fn build_runner(config: &Config, stats: Arc<ProcessingStats>) -> Result<BatchRunner> {
    let prober = HttpProber::new(&config.detector).context("Failed to initialize HTTP prober")?;
    Ok(BatchRunner::new(
        Arc::new(prober),
        config.detector.clone(),
        stats,
    ))
}

fn build_scheduler(
    storage: Storage,
    config: &Config,
    stats: Arc<ProcessingStats>,
) -> Result<Scheduler> {
    let runner = build_runner(config, stats)?;
    Ok(Scheduler::new(
        storage,
        runner,
        Arc::new(LogNotifier),
        config.scheduler.clone(),
        config.monitor.clone(),
    ))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}
