// Shared test helpers: in-memory storage, a scripted prober and scheduler setup.
//
// Included with `mod helpers;` from the other test files.

#![allow(dead_code)] // Each test file uses a different subset

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use site_sentinel::classifier::extract_host;
use site_sentinel::probe::normalize_url;
use site_sentinel::{
    BatchRunner, DetectorConfig, FailureReason, LogNotifier, MonitorDefaults, NewTask,
    ProbeError, ProbeOutcome, ProbeSettings, Prober, ProcessingStats, Scheduler,
    SchedulerConfig, Storage,
};

/// What the scripted prober does for one call.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Succeeds on the requested URL.
    Ok,
    /// Succeeds after sleeping.
    OkAfter(Duration),
    /// Succeeds on a different final URL.
    RedirectTo(String),
    Fail(FailureReason),
    Panic,
}

/// A prober that answers from a per-host script instead of the network.
///
/// The n-th call for a host uses the n-th scripted behaviour; the last one
/// repeats. Unscripted hosts succeed.
pub struct FakeProber {
    scripts: HashMap<String, Vec<Behaviour>>,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeProber {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(mut self, host: &str, behaviours: Vec<Behaviour>) -> Self {
        self.scripts.insert(host.to_string(), behaviours);
        self
    }

    pub fn calls(&self, host: &str) -> usize {
        self.calls.lock().unwrap().get(host).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_behaviour(&self, host: &str) -> Behaviour {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(host.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };
        self.scripts
            .get(host)
            .and_then(|script| script.get(call).or(script.last()))
            .cloned()
            .unwrap_or(Behaviour::Ok)
    }
}

pub fn success(url: &str, final_url: &str) -> ProbeOutcome {
    ProbeOutcome {
        url: url.to_string(),
        final_url: Some(final_url.to_string()),
        http_status: Some(200),
        response_time: Some(0.05),
        redirect_chain: vec![final_url.to_string()],
        page_title: None,
        content_length: Some(128),
        tls_info: None,
        error: None,
        retries_used: 0,
        detection_duration: 0.05,
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, url: &str, _settings: &ProbeSettings) -> ProbeOutcome {
        let host = extract_host(&normalize_url(url));
        let behaviour = self.next_behaviour(&host);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Behaviour::OkAfter(delay) = &behaviour {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match behaviour {
            Behaviour::Ok | Behaviour::OkAfter(_) => success(url, &normalize_url(url)),
            Behaviour::RedirectTo(target) => success(url, &target),
            Behaviour::Fail(kind) => {
                ProbeOutcome::failure(url, ProbeError::new(kind, format!("scripted {kind}")))
            }
            Behaviour::Panic => panic!("scripted panic for {url}"),
        }
    }
}

/// Detector settings with a short backoff so retries stay fast.
pub fn test_detector_config() -> DetectorConfig {
    DetectorConfig {
        backoff_unit: Duration::from_millis(10),
        ..Default::default()
    }
}

pub fn test_runner(prober: Arc<FakeProber>) -> BatchRunner {
    BatchRunner::new(
        prober,
        test_detector_config(),
        Arc::new(ProcessingStats::new()),
    )
}

pub fn test_scheduler(storage: &Storage, prober: Arc<FakeProber>) -> Scheduler {
    Scheduler::new(
        storage.clone(),
        test_runner(prober),
        Arc::new(LogNotifier),
        SchedulerConfig {
            tick_interval: Duration::from_millis(50),
            worker_pool_size: 4,
        },
        MonitorDefaults::default(),
    )
}

pub async fn memory_storage() -> Storage {
    Storage::in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

/// Creates a task over `urls` (registering each as a website).
pub async fn create_task_with_sites(
    storage: &Storage,
    name: &str,
    interval: Duration,
    retry_count: u32,
    urls: &[&str],
) -> i64 {
    let task = storage
        .create_task(&NewTask {
            name: name.to_string(),
            interval,
            max_concurrency: 4,
            timeout: Duration::from_secs(5),
            retry_count,
        })
        .await
        .expect("Failed to create task");
    let mut ids = Vec::new();
    for url in urls {
        let site = storage
            .add_website(url, url)
            .await
            .expect("Failed to add website");
        ids.push(site.id);
    }
    storage
        .assign_websites(task.id, &ids)
        .await
        .expect("Failed to assign websites");
    task.id
}

/// Runs one full cycle of `task_id` on a fresh scheduler and waits for it.
pub async fn run_cycle(storage: &Storage, prober: Arc<FakeProber>, task_id: i64) {
    let scheduler = test_scheduler(storage, prober);
    scheduler
        .run_task_now(task_id)
        .await
        .expect("run_task_now failed");
    scheduler.shutdown().await;
}
