//! High-concurrency strategy for large batches.
//!
//! Every URL gets its own task up front. A global semaphore bounds the
//! number of probes in flight and one semaphore per host caps concurrent
//! connections to the same server. The host permit is taken first so tasks
//! waiting on a busy host do not hold global slots.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;

use super::ProbeJob;
use crate::classifier::extract_host;
use crate::models::ProbeOutcome;
use crate::probe::normalize_url;

pub(super) async fn run(
    job: ProbeJob,
    urls: Arc<Vec<String>>,
    concurrency: usize,
    per_host_limit: usize,
    results: UnboundedSender<(usize, ProbeOutcome)>,
) {
    let global = Arc::new(Semaphore::new(concurrency));
    let mut host_limits: HashMap<String, Arc<Semaphore>> = HashMap::new();

    let mut tasks = FuturesUnordered::new();
    for (idx, url) in urls.iter().enumerate() {
        let host = extract_host(&normalize_url(url));
        let host_limit = Arc::clone(
            host_limits
                .entry(host)
                .or_insert_with(|| Arc::new(Semaphore::new(per_host_limit))),
        );
        let global = Arc::clone(&global);
        let job = job.clone();
        let task_url = url.clone();

        let handle = tokio::spawn(async move {
            let _host_permit = host_limit.acquire_owned().await.ok();
            let _permit = global.acquire_owned().await.ok();
            job.probe(&task_url).await
        });

        let url = url.clone();
        tasks.push(async move { (idx, url, handle.await) });
    }

    while let Some((idx, url, joined)) = tasks.next().await {
        let outcome = super::outcome_from_join(&url, joined);
        if results.send((idx, outcome)).is_err() {
            break;
        }
    }
}
