//! Fixed worker-pool strategy for small batches.
//!
//! `workers` loops pull the next unclaimed index from a shared counter, so
//! at most `workers` probes are in flight and no worker idles while URLs
//! remain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use log::trace;
use tokio::sync::mpsc::UnboundedSender;

use super::ProbeJob;
use crate::models::ProbeOutcome;

pub(super) async fn run(
    job: ProbeJob,
    urls: Arc<Vec<String>>,
    workers: usize,
    results: UnboundedSender<(usize, ProbeOutcome)>,
) {
    let next = Arc::new(AtomicUsize::new(0));

    let workers = (0..workers).map(|worker_id| {
        let job = job.clone();
        let urls = Arc::clone(&urls);
        let next = Arc::clone(&next);
        let results = results.clone();
        async move {
            loop {
                let idx = next.fetch_add(1, Ordering::SeqCst);
                let Some(url) = urls.get(idx) else {
                    break;
                };
                let outcome = job.run_isolated(url.clone()).await;
                if results.send((idx, outcome)).is_err() {
                    break;
                }
            }
            trace!("Pool worker {worker_id} finished");
        }
    });

    join_all(workers).await;
}
