//! Processing statistics tracking.
//!
//! Counters for failure categories observed across batches. One instance is
//! built per process and shared by reference (or `Arc`) with the components
//! that record into it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use strum::IntoEnumIterator;

use super::types::FailureReason;

/// Thread-safe failure counters keyed by [`FailureReason`].
///
/// Every category is initialized to zero on creation, so lookups never miss.
pub struct ProcessingStats {
    failures: HashMap<FailureReason, AtomicUsize>,
    probes: AtomicUsize,
    retries: AtomicUsize,
}

impl ProcessingStats {
    pub fn new() -> Self {
        let failures = FailureReason::iter()
            .map(|reason| (reason, AtomicUsize::new(0)))
            .collect();
        ProcessingStats {
            failures,
            probes: AtomicUsize::new(0),
            retries: AtomicUsize::new(0),
        }
    }

    pub fn increment_failure(&self, reason: FailureReason) {
        if let Some(counter) = self.failures.get(&reason) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment failure counter for {:?} which is not in the map",
                reason
            );
        }
    }

    /// Records one finished probe and the retries it used.
    pub fn record_probe(&self, retries_used: u32) {
        self.probes.fetch_add(1, Ordering::Relaxed);
        self.retries
            .fetch_add(retries_used as usize, Ordering::Relaxed);
    }

    pub fn get_failure_count(&self, reason: FailureReason) -> usize {
        self.failures
            .get(&reason)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn total_failures(&self) -> usize {
        self.failures
            .values()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }

    pub fn total_probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn total_retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    /// Logs non-zero failure categories at info level.
    pub fn log_summary(&self) {
        let total = self.total_failures();
        log::info!(
            "Probes: {} (retries: {}), failures: {}",
            self.total_probes(),
            self.total_retries(),
            total
        );
        if total == 0 {
            return;
        }
        for reason in FailureReason::iter() {
            let count = self.get_failure_count(reason);
            if count > 0 {
                log::info!("   {}: {}", reason, count);
            }
        }
    }
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_processing_stats_initialization() {
        let stats = ProcessingStats::new();
        for reason in FailureReason::iter() {
            assert_eq!(stats.get_failure_count(reason), 0);
        }
        assert_eq!(stats.total_failures(), 0);
        assert_eq!(stats.total_probes(), 0);
    }

    #[test]
    fn test_processing_stats_increment() {
        let stats = ProcessingStats::new();
        stats.increment_failure(FailureReason::Timeout);
        stats.increment_failure(FailureReason::Timeout);
        stats.increment_failure(FailureReason::SslError);
        assert_eq!(stats.get_failure_count(FailureReason::Timeout), 2);
        assert_eq!(stats.get_failure_count(FailureReason::SslError), 1);
        assert_eq!(stats.total_failures(), 3);
    }

    #[test]
    fn test_record_probe_tracks_retries() {
        let stats = ProcessingStats::new();
        stats.record_probe(0);
        stats.record_probe(2);
        assert_eq!(stats.total_probes(), 2);
        assert_eq!(stats.total_retries(), 2);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(ProcessingStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.increment_failure(FailureReason::DnsError);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.get_failure_count(FailureReason::DnsError), 800);
    }
}
