//! Bounded retries around a single probe.
//!
//! Only transient failures (timeout, connection, DNS) are retried. SSL
//! failures and HTTP error responses are conclusive and returned after the
//! first attempt.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::{debug, warn};
use tokio_retry::RetryIf;

use crate::error_handling::retry_strategy;
use crate::models::ProbeOutcome;
use crate::probe::{ProbeSettings, Prober};

/// Probes `url` up to `max_retries + 1` times.
///
/// The delay before retry `n` (0-based) is `2^n * backoff_unit`. The last
/// outcome is returned with `retries_used` set to the number of retries
/// actually made.
pub async fn probe_with_retry(
    prober: &dyn Prober,
    url: &str,
    settings: &ProbeSettings,
    max_retries: u32,
    backoff_unit: Duration,
) -> ProbeOutcome {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let strategy = retry_strategy(backoff_unit, max_retries as usize);

    let result = RetryIf::spawn(
        strategy,
        move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            if attempt > 0 {
                debug!("Retry {attempt}/{max_retries} for {url}");
            }
            let outcome = prober.probe(url, settings).await;
            match outcome.failure_reason() {
                Some(reason) if reason.is_transient() => Err(outcome),
                _ => Ok(outcome),
            }
        },
        |outcome: &ProbeOutcome| {
            if let Some(err) = &outcome.error {
                warn!("Transient {} for {}: {}", err.kind, url, err.message);
            }
            true
        },
    )
    .await;

    let mut outcome = match result {
        Ok(outcome) | Err(outcome) => outcome,
    };
    outcome.retries_used = attempts.load(Ordering::SeqCst).saturating_sub(1);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::FailureReason;
    use crate::models::ProbeError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Fails with `reason` for the first `failures` calls, then succeeds.
    struct ScriptedProber {
        reason: FailureReason,
        failures: usize,
        calls: AtomicUsize,
    }

    impl ScriptedProber {
        fn new(reason: FailureReason, failures: usize) -> Self {
            Self {
                reason,
                failures,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, url: &str, _settings: &ProbeSettings) -> ProbeOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return ProbeOutcome::failure(url, ProbeError::new(self.reason, "scripted"));
            }
            let mut outcome = ProbeOutcome::failure(url, ProbeError::new(self.reason, ""));
            outcome.error = None;
            outcome.final_url = Some(url.to_string());
            outcome.http_status = Some(200);
            outcome
        }
    }

    fn settings() -> ProbeSettings {
        ProbeSettings {
            timeout: Duration::from_secs(1),
            verify_tls: false,
        }
    }

    const UNIT: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_timeouts_are_retried_up_to_bound() {
        let prober = ScriptedProber::new(FailureReason::Timeout, usize::MAX);
        let outcome = probe_with_retry(&prober, "http://slow.test", &settings(), 2, UNIT).await;
        assert_eq!(prober.calls(), 3);
        assert_eq!(outcome.retries_used, 2);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::Timeout));
    }

    #[tokio::test]
    async fn test_ssl_error_is_not_retried() {
        let prober = ScriptedProber::new(FailureReason::SslError, usize::MAX);
        let outcome = probe_with_retry(&prober, "https://bad.test", &settings(), 5, UNIT).await;
        assert_eq!(prober.calls(), 1);
        assert_eq!(outcome.retries_used, 0);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::SslError));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let prober = ScriptedProber::new(FailureReason::ServerError, usize::MAX);
        let outcome = probe_with_retry(&prober, "http://e500.test", &settings(), 3, UNIT).await;
        assert_eq!(prober.calls(), 1);
        assert_eq!(outcome.retries_used, 0);
    }

    #[tokio::test]
    async fn test_success_after_transient_failure() {
        let prober = ScriptedProber::new(FailureReason::ConnectionError, 1);
        let outcome = probe_with_retry(&prober, "http://flaky.test", &settings(), 3, UNIT).await;
        assert_eq!(prober.calls(), 2);
        assert_eq!(outcome.retries_used, 1);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let prober = ScriptedProber::new(FailureReason::DnsError, usize::MAX);
        let outcome = probe_with_retry(&prober, "http://nx.test", &settings(), 0, UNIT).await;
        assert_eq!(prober.calls(), 1);
        assert_eq!(outcome.retries_used, 0);
    }

    #[tokio::test]
    async fn test_backoff_waits_between_attempts() {
        let prober = ScriptedProber::new(FailureReason::Timeout, usize::MAX);
        let started = Instant::now();
        probe_with_retry(&prober, "http://slow.test", &settings(), 2, Duration::from_millis(50)).await;
        // 50ms + 100ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
