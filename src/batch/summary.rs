//! Batch aggregate counters.

use std::time::Duration;

use log::info;
use serde::Serialize;

use crate::models::{DetectionStatus, ProbeOutcome};

/// Aggregate counters for one batch. Used for logging only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub standard: usize,
    pub redirected: usize,
    pub failed: usize,
    /// Mean response time in seconds over non-failed outcomes.
    pub avg_response_time: Option<f64>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ProbeOutcome], elapsed: Duration) -> Self {
        let mut summary = BatchSummary {
            total: outcomes.len(),
            elapsed,
            ..Default::default()
        };
        let mut time_sum = 0.0;
        let mut timed = 0usize;
        for outcome in outcomes {
            match outcome.status() {
                DetectionStatus::Standard => summary.standard += 1,
                DetectionStatus::Redirected => summary.redirected += 1,
                DetectionStatus::Failed => {
                    summary.failed += 1;
                    continue;
                }
            }
            if let Some(rt) = outcome.response_time {
                time_sum += rt;
                timed += 1;
            }
        }
        if timed > 0 {
            summary.avg_response_time = Some(time_sum / timed as f64);
        }
        summary
    }

    pub fn log(&self) {
        info!(
            "Batch complete: {} total, {} standard, {} redirected, {} failed, avg response {} in {:.1}s",
            self.total,
            self.standard,
            self.redirected,
            self.failed,
            self.avg_response_time
                .map(|t| format!("{t:.3}s"))
                .unwrap_or_else(|| "n/a".to_string()),
            self.elapsed.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::FailureReason;
    use crate::models::ProbeError;

    fn reached(url: &str, final_url: &str, rt: f64) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::failure(url, ProbeError::new(FailureReason::Timeout, ""));
        outcome.error = None;
        outcome.final_url = Some(final_url.to_string());
        outcome.response_time = Some(rt);
        outcome
    }

    #[test]
    fn test_counts_and_average_skip_failures() {
        let mut failed = reached("http://c.com", "http://c.com", 9.0);
        failed.error = Some(ProbeError::new(FailureReason::ServerError, "HTTP 500"));
        let outcomes = vec![
            reached("http://a.com", "https://a.com/", 1.0),
            reached("http://b.com", "https://elsewhere.net/", 3.0),
            failed,
        ];
        let summary = BatchSummary::from_outcomes(&outcomes, Duration::from_secs(2));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.standard, 1);
        assert_eq!(summary.redirected, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.avg_response_time, Some(2.0));
    }

    #[test]
    fn test_empty_batch_has_no_average() {
        let summary = BatchSummary::from_outcomes(&[], Duration::ZERO);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.avg_response_time, None);
    }
}
