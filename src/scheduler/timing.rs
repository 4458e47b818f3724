//! Schedule arithmetic. Every comparison happens on `DateTime<Utc>`.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error_handling::ConfigError;

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parses an RFC 3339 timestamp or a naive one (taken as UTC).
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, ConfigError> {
    let input = input.trim();
    if let Ok(aware) = DateTime::parse_from_rfc3339(input) {
        return Ok(aware.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ConfigError::Invalid(format!("unrecognized timestamp: {input}")))
}

/// Whether a job should fire at `now`.
///
/// A pending `next_run_at` decides. Without one, only a job that has never
/// run is due.
///
/// A future `next_run_at` takes precedence over a missing `last_run_at`: a
/// job that never ran still waits for its first scheduled time instead of
/// firing immediately. `start` without `--first-run-at` schedules for now, so
/// this only delays jobs given an explicit later first run, plus new
/// failed-site monitors, whose first run is one interval after creation.
pub fn is_due(
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match next_run_at {
        Some(next) => next <= now,
        None => last_run_at.is_none(),
    }
}

/// Fixed-delay rule: the next run counts from completion, not from the
/// scheduled time.
pub fn next_run_after(completed_at: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX);
    completed_at
        .checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_aware_and_naive_forms_normalize_to_utc() {
        let naive = at("2024-03-01 12:00:00");
        let aware = at("2024-03-01T14:00:00+02:00");
        let zulu = at("2024-03-01T12:00:00Z");
        assert_eq!(naive, aware);
        assert_eq!(naive, zulu);
        assert_eq!(at("2024-03-01T12:00:00"), naive);
        assert_eq!(at("2024-03-01 12:00"), naive);
    }

    #[test]
    fn test_garbage_timestamp_is_rejected() {
        assert!(parse_timestamp("tomorrow").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_is_due_with_mixed_offsets() {
        // 13:30+02:00 is 11:30 UTC, before a naive 12:00 "now"
        let now = at("2024-03-01 12:00:00");
        assert!(is_due(None, Some(at("2024-03-01T13:30:00+02:00")), now));
        assert!(!is_due(None, Some(at("2024-03-01T12:30:00-01:00")), now));
        assert!(is_due(None, Some(now), now));
    }

    #[test]
    fn test_never_run_is_due() {
        let now = Utc::now();
        assert!(is_due(None, None, now));
        assert!(!is_due(Some(now), None, now));
        // A future first run is honoured even for a job that never ran
        assert!(!is_due(None, Some(now + chrono::Duration::minutes(5)), now));
    }

    #[test]
    fn test_next_run_counts_from_completion() {
        let completed = at("2024-03-01 12:45:00");
        assert_eq!(
            next_run_after(completed, Duration::from_secs(3600)),
            at("2024-03-01 13:45:00")
        );
        assert_eq!(
            next_run_after(completed, Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MAX_UTC
        );
    }
}
