//! Error categorization and retry strategy.
//!
//! Maps transport failures onto the [`FailureReason`] taxonomy and builds the
//! exponential backoff schedule used between probe attempts.

use std::error::Error as StdError;
use std::time::Duration;

use super::types::FailureReason;

const SSL_MARKERS: &[&str] = &[
    "ssl",
    "tls",
    "certificate",
    "handshake",
    "unknownissuer",
    "notvalidforname",
];

const DNS_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name resolution",
    "nodename nor servname",
    "name or service not known",
    "no such host",
    "getaddrinfo",
];

const CONNECTION_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "connection closed",
    "broken pipe",
    "network is unreachable",
    "host is unreachable",
    "error trying to connect",
];

/// Creates the backoff schedule for `max_retries` retries.
///
/// The delay before retry `n` (0-based) is `2^n * unit`, so with a one-second
/// unit the waits are 1s, 2s, 4s, and so on. The iterator yields exactly
/// `max_retries` delays.
pub fn retry_strategy(unit: Duration, max_retries: usize) -> impl Iterator<Item = Duration> {
    (0..max_retries).map(move |n| {
        let scale = u32::try_from(n).map_or(u32::MAX, |n| 2u32.saturating_pow(n));
        unit.saturating_mul(scale)
    })
}

/// Categorizes a `reqwest::Error` into a [`FailureReason`].
///
/// Timeouts win over everything else. SSL/TLS failures surface from reqwest
/// as connect errors, so the full source chain is inspected before falling
/// back to the generic connection category.
pub fn categorize_reqwest_error(error: &reqwest::Error) -> FailureReason {
    if error.is_timeout() {
        return FailureReason::Timeout;
    }

    // reqwest's own message embeds the request URL, so only the causes are
    // matched against the markers
    let causes = error
        .source()
        .map(error_chain_text)
        .unwrap_or_default()
        .to_lowercase();
    if let Some(reason) = categorize_text(&causes) {
        return reason;
    }

    if error.is_connect() {
        FailureReason::ConnectionError
    } else if error.is_status() {
        FailureReason::ServerError
    } else {
        FailureReason::UnknownError
    }
}

/// Categorizes a free-form error message.
///
/// Shares its markers with [`categorize_reqwest_error`]; unmatched text is
/// `UnknownError`.
pub fn categorize_message(message: &str) -> FailureReason {
    categorize_text(&message.to_lowercase()).unwrap_or(FailureReason::UnknownError)
}

fn categorize_text(lowercase: &str) -> Option<FailureReason> {
    if lowercase.contains("timed out") || lowercase.contains("timeout") {
        Some(FailureReason::Timeout)
    } else if SSL_MARKERS.iter().any(|m| lowercase.contains(m)) {
        Some(FailureReason::SslError)
    } else if DNS_MARKERS.iter().any(|m| lowercase.contains(m)) {
        Some(FailureReason::DnsError)
    } else if CONNECTION_MARKERS.iter().any(|m| lowercase.contains(m)) {
        Some(FailureReason::ConnectionError)
    } else {
        None
    }
}

/// Flattens an error and all of its sources into one `outer: inner` string.
pub fn error_chain_text(error: &(dyn StdError + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}
