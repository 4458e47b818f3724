//! Error type definitions.
//!
//! Library errors are `thiserror` enums. Probe failures are not errors: they
//! are recorded as a [`FailureReason`] on the outcome.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter as EnumIterMacro, EnumString, IntoStaticStr};
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// Error building the TLS inspection configuration.
    #[error("TLS configuration error: {0}")]
    TlsConfigError(#[from] rustls::Error),
}

/// Error types for database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreationError(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// A row held a value the model cannot represent.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Unique constraint on a website URL.
    #[error("Website already registered: {0}")]
    DuplicateWebsite(String),

    /// Rejected before it reached the database.
    #[error("Invalid website URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Task parameters out of range.
    #[error(transparent)]
    InvalidTask(#[from] ConfigError),
}

/// Configuration validation failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors returned by scheduler operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Task {0} not found")]
    UnknownTask(i64),

    #[error("Scheduler is shut down")]
    Stopped,

    #[error(transparent)]
    InvalidSchedule(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Category of a failed probe.
///
/// The snake_case string form is what gets persisted in `failure_reason`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIterMacro,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    DnsError,
    SslError,
    ConnectionError,
    /// 4xx or 5xx response.
    ServerError,
    UnknownError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Certificate problems and HTTP error responses are conclusive.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureReason::Timeout | FailureReason::ConnectionError | FailureReason::DnsError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_failure_reason_strings() {
        assert_eq!(FailureReason::Timeout.as_str(), "timeout");
        assert_eq!(FailureReason::DnsError.as_str(), "dns_error");
        assert_eq!(FailureReason::SslError.to_string(), "ssl_error");
        assert_eq!(FailureReason::ServerError.as_str(), "server_error");
        assert_eq!(
            FailureReason::from_str("connection_error").unwrap(),
            FailureReason::ConnectionError
        );
    }

    #[test]
    fn test_failure_reason_string_form_parses_back() {
        for reason in FailureReason::iter() {
            assert_eq!(FailureReason::from_str(reason.as_str()).unwrap(), reason);
        }
    }

    #[test]
    fn test_only_network_failures_are_transient() {
        let transient: Vec<_> = FailureReason::iter().filter(|r| r.is_transient()).collect();
        assert_eq!(
            transient,
            vec![
                FailureReason::Timeout,
                FailureReason::DnsError,
                FailureReason::ConnectionError
            ]
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = DatabaseError::NotFound {
            entity: "task",
            id: 7,
        };
        assert_eq!(err.to_string(), "task 7 not found");
    }
}
