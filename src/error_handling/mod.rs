//! Error handling and processing statistics.
//!
//! This module provides:
//! - Error type definitions and the probe failure taxonomy
//! - Failure categorization for transport errors
//! - Retry backoff configuration
//! - Process-wide failure statistics

mod categorization;
mod stats;
mod types;

pub use categorization::{
    categorize_message, categorize_reqwest_error, error_chain_text, retry_strategy,
};
pub use stats::ProcessingStats;
pub use types::{ConfigError, DatabaseError, FailureReason, InitializationError, SchedulerError};
