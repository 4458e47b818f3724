//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, limits, thresholds)
//! - Typed configuration structs with validation
//! - CLI option types and parsing

mod cli;
mod constants;
mod types;

pub use cli::{Cli, Command};
pub use constants::*;
pub use types::{Config, DetectorConfig, LogFormat, LogLevel, MonitorDefaults, SchedulerConfig};
