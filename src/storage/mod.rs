//! SQLite persistence.
//!
//! [`Storage`] wraps a shared connection pool and exposes the queries the
//! detection pipeline, the scheduler and the failed-site monitor need.
//! Timestamps are stored as UTC epoch milliseconds.

mod changes;
mod migrations;
mod monitor;
mod pool;
mod records;
mod tasks;
mod websites;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error_handling::DatabaseError;

pub use migrations::run_migrations;
pub use pool::{init_db_pool_with_path, init_memory_pool};

/// Handle to the database. Cheap to clone.
#[derive(Clone)]
pub struct Storage {
    pool: Arc<SqlitePool>,
}

impl Storage {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Opens the database file and applies migrations.
    pub async fn open(db_path: &Path) -> Result<Self, DatabaseError> {
        let pool = init_db_pool_with_path(db_path).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// A migrated private in-memory database.
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let pool = init_memory_pool().await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Tables holding schedulable jobs; both share the running/schedule columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobTable {
    Tasks,
    Monitors,
}

impl JobTable {
    fn name(self) -> &'static str {
        match self {
            JobTable::Tasks => "detection_tasks",
            JobTable::Monitors => "failed_site_monitors",
        }
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| DatabaseError::CorruptRow(format!("timestamp out of range: {ms}")))
}

pub(crate) fn opt_from_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    ms.map(from_millis).transpose()
}

pub(crate) fn secs_to_duration(secs: i64) -> Result<Duration, DatabaseError> {
    u64::try_from(secs)
        .map(Duration::from_secs)
        .map_err(|_| DatabaseError::CorruptRow(format!("negative duration: {secs}")))
}

pub(crate) fn duration_to_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn parse_enum<T: std::str::FromStr>(value: &str, column: &str) -> Result<T, DatabaseError> {
    value
        .parse()
        .map_err(|_| DatabaseError::CorruptRow(format!("unexpected {column}: {value}")))
}
