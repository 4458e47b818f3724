//! Detection tasks, their websites and the running/schedule columns.
//!
//! The `is_running` flag is the cross-process mutual-exclusion guard. It is
//! only ever set through a conditional `UPDATE ... WHERE is_running = 0`, so
//! at most one caller observes a successful transition.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::websites::{website_from_row, WEBSITE_COLUMNS};
use super::{duration_to_secs, opt_from_millis, secs_to_duration, to_millis, JobTable, Storage};
use crate::error_handling::DatabaseError;
use crate::models::{validate_interval, DetectionTask, NewTask, Website};

const TASK_COLUMNS: &str = "id, name, interval_secs, max_concurrency, timeout_secs, retry_count, \
     is_active, is_running, last_run_at_ms, next_run_at_ms";

fn task_from_row(row: &SqliteRow) -> Result<DetectionTask, DatabaseError> {
    Ok(DetectionTask {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        interval: secs_to_duration(row.try_get("interval_secs")?)?,
        max_concurrency: usize::try_from(row.try_get::<i64, _>("max_concurrency")?).unwrap_or(1),
        timeout: secs_to_duration(row.try_get("timeout_secs")?)?,
        retry_count: u32::try_from(row.try_get::<i64, _>("retry_count")?).unwrap_or(0),
        is_active: row.try_get("is_active")?,
        is_running: row.try_get("is_running")?,
        last_run_at: opt_from_millis(row.try_get("last_run_at_ms")?)?,
        next_run_at: opt_from_millis(row.try_get("next_run_at_ms")?)?,
    })
}

impl Storage {
    /// Creates an inactive task; `start` activates it. Parameters are
    /// validated first and nothing is stored when they are out of range.
    pub async fn create_task(&self, task: &NewTask) -> Result<DetectionTask, DatabaseError> {
        task.validate()?;
        let done = sqlx::query(
            "INSERT INTO detection_tasks (name, interval_secs, max_concurrency, timeout_secs, retry_count)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&task.name)
        .bind(duration_to_secs(task.interval))
        .bind(i64::try_from(task.max_concurrency).unwrap_or(i64::MAX))
        .bind(duration_to_secs(task.timeout))
        .bind(i64::from(task.retry_count))
        .execute(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;

        let id = done.last_insert_rowid();
        info!("Created detection task {id} ({})", task.name);
        self.load_task(id).await
    }

    pub async fn load_task(&self, id: i64) -> Result<DetectionTask, DatabaseError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM detection_tasks WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(DatabaseError::SqlError)?
            .ok_or(DatabaseError::NotFound { entity: "task", id })?;
        task_from_row(&row)
    }

    pub async fn list_tasks(&self) -> Result<Vec<DetectionTask>, DatabaseError> {
        let rows = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM detection_tasks ORDER BY id"))
            .fetch_all(self.pool())
            .await
            .map_err(DatabaseError::SqlError)?;
        rows.iter().map(task_from_row).collect()
    }

    pub async fn list_active_tasks(&self) -> Result<Vec<DetectionTask>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM detection_tasks WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
        rows.iter().map(task_from_row).collect()
    }

    /// Adds websites to a task. Already-assigned ids are ignored.
    pub async fn assign_websites(&self, task_id: i64, website_ids: &[i64]) -> Result<(), DatabaseError> {
        self.load_task(task_id).await?;
        for &website_id in website_ids {
            self.get_website(website_id).await?;
        }

        let mut tx = self.pool().begin().await.map_err(DatabaseError::SqlError)?;
        for &website_id in website_ids {
            sqlx::query("INSERT OR IGNORE INTO task_websites (task_id, website_id) VALUES (?, ?)")
                .bind(task_id)
                .bind(website_id)
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::SqlError)?;
        }
        tx.commit().await.map_err(DatabaseError::SqlError)?;
        debug!("Assigned {} website(s) to task {task_id}", website_ids.len());
        Ok(())
    }

    /// Active websites of a task, in id order.
    pub async fn list_active_websites(&self, task_id: i64) -> Result<Vec<Website>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {WEBSITE_COLUMNS}
             FROM websites w
             JOIN task_websites tw ON tw.website_id = w.id
             WHERE tw.task_id = ? AND w.is_active = 1
             ORDER BY w.id"
        ))
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
        rows.iter().map(website_from_row).collect()
    }

    /// Activates or deactivates a task's schedule. `interval` is left as is
    /// when `None`.
    pub async fn set_task_schedule(
        &self,
        id: i64,
        active: bool,
        interval: Option<Duration>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<DetectionTask, DatabaseError> {
        if let Some(interval) = interval {
            validate_interval(interval)?;
        }
        set_schedule(self, JobTable::Tasks, id, active, interval, next_run_at).await?;
        self.load_task(id).await
    }

    /// Atomically sets `is_running`. Returns `false` if the task is already
    /// running (or does not exist).
    pub async fn try_mark_running(&self, id: i64) -> Result<bool, DatabaseError> {
        mark_running(self, JobTable::Tasks, id).await
    }

    /// Clears `is_running` and records the completed run.
    pub async fn finish_run(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        finish(self, JobTable::Tasks, id, completed_at, next_run_at).await
    }

    /// Clears `is_running` without touching the schedule.
    pub async fn clear_running(&self, id: i64) -> Result<(), DatabaseError> {
        clear(self, JobTable::Tasks, id).await
    }

    /// Clears every `is_running` flag left behind by a previous process.
    pub async fn reset_stale_running(&self) -> Result<u64, DatabaseError> {
        let mut cleared = 0;
        for table in [JobTable::Tasks, JobTable::Monitors] {
            let done = sqlx::query(&format!(
                "UPDATE {} SET is_running = 0 WHERE is_running = 1",
                table.name()
            ))
            .execute(self.pool())
            .await
            .map_err(DatabaseError::SqlError)?;
            cleared += done.rows_affected();
        }
        if cleared > 0 {
            warn!("Reset {cleared} stale running flag(s)");
        }
        Ok(cleared)
    }
}

pub(super) async fn set_schedule(
    storage: &Storage,
    table: JobTable,
    id: i64,
    active: bool,
    interval: Option<Duration>,
    next_run_at: Option<DateTime<Utc>>,
) -> Result<(), DatabaseError> {
    let done = sqlx::query(&format!(
        "UPDATE {} SET is_active = ?, interval_secs = COALESCE(?, interval_secs), next_run_at_ms = ?
         WHERE id = ?",
        table.name()
    ))
    .bind(active)
    .bind(interval.map(duration_to_secs))
    .bind(next_run_at.map(to_millis))
    .bind(id)
    .execute(storage.pool())
    .await
    .map_err(DatabaseError::SqlError)?;
    if done.rows_affected() == 0 {
        return Err(not_found(table, id));
    }
    Ok(())
}

pub(super) async fn mark_running(storage: &Storage, table: JobTable, id: i64) -> Result<bool, DatabaseError> {
    let done = sqlx::query(&format!(
        "UPDATE {} SET is_running = 1 WHERE id = ? AND is_running = 0",
        table.name()
    ))
    .bind(id)
    .execute(storage.pool())
    .await
    .map_err(DatabaseError::SqlError)?;
    Ok(done.rows_affected() == 1)
}

pub(super) async fn finish(
    storage: &Storage,
    table: JobTable,
    id: i64,
    completed_at: DateTime<Utc>,
    next_run_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    sqlx::query(&format!(
        "UPDATE {} SET is_running = 0, last_run_at_ms = ?, next_run_at_ms = ? WHERE id = ?",
        table.name()
    ))
    .bind(to_millis(completed_at))
    .bind(to_millis(next_run_at))
    .bind(id)
    .execute(storage.pool())
    .await
    .map_err(DatabaseError::SqlError)?;
    Ok(())
}

pub(super) async fn clear(storage: &Storage, table: JobTable, id: i64) -> Result<(), DatabaseError> {
    sqlx::query(&format!("UPDATE {} SET is_running = 0 WHERE id = ?", table.name()))
        .bind(id)
        .execute(storage.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
    Ok(())
}

fn not_found(table: JobTable, id: i64) -> DatabaseError {
    let entity = match table {
        JobTable::Tasks => "task",
        JobTable::Monitors => "monitor",
    };
    DatabaseError::NotFound { entity, id }
}
