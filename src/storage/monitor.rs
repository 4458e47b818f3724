//! Failed-site monitor tasks and their watch lists.

use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::tasks::{clear, finish, mark_running, set_schedule};
use super::websites::{website_from_row, WEBSITE_COLUMNS};
use super::{duration_to_secs, opt_from_millis, secs_to_duration, to_millis, JobTable, Storage};
use crate::config::MonitorDefaults;
use crate::error_handling::DatabaseError;
use crate::models::{FailedSiteMonitorTask, Website};

const MONITOR_COLUMNS: &str = "id, parent_task_id, name, interval_secs, max_concurrency, \
     timeout_secs, retry_count, is_active, is_running, last_run_at_ms, next_run_at_ms";

fn monitor_from_row(row: &SqliteRow) -> Result<FailedSiteMonitorTask, DatabaseError> {
    Ok(FailedSiteMonitorTask {
        id: row.try_get("id")?,
        parent_task_id: row.try_get("parent_task_id")?,
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
    /// Returns the parent's monitor, creating it with `defaults` if missing.
    /// A new monitor is active only if its parent is. The flag is `true`
    /// when the monitor was created by this call.
    pub async fn upsert_monitor(
        &self,
        parent_task_id: i64,
        defaults: &MonitorDefaults,
    ) -> Result<(FailedSiteMonitorTask, bool), DatabaseError> {
        if let Some(existing) = self.monitor_for_parent(parent_task_id).await? {
            return Ok((existing, false));
        }
        let parent = self.load_task(parent_task_id).await?;
        let first_run = Utc::now()
            + chrono::Duration::from_std(defaults.interval).unwrap_or(chrono::Duration::hours(2));

        let done = sqlx::query(
            "INSERT OR IGNORE INTO failed_site_monitors
             (parent_task_id, name, interval_secs, max_concurrency, timeout_secs, retry_count,
              is_active, next_run_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(parent_task_id)
        .bind(format!("{} (failed sites)", parent.name))
        .bind(duration_to_secs(defaults.interval))
        .bind(i64::try_from(defaults.max_concurrency).unwrap_or(i64::MAX))
        .bind(duration_to_secs(defaults.timeout))
        .bind(i64::from(defaults.retry_count))
        .bind(parent.is_active)
        .bind(to_millis(first_run))
        .execute(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;

        // Zero rows means another caller created it first
        let created = done.rows_affected() == 1;
        let monitor = self
            .monitor_for_parent(parent_task_id)
            .await?
            .ok_or(DatabaseError::NotFound {
                entity: "monitor for task",
                id: parent_task_id,
            })?;
        if created {
            info!(
                "Created failed-site monitor {} for task {parent_task_id}",
                monitor.id
            );
        }
        Ok((monitor, created))
    }

    pub async fn load_monitor(&self, id: i64) -> Result<FailedSiteMonitorTask, DatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {MONITOR_COLUMNS} FROM failed_site_monitors WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?
        .ok_or(DatabaseError::NotFound {
            entity: "monitor",
            id,
        })?;
        monitor_from_row(&row)
    }

    pub async fn monitor_for_parent(
        &self,
        parent_task_id: i64,
    ) -> Result<Option<FailedSiteMonitorTask>, DatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {MONITOR_COLUMNS} FROM failed_site_monitors WHERE parent_task_id = ?"
        ))
        .bind(parent_task_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
        row.as_ref().map(monitor_from_row).transpose()
    }

    pub async fn list_active_monitors(&self) -> Result<Vec<FailedSiteMonitorTask>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {MONITOR_COLUMNS} FROM failed_site_monitors WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
        rows.iter().map(monitor_from_row).collect()
    }

    /// Replaces the whole watch list in one transaction.
    pub async fn replace_monitor_websites(
        &self,
        monitor_id: i64,
        website_ids: &[i64],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool().begin().await.map_err(DatabaseError::SqlError)?;
        sqlx::query("DELETE FROM failed_site_monitor_websites WHERE monitor_id = ?")
            .bind(monitor_id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::SqlError)?;
        for &website_id in website_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO failed_site_monitor_websites (monitor_id, website_id)
                 VALUES (?, ?)",
            )
            .bind(monitor_id)
            .bind(website_id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::SqlError)?;
        }
        tx.commit().await.map_err(DatabaseError::SqlError)?;
        debug!(
            "Monitor {monitor_id} now watches {} website(s)",
            website_ids.len()
        );
        Ok(())
    }

    /// Active websites on a monitor's watch list, in id order.
    pub async fn monitor_websites(&self, monitor_id: i64) -> Result<Vec<Website>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {WEBSITE_COLUMNS}
             FROM websites w
             JOIN failed_site_monitor_websites mw ON mw.website_id = w.id
             WHERE mw.monitor_id = ? AND w.is_active = 1
             ORDER BY w.id"
        ))
        .bind(monitor_id)
        .fetch_all(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
        rows.iter().map(website_from_row).collect()
    }

    pub async fn set_monitor_schedule(
        &self,
        id: i64,
        active: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<FailedSiteMonitorTask, DatabaseError> {
        set_schedule(self, JobTable::Monitors, id, active, None, next_run_at).await?;
        self.load_monitor(id).await
    }

    pub async fn try_mark_monitor_running(&self, id: i64) -> Result<bool, DatabaseError> {
        mark_running(self, JobTable::Monitors, id).await
    }

    pub async fn finish_monitor_run(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        finish(self, JobTable::Monitors, id, completed_at, next_run_at).await
    }

    pub async fn clear_monitor_running(&self, id: i64) -> Result<(), DatabaseError> {
        clear(self, JobTable::Monitors, id).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::NewTask;

    async fn parent(storage: &Storage) -> i64 {
        storage
            .create_task(&NewTask {
                name: "main".to_string(),
                interval: Duration::from_secs(6 * 3600),
                max_concurrency: 10,
                timeout: Duration::from_secs(30),
                retry_count: 3,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_upsert_creates_once() {
        let storage = Storage::in_memory().await.unwrap();
        let parent_id = parent(&storage).await;
        storage
            .set_task_schedule(parent_id, true, None, Some(Utc::now()))
            .await
            .unwrap();
        let defaults = MonitorDefaults::default();

        let (monitor, created) = storage.upsert_monitor(parent_id, &defaults).await.unwrap();
        assert!(created);
        assert_eq!(monitor.parent_task_id, parent_id);
        assert_eq!(monitor.interval, defaults.interval);
        assert_eq!(monitor.name, "main (failed sites)");
        assert!(monitor.is_active);
        assert!(monitor.next_run_at.unwrap() > Utc::now());

        let (again, created) = storage.upsert_monitor(parent_id, &defaults).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, monitor.id);
        assert_eq!(storage.list_active_monitors().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watch_list_is_replaced() {
        let storage = Storage::in_memory().await.unwrap();
        let parent_id = parent(&storage).await;
        let (monitor, _) = storage
            .upsert_monitor(parent_id, &MonitorDefaults::default())
            .await
            .unwrap();
        let a = storage.add_website("a", "a.test").await.unwrap();
        let b = storage.add_website("b", "b.test").await.unwrap();

        storage.replace_monitor_websites(monitor.id, &[a.id, b.id]).await.unwrap();
        assert_eq!(storage.monitor_websites(monitor.id).await.unwrap().len(), 2);

        storage.replace_monitor_websites(monitor.id, &[b.id]).await.unwrap();
        assert_eq!(storage.monitor_websites(monitor.id).await.unwrap(), vec![b]);

        storage.replace_monitor_websites(monitor.id, &[]).await.unwrap();
        assert!(storage.monitor_websites(monitor.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_running_flag() {
        let storage = Storage::in_memory().await.unwrap();
        let parent_id = parent(&storage).await;
        let (monitor, _) = storage
            .upsert_monitor(parent_id, &MonitorDefaults::default())
            .await
            .unwrap();
        assert!(storage.try_mark_monitor_running(monitor.id).await.unwrap());
        assert!(!storage.try_mark_monitor_running(monitor.id).await.unwrap());
        // The parent task flag is independent
        assert!(storage.try_mark_running(parent_id).await.unwrap());

        let now = Utc::now();
        storage
            .finish_monitor_run(monitor.id, now, now + chrono::Duration::hours(2))
            .await
            .unwrap();
        let monitor = storage.load_monitor(monitor.id).await.unwrap();
        assert!(!monitor.is_running);
        assert!(monitor.last_run_at.is_some());

        let paused = storage.set_monitor_schedule(monitor.id, false, None).await.unwrap();
        assert!(!paused.is_active);
        assert!(storage.list_active_monitors().await.unwrap().is_empty());
    }
}
