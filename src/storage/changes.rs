//! Status-change log.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::websites::{website_from_row, WEBSITE_COLUMNS};
use super::{from_millis, parse_enum, to_millis, Storage};
use crate::error_handling::DatabaseError;
use crate::models::{ChangeType, DetectionStatus, RecoveredWebsite, StatusChangeEvent};

fn change_from_row(row: &SqliteRow) -> Result<StatusChangeEvent, DatabaseError> {
    let previous: String = row.try_get("previous_status")?;
    let current: String = row.try_get("current_status")?;
    let change_type: String = row.try_get("change_type")?;
    Ok(StatusChangeEvent {
        website_id: row.try_get("website_id")?,
        task_id: row.try_get("task_id")?,
        previous_status: parse_enum(&previous, "previous_status")?,
        current_status: parse_enum(&current, "current_status")?,
        change_type: parse_enum(&change_type, "change_type")?,
        previous_record_id: row.try_get("previous_record_id")?,
        current_record_id: row.try_get("current_record_id")?,
        detected_at: from_millis(row.try_get("detected_at_ms")?)?,
    })
}

impl Storage {
    pub async fn save_status_changes(&self, events: &[StatusChangeEvent]) -> Result<(), DatabaseError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await.map_err(DatabaseError::SqlError)?;
        for event in events {
            sqlx::query(
                "INSERT INTO status_changes
                 (website_id, task_id, previous_status, current_status, change_type,
                  previous_record_id, current_record_id, detected_at_ms)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(event.website_id)
            .bind(event.task_id)
            .bind(event.previous_status.as_str())
            .bind(event.current_status.as_str())
            .bind(event.change_type.as_str())
            .bind(event.previous_record_id)
            .bind(event.current_record_id)
            .bind(to_millis(event.detected_at))
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::SqlError)?;
        }
        tx.commit().await.map_err(DatabaseError::SqlError)?;
        Ok(())
    }

    /// Changes detected at or after `since`, newest first.
    pub async fn recent_status_changes(
        &self,
        task_id: Option<i64>,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StatusChangeEvent>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT website_id, task_id, previous_status, current_status, change_type,
                    previous_record_id, current_record_id, detected_at_ms
             FROM status_changes
             WHERE (? IS NULL OR task_id = ?) AND detected_at_ms >= ?
             ORDER BY detected_at_ms DESC, id DESC
             LIMIT ?",
        )
        .bind(task_id)
        .bind(task_id)
        .bind(to_millis(since))
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
        rows.iter().map(change_from_row).collect()
    }

    /// Websites of `parent_task_id` that became accessible at or after
    /// `since`. One entry per website, carrying its newest recovery.
    pub async fn recovered_websites(
        &self,
        parent_task_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecoveredWebsite>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {WEBSITE_COLUMNS}, sc.detected_at_ms AS recovered_at_ms,
                    sc.current_status AS current_status
             FROM status_changes sc
             JOIN websites w ON w.id = sc.website_id
             WHERE sc.task_id = ? AND sc.change_type = ? AND sc.detected_at_ms >= ?
             ORDER BY sc.detected_at_ms DESC, sc.id DESC"
        ))
        .bind(parent_task_id)
        .bind(ChangeType::BecameAccessible.as_str())
        .bind(to_millis(since))
        .fetch_all(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;

        let mut seen = HashSet::new();
        let mut recovered = Vec::new();
        for row in &rows {
            let website = website_from_row(row)?;
            if !seen.insert(website.id) {
                continue;
            }
            let status: String = row.try_get("current_status")?;
            recovered.push(RecoveredWebsite {
                website,
                recovered_at: from_millis(row.try_get("recovered_at_ms")?)?,
                current_status: parse_enum::<DetectionStatus>(&status, "current_status")?,
            });
        }
        Ok(recovered)
    }
}
