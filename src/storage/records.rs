//! Append-only detection history.

use log::debug;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::websites::{website_from_row, WEBSITE_COLUMNS};
use super::{from_millis, parse_enum, to_millis, Storage};
use crate::error_handling::{DatabaseError, FailureReason};
use crate::models::{AccessibilitySummary, DetectionRecord, DetectionStatus, NewDetectionRecord, Website};

const RECORD_COLUMNS: &str = "id, task_id, website_id, status, response_time, http_status_code, \
     final_url, error_message, failure_reason, retry_count_used, detected_at_ms";

fn record_from_row(row: &SqliteRow) -> Result<DetectionRecord, DatabaseError> {
    let status: String = row.try_get("status")?;
    let failure_reason: Option<String> = row.try_get("failure_reason")?;
    let http_status_code: Option<i64> = row.try_get("http_status_code")?;
    Ok(DetectionRecord {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        website_id: row.try_get("website_id")?,
        status: parse_enum::<DetectionStatus>(&status, "status")?,
        response_time: row.try_get("response_time")?,
        http_status_code: http_status_code.and_then(|code| u16::try_from(code).ok()),
        final_url: row.try_get("final_url")?,
        error_message: row.try_get("error_message")?,
        failure_reason: failure_reason
            .as_deref()
            .map(|reason| parse_enum::<FailureReason>(reason, "failure_reason"))
            .transpose()?,
        retry_count_used: u32::try_from(row.try_get::<i64, _>("retry_count_used")?).unwrap_or(0),
        detected_at: from_millis(row.try_get("detected_at_ms")?)?,
    })
}

impl Storage {
    /// Persists one cycle's records in a single transaction and returns them
    /// with their ids.
    pub async fn save_records(
        &self,
        records: &[NewDetectionRecord],
    ) -> Result<Vec<DetectionRecord>, DatabaseError> {
        let mut tx = self.pool().begin().await.map_err(DatabaseError::SqlError)?;
        let mut saved = Vec::with_capacity(records.len());

        for record in records {
            let done = sqlx::query(
                "INSERT INTO detection_records
                 (task_id, website_id, status, response_time, http_status_code, final_url,
                  error_message, failure_reason, retry_count_used, detected_at_ms)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.task_id)
            .bind(record.website_id)
            .bind(record.status.as_str())
            .bind(record.response_time)
            .bind(record.http_status_code.map(i64::from))
            .bind(record.final_url.as_deref())
            .bind(record.error_message.as_deref())
            .bind(record.failure_reason.map(|reason| reason.as_str()))
            .bind(i64::from(record.retry_count_used))
            .bind(to_millis(record.detected_at))
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::SqlError)?;

            saved.push(DetectionRecord {
                id: done.last_insert_rowid(),
                task_id: record.task_id,
                website_id: record.website_id,
                status: record.status,
                response_time: record.response_time,
                http_status_code: record.http_status_code,
                final_url: record.final_url.clone(),
                error_message: record.error_message.clone(),
                failure_reason: record.failure_reason,
                retry_count_used: record.retry_count_used,
                detected_at: record.detected_at,
            });
        }

        tx.commit().await.map_err(DatabaseError::SqlError)?;
        debug!("Saved {} detection record(s)", saved.len());
        Ok(saved)
    }

    /// Newest record of a website under a task.
    pub async fn latest_record(
        &self,
        website_id: i64,
        task_id: i64,
    ) -> Result<Option<DetectionRecord>, DatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM detection_records
             WHERE website_id = ? AND task_id = ?
             ORDER BY detected_at_ms DESC, id DESC
             LIMIT 1"
        ))
        .bind(website_id)
        .bind(task_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// The record immediately before `record` for the same website and task.
    /// Ties on `detected_at` are broken by id.
    pub async fn previous_record(
        &self,
        record: &DetectionRecord,
    ) -> Result<Option<DetectionRecord>, DatabaseError> {
        let detected_at_ms = to_millis(record.detected_at);
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM detection_records
             WHERE website_id = ? AND task_id = ?
               AND (detected_at_ms < ? OR (detected_at_ms = ? AND id < ?))
             ORDER BY detected_at_ms DESC, id DESC
             LIMIT 1"
        ))
        .bind(record.website_id)
        .bind(record.task_id)
        .bind(detected_at_ms)
        .bind(detected_at_ms)
        .bind(record.id)
        .fetch_optional(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// Active websites of a task whose most recent record is `failed`.
    pub async fn failed_websites(&self, task_id: i64) -> Result<Vec<Website>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {WEBSITE_COLUMNS}
             FROM websites w
             JOIN task_websites tw ON tw.website_id = w.id
             WHERE tw.task_id = ? AND w.is_active = 1
               AND (SELECT r.status FROM detection_records r
                    WHERE r.website_id = w.id AND r.task_id = ?
                    ORDER BY r.detected_at_ms DESC, r.id DESC
                    LIMIT 1) = 'failed'
             ORDER BY w.id"
        ))
        .bind(task_id)
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;
        rows.iter().map(website_from_row).collect()
    }

    /// Counts over each website's latest record, optionally within one task.
    pub async fn accessibility_summary(
        &self,
        task_id: Option<i64>,
    ) -> Result<AccessibilitySummary, DatabaseError> {
        let rows = sqlx::query(
            "SELECT r.status AS status, COUNT(*) AS n
             FROM detection_records r
             WHERE (? IS NULL OR r.task_id = ?)
               AND r.id = (SELECT r2.id FROM detection_records r2
                           WHERE r2.website_id = r.website_id
                             AND (? IS NULL OR r2.task_id = ?)
                           ORDER BY r2.detected_at_ms DESC, r2.id DESC
                           LIMIT 1)
             GROUP BY r.status",
        )
        .bind(task_id)
        .bind(task_id)
        .bind(task_id)
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DatabaseError::SqlError)?;

        let (mut standard, mut redirected, mut failed) = (0u64, 0u64, 0u64);
        for row in &rows {
            let status: String = row.try_get("status")?;
            let count = u64::try_from(row.try_get::<i64, _>("n")?).unwrap_or(0);
            match parse_enum::<DetectionStatus>(&status, "status")? {
                DetectionStatus::Standard => standard = count,
                DetectionStatus::Redirected => redirected = count,
                DetectionStatus::Failed => failed = count,
            }
        }
        Ok(AccessibilitySummary::from_counts(standard, redirected, failed))
    }
}
