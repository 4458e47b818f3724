//! Status-change detection.
//!
//! Each freshly saved record is compared with the record immediately before
//! it for the same website and task. A website's first record only
//! establishes a baseline.

use log::{debug, info};

use crate::error_handling::DatabaseError;
use crate::models::{ChangeType, DetectionRecord, DetectionStatus, StatusChangeEvent};
use crate::storage::Storage;

/// Transition between two consecutive statuses, if any.
///
/// Accessibility changes take priority over raw status changes.
pub fn classify_transition(previous: DetectionStatus, current: DetectionStatus) -> Option<ChangeType> {
    match (previous.is_accessible(), current.is_accessible()) {
        (false, true) => Some(ChangeType::BecameAccessible),
        (true, false) => Some(ChangeType::BecameFailed),
        _ if previous != current => Some(ChangeType::StatusChanged),
        _ => None,
    }
}

/// Finds the transitions introduced by `new_records`.
///
/// Events are returned, not persisted.
pub async fn detect_changes(
    storage: &Storage,
    task_id: i64,
    new_records: &[DetectionRecord],
) -> Result<Vec<StatusChangeEvent>, DatabaseError> {
    let mut events = Vec::new();
    for record in new_records.iter().filter(|r| r.task_id == task_id) {
        let Some(previous) = storage.previous_record(record).await? else {
            debug!("Website {} has no earlier record; baseline only", record.website_id);
            continue;
        };
        if let Some(change_type) = classify_transition(previous.status, record.status) {
            events.push(StatusChangeEvent {
                website_id: record.website_id,
                task_id,
                previous_status: previous.status,
                current_status: record.status,
                change_type,
                previous_record_id: previous.id,
                current_record_id: record.id,
                detected_at: record.detected_at,
            });
        }
    }
    if !events.is_empty() {
        info!("Task {task_id}: {} status change(s)", events.len());
    }
    Ok(events)
}
