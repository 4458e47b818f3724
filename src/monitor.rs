//! Failed-site monitoring.
//!
//! A parent task's monitor watches exactly the parent's websites whose latest
//! record is `failed`. The watch list is recomputed and replaced wholesale
//! after every parent run and after every monitor run.

use std::collections::HashMap;

use log::info;

use crate::config::MonitorDefaults;
use crate::error_handling::DatabaseError;
use crate::models::{ChangeType, FailedSiteMonitorTask, RecoveredWebsite, StatusChangeEvent, Website};
use crate::storage::Storage;

/// Ensures the parent has a monitor and resets its watch list to the
/// currently failed websites.
pub async fn refresh_watch_list(
    storage: &Storage,
    parent_task_id: i64,
    defaults: &MonitorDefaults,
) -> Result<(FailedSiteMonitorTask, Vec<Website>), DatabaseError> {
    let (monitor, _) = storage.upsert_monitor(parent_task_id, defaults).await?;
    let failed = storage.failed_websites(parent_task_id).await?;
    let ids: Vec<i64> = failed.iter().map(|w| w.id).collect();
    storage.replace_monitor_websites(monitor.id, &ids).await?;
    info!(
        "Monitor {} for task {parent_task_id} watches {} failed website(s)",
        monitor.id,
        failed.len()
    );
    Ok((monitor, failed))
}

/// Websites among `watched` that the given events show coming back.
pub fn recovered_from_events(events: &[StatusChangeEvent], watched: &[Website]) -> Vec<RecoveredWebsite> {
    let by_id: HashMap<i64, &Website> = watched.iter().map(|w| (w.id, w)).collect();
    events
        .iter()
        .filter(|e| e.change_type == ChangeType::BecameAccessible)
        .filter_map(|e| {
            by_id.get(&e.website_id).map(|website| RecoveredWebsite {
                website: (*website).clone(),
                recovered_at: e.detected_at,
                current_status: e.current_status,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::models::{DetectionStatus, NewDetectionRecord, NewTask};

    fn site(id: i64) -> Website {
        Website {
            id,
            name: format!("site {id}"),
            url: format!("site{id}.test"),
            normalized_url: format!("http://site{id}.test"),
            domain: format!("site{id}.test"),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn change(website_id: i64, change_type: ChangeType) -> StatusChangeEvent {
        StatusChangeEvent {
            website_id,
            task_id: 1,
            previous_status: DetectionStatus::Failed,
            current_status: DetectionStatus::Redirected,
            change_type,
            previous_record_id: 1,
            current_record_id: 2,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_recovered_only_counts_watched_sites() {
        let watched = vec![site(1), site(2)];
        let events = vec![
            change(1, ChangeType::BecameAccessible),
            change(2, ChangeType::StatusChanged),
            change(3, ChangeType::BecameAccessible),
        ];
        let recovered = recovered_from_events(&events, &watched);
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].website.id, 1);
        assert_eq!(recovered[0].current_status, DetectionStatus::Redirected);
    }

    #[tokio::test]
    async fn test_refresh_replaces_watch_list() {
        let storage = Storage::in_memory().await.unwrap();
        let task = storage
            .create_task(&NewTask {
                name: "main".to_string(),
                interval: Duration::from_secs(3600),
                max_concurrency: 4,
                timeout: Duration::from_secs(10),
                retry_count: 1,
            })
            .await
            .unwrap();
        let up = storage.add_website("up", "up.test").await.unwrap();
        let down = storage.add_website("down", "down.test").await.unwrap();
        storage.assign_websites(task.id, &[up.id, down.id]).await.unwrap();

        let record = |website_id: i64, status: DetectionStatus| NewDetectionRecord {
            task_id: task.id,
            website_id,
            status,
            response_time: None,
            http_status_code: None,
            final_url: None,
            error_message: None,
            failure_reason: None,
            retry_count_used: 0,
            detected_at: Utc::now(),
        };
        storage
            .save_records(&[
                record(up.id, DetectionStatus::Standard),
                record(down.id, DetectionStatus::Failed),
            ])
            .await
            .unwrap();

        let defaults = MonitorDefaults::default();
        let (monitor, failed) = refresh_watch_list(&storage, task.id, &defaults).await.unwrap();
        assert_eq!(failed, vec![down.clone()]);
        assert_eq!(storage.monitor_websites(monitor.id).await.unwrap(), vec![down.clone()]);

        storage
            .save_records(&[record(down.id, DetectionStatus::Standard)])
            .await
            .unwrap();
        let (same, failed) = refresh_watch_list(&storage, task.id, &defaults).await.unwrap();
        assert_eq!(same.id, monitor.id);
        assert!(failed.is_empty());
        assert!(storage.monitor_websites(monitor.id).await.unwrap().is_empty());
    }
}
