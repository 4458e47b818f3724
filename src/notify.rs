//! Status-change notification.
//!
//! Delivery is fire-and-forget: [`dispatch`] hands events to a detached task
//! and returns immediately. Notifier errors are logged, never propagated.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};

use crate::models::{ChangeType, StatusChangeEvent};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, events: &[StatusChangeEvent]) -> anyhow::Result<()>;
}

/// Writes one log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, events: &[StatusChangeEvent]) -> anyhow::Result<()> {
        for event in events {
            let line = format!(
                "Website {} (task {}): {} -> {} [{}]",
                event.website_id,
                event.task_id,
                event.previous_status,
                event.current_status,
                event.change_type
            );
            match event.change_type {
                ChangeType::BecameFailed => warn!("{line}"),
                _ => info!("{line}"),
            }
        }
        Ok(())
    }
}

/// Sends `events` on a detached task. Empty lists are dropped.
pub fn dispatch(notifier: Arc<dyn Notifier>, events: Vec<StatusChangeEvent>) {
    if events.is_empty() {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&events).await {
            error!("Failed to deliver {} status change(s): {e:#}", events.len());
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::models::DetectionStatus;

    struct Recording(Mutex<Vec<StatusChangeEvent>>);

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, events: &[StatusChangeEvent]) -> anyhow::Result<()> {
            self.0.lock().unwrap().extend_from_slice(events);
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Notifier for Broken {
        async fn notify(&self, _events: &[StatusChangeEvent]) -> anyhow::Result<()> {
            anyhow::bail!("smtp unreachable")
        }
    }

    fn event() -> StatusChangeEvent {
        StatusChangeEvent {
            website_id: 1,
            task_id: 1,
            previous_status: DetectionStatus::Standard,
            current_status: DetectionStatus::Failed,
            change_type: ChangeType::BecameFailed,
            previous_record_id: 1,
            current_record_id: 2,
            detected_at: Utc::now(),
        }
    }

    async fn wait_for(recording: &Recording, len: usize) {
        for _ in 0..100 {
            if recording.0.lock().unwrap().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        dispatch(recording.clone(), vec![event(), event()]);
        wait_for(&recording, 2).await;
        assert_eq!(recording.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_notifier_errors_are_contained() {
        dispatch(Arc::new(Broken), vec![event()]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(LogNotifier.notify(&[event()]).await.is_ok());
    }
}
