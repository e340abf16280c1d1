use std::sync::Arc;

use sentrypost_providers::NotificationSink;
use sentrypost_storage::CheckinLog;

use crate::types::OpsResult;

/// The single gate every operator notification in this crate flows
/// through: dedup via `CheckinLog::should_send`, urgency-prefixed send
/// via `NotificationSink`, then `record_sent` — but only once the send
/// actually succeeds: don't log a notification as sent if it wasn't.
#[derive(Clone)]
pub struct Notifier {
    checkin: Arc<CheckinLog>,
    sink: Option<Arc<dyn NotificationSink>>,
}

impl Notifier {
    pub fn new(checkin: Arc<CheckinLog>, sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self { checkin, sink }
    }

    pub async fn notify(&self, message: &str, topic: &str, action_type: &str) -> OpsResult<()> {
        let Some((_, text)) = self.checkin.should_send(message, topic, action_type).await? else {
            tracing::debug!(topic, "notification suppressed by dedup/urgency gate");
            return Ok(());
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.notify(&text).await {
                tracing::error!(error = %e, "failed to send notification");
                return Ok(());
            }
        }

        self.checkin.record_sent(topic, message, action_type, "").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrypost_providers::mock::MockNotificationSink;
    use tempfile::TempDir;

    #[tokio::test]
    async fn duplicate_notification_sent_once() {
        let dir = TempDir::new().unwrap();
        let checkin = Arc::new(CheckinLog::open(&dir.path().join("checkin.db")).await.unwrap());
        let sink = Arc::new(MockNotificationSink::default());
        let notifier = Notifier::new(checkin, Some(sink.clone()));

        notifier.notify("all clear", "schedule", "notify").await.unwrap();
        notifier.notify("all clear", "schedule", "notify").await.unwrap();

        assert_eq!(sink.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn progress_message_is_never_sent() {
        let dir = TempDir::new().unwrap();
        let checkin = Arc::new(CheckinLog::open(&dir.path().join("checkin.db")).await.unwrap());
        let sink = Arc::new(MockNotificationSink::default());
        let notifier = Notifier::new(checkin, Some(sink.clone()));

        notifier.notify("Rendering video...", "render", "progress").await.unwrap();
        assert!(sink.sent.lock().await.is_empty());
    }
}
