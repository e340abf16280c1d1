use std::path::{Path, PathBuf};
use std::sync::Arc;

use sentrypost_storage::KillSwitch;
use sentrypost_types::AuditSeverity;
use serde_json::Value;

use crate::handlers::Handlers;
use crate::types::OpsResult;

/// Polls `data/content_feedback/` for dashboard-written JSON action files
/// and routes them by filename prefix. Every file is removed
/// unconditionally after being processed, whether that processing
/// succeeded, failed, or the file turned out to be malformed or
/// unrecognized.
pub struct InboxPoller {
    dir: PathBuf,
    handlers: Handlers,
    kill_switch: Arc<KillSwitch>,
}

impl InboxPoller {
    pub fn new(dir: impl Into<PathBuf>, handlers: Handlers, kill_switch: Arc<KillSwitch>) -> Self {
        Self {
            dir: dir.into(),
            handlers,
            kill_switch,
        }
    }

    pub async fn poll_once(&self) -> OpsResult<usize> {
        if self.kill_switch.is_active() {
            return Ok(0);
        }

        if !self.dir.exists() {
            return Ok(0);
        }

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                entries.push(path);
            }
        }
        entries.sort();

        let mut processed = 0usize;
        for path in entries {
            self.process_file(&path).await;
            processed += 1;
        }
        Ok(processed)
    }

    async fn process_file(&self, path: &Path) {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();

        let result = self.dispatch(&name, path).await;

        if let Err(e) = &result {
            tracing::error!(file = %name, error = %e, "error processing action file");
            let _ = self
                .handlers
                .audit
                .log(
                    "operations",
                    AuditSeverity::Reject,
                    "poll",
                    &format!("failed to process {name}"),
                    &e.to_string(),
                    false,
                )
                .await;
        }

        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::error!(file = %name, error = %e, "failed to remove processed action file");
        }
    }

    async fn dispatch(&self, name: &str, path: &Path) -> OpsResult<()> {
        let raw = tokio::fs::read_to_string(path).await?;
        let data: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(file = name, error = %e, "invalid JSON in action file");
                return Ok(());
            }
        };

        if name.starts_with("schedule_") {
            self.handlers.handle_schedule(&data).await?;
        } else if name.starts_with("render_") {
            self.handlers.handle_render(&data).await?;
        } else if name.starts_with("feedback_") {
            self.handlers.handle_feedback(&data).await?;
        } else if name.starts_with("execute_") {
            self.handlers.handle_execute(&data).await?;
        } else {
            tracing::warn!(file = name, "unknown action file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrypost_memory::EventStore;
    use sentrypost_providers::mock::{MockNotificationSink, MockPlatformExecutor};
    use sentrypost_storage::{ApprovalQueue, AuditLog, CheckinLog, ContentScheduler};
    use serde_json::json;
    use tempfile::TempDir;

    use crate::notify::Notifier;

    async fn poller(dir: &TempDir, inbox: &Path) -> InboxPoller {
        let queue = Arc::new(ApprovalQueue::open(&dir.path().join("approvals.db"), 48).await.unwrap());
        let audit = Arc::new(AuditLog::open(&dir.path().join("audit.db")).await.unwrap());
        let scheduler = Arc::new(ContentScheduler::open(&dir.path().join("scheduler.db")).await.unwrap());
        let executor = Arc::new(MockPlatformExecutor::default());
        let events = Arc::new(EventStore::open(&dir.path().join("events.db")).await.unwrap());
        let checkin = Arc::new(CheckinLog::open(&dir.path().join("checkin.db")).await.unwrap());
        let sink = Arc::new(MockNotificationSink::default());
        let kill_switch = Arc::new(KillSwitch::open(&dir.path().join("kill_switch.db")).await.unwrap());

        let handlers = Handlers {
            queue,
            audit,
            scheduler,
            executor,
            events,
            notifier: Notifier::new(checkin, Some(sink)),
        };
        InboxPoller::new(inbox, handlers, kill_switch)
    }

    #[tokio::test]
    async fn malformed_json_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("content_feedback");
        tokio::fs::create_dir_all(&inbox).await.unwrap();
        let file = inbox.join("execute_1_0.json");
        tokio::fs::write(&file, "{not json").await.unwrap();

        let poller = poller(&dir, &inbox).await;
        let processed = poller.poll_once().await.unwrap();
        assert_eq!(processed, 1);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn unknown_prefix_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("content_feedback");
        tokio::fs::create_dir_all(&inbox).await.unwrap();
        let file = inbox.join("mystery_1_0.json");
        tokio::fs::write(&file, "{}").await.unwrap();

        let poller = poller(&dir, &inbox).await;
        poller.poll_once().await.unwrap();
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn kill_switch_active_skips_polling_entirely() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("content_feedback");
        tokio::fs::create_dir_all(&inbox).await.unwrap();
        let file = inbox.join("feedback_1_0.json");
        tokio::fs::write(&file, json!({"reason": "no"}).to_string()).await.unwrap();

        let poller = poller(&dir, &inbox).await;
        poller.kill_switch.activate("testing").await.unwrap();

        let processed = poller.poll_once().await.unwrap();
        assert_eq!(processed, 0);
        assert!(file.exists());
    }

    #[tokio::test]
    async fn execute_file_is_processed_and_removed() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("content_feedback");
        tokio::fs::create_dir_all(&inbox).await.unwrap();
        let poller = poller(&dir, &inbox).await;

        let approval_id = poller
            .handlers
            .queue
            .submit("sentrypost", "ops", "tweet", &json!({"text": "hi"}), "", 0.0)
            .await
            .unwrap();
        poller.handlers.queue.approve(approval_id, "").await.unwrap();

        let file = inbox.join(format!("execute_{approval_id}_0.json"));
        tokio::fs::write(
            &file,
            json!({"approval_id": approval_id, "action_type": "tweet", "action_data": {"text": "hi"}}).to_string(),
        )
        .await
        .unwrap();

        poller.poll_once().await.unwrap();
        assert!(!file.exists());
        let row = poller.handlers.queue.get_by_id(approval_id).await.unwrap().unwrap();
        assert!(row.executed_at.is_some());
    }
}
