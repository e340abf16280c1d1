use std::sync::Arc;

use chrono::{DateTime, Utc};
use sentrypost_memory::EventStore;
use sentrypost_providers::PlatformExecutor;
use sentrypost_storage::{ApprovalQueue, AuditLog, ContentScheduler};
use sentrypost_types::AuditSeverity;
use serde_json::Value;

use crate::notify::Notifier;
use crate::types::OpsResult;

/// Post-approval execution glue shared by the inbox poller and (once
/// registered) the content scheduler's fired jobs.
pub struct Handlers {
    pub queue: Arc<ApprovalQueue>,
    pub audit: Arc<AuditLog>,
    pub scheduler: Arc<ContentScheduler>,
    pub executor: Arc<dyn PlatformExecutor>,
    pub events: Arc<EventStore>,
    pub notifier: Notifier,
}

impl Handlers {
    /// `schedule_*.json` — reads `{approval_id, action_data, platforms,
    /// scheduled_time, content_type}`, schedules via `ContentScheduler`,
    /// and immediately marks the approval executed since scheduling is
    /// the terminal action from the approval's point of view.
    pub async fn handle_schedule(&self, data: &Value) -> OpsResult<()> {
        let approval_id = data.get("approval_id").and_then(Value::as_i64);
        let scheduled_time_str = data.get("scheduled_time").and_then(Value::as_str).unwrap_or("");
        if scheduled_time_str.is_empty() {
            tracing::error!(?approval_id, "no scheduled_time in schedule request");
            return Ok(());
        }
        let Ok(scheduled_time) = DateTime::parse_from_rfc3339(scheduled_time_str) else {
            tracing::error!(?approval_id, scheduled_time_str, "unparseable scheduled_time");
            return Ok(());
        };
        let scheduled_time: DateTime<Utc> = scheduled_time.with_timezone(&Utc);

        let content_type = data
            .get("content_type")
            .and_then(Value::as_str)
            .or_else(|| data.get("action_type").and_then(Value::as_str))
            .unwrap_or("video_distribute")
            .to_string();

        let mut action_data = data.get("action_data").cloned().unwrap_or_else(|| serde_json::json!({}));
        if let Some(platforms) = data.get("platforms") {
            action_data["platforms"] = platforms.clone();
        }
        if matches!(content_type.as_str(), "tweet" | "thread" | "reply") {
            action_data["action"] = Value::String(content_type.clone());
            if let Some(id) = approval_id {
                action_data["approval_id"] = Value::from(id);
            }
        }

        let job_id = self
            .scheduler
            .schedule(&content_type, &action_data, scheduled_time, None)
            .await?;

        if let Some(id) = approval_id {
            self.queue.mark_executed(id).await?;
        }

        let preview: String = action_data
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| action_data.get("theme_title").and_then(Value::as_str))
            .unwrap_or("")
            .chars()
            .take(100)
            .collect();

        self.notifier
            .notify(
                &format!(
                    "{content_type} #{} scheduled via dashboard\n{preview}\nPosting at: {}",
                    approval_id.unwrap_or(0),
                    scheduled_time.to_rfc3339()
                ),
                "schedule",
                "scheduled",
            )
            .await?;

        self.audit
            .log(
                "operations",
                AuditSeverity::Info,
                "schedule",
                &format!("scheduled {content_type} #{} (job {job_id})", approval_id.unwrap_or(0)),
                scheduled_time_str,
                true,
            )
            .await?;

        Ok(())
    }

    /// `execute_*.json` — reads `{approval_id, action_type, action_data}`,
    /// dispatches to the registered platform executor, marks executed, and
    /// notifies.
    pub async fn handle_execute(&self, data: &Value) -> OpsResult<()> {
        let approval_id = data.get("approval_id").and_then(Value::as_i64);
        let action_type = data.get("action_type").and_then(Value::as_str).unwrap_or("").to_string();
        let action_data = data.get("action_data").cloned().unwrap_or_else(|| serde_json::json!({}));

        match self.executor.execute(&action_type, &action_data).await {
            Ok(result) => {
                if let Some(id) = approval_id {
                    self.queue.mark_executed(id).await?;
                }

                if matches!(action_type.as_str(), "tweet" | "thread" | "reply") {
                    let text = action_data.get("text").and_then(Value::as_str).unwrap_or("");
                    let url = result.get("url").and_then(Value::as_str).unwrap_or("");
                    self.events
                        .add(&format!("Posted {action_type}"), &format!("{text} {url}"), 4, "content")
                        .await?;
                }

                self.notifier
                    .notify(
                        &format!("Dashboard approved {action_type} #{}\n{result}", approval_id.unwrap_or(0)),
                        "execute",
                        "executed",
                    )
                    .await?;
            }
            Err(e) => {
                self.notifier
                    .notify(
                        &format!("Execute FAILED for {action_type} #{}: {e}", approval_id.unwrap_or(0)),
                        "execute",
                        "failed",
                    )
                    .await?;
                self.audit
                    .log(
                        "operations",
                        AuditSeverity::Reject,
                        "dashboard_execute",
                        &format!("failed {action_type} #{}: {e}", approval_id.unwrap_or(0)),
                        "",
                        false,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// `render_*.json` — video rendering is out of scope for this build;
    /// the handler still exists so the inbox protocol is complete, but it
    /// answers with a notification explaining that rendering isn't
    /// available, rather than a silent drop.
    pub async fn handle_render(&self, data: &Value) -> OpsResult<()> {
        let approval_id = data.get("approval_id").and_then(Value::as_i64).unwrap_or(0);
        self.notifier
            .notify(
                &format!("Render request #{approval_id} received, but video rendering isn't supported in this build."),
                "render",
                "unsupported",
            )
            .await?;
        self.audit
            .log(
                "operations",
                AuditSeverity::Warn,
                "render",
                &format!("render requested for #{approval_id} but no renderer is configured"),
                "",
                false,
            )
            .await?;
        Ok(())
    }

    /// `feedback_*.json` — records operator rejection feedback as a
    /// high-significance event.
    pub async fn handle_feedback(&self, data: &Value) -> OpsResult<()> {
        let reason = data.get("reason").and_then(Value::as_str).unwrap_or("");
        if reason.is_empty() {
            return Ok(());
        }
        let approval_id = data.get("approval_id").map(|v| v.to_string()).unwrap_or_default();
        let context = data.get("content_context").cloned().unwrap_or_else(|| serde_json::json!({}));
        let theme_title = context.get("theme_title").and_then(Value::as_str).unwrap_or("unknown");
        let category = context.get("category").and_then(Value::as_str).unwrap_or("unknown");

        let summary = format!("Content rejected by operator. Theme: {theme_title}. Category: {category}. Feedback: {reason}");
        self.events
            .add(&format!("Content feedback: {theme_title}"), &summary, 7, "content_feedback")
            .await?;

        let preview: String = reason.chars().take(100).collect();
        self.notifier
            .notify(&format!("Feedback recorded for #{approval_id}: {preview}"), "feedback", "rejected")
            .await?;

        self.audit
            .log(
                "operations",
                AuditSeverity::Info,
                "content_feedback",
                &format!("rejection feedback #{approval_id}: {}", reason.chars().take(200).collect::<String>()),
                "",
                true,
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrypost_providers::mock::{MockNotificationSink, MockPlatformExecutor};
    use sentrypost_storage::CheckinLog;
    use serde_json::json;
    use tempfile::TempDir;

    async fn handlers(dir: &TempDir) -> Handlers {
        let queue = Arc::new(ApprovalQueue::open(&dir.path().join("approvals.db"), 48).await.unwrap());
        let audit = Arc::new(AuditLog::open(&dir.path().join("audit.db")).await.unwrap());
        let scheduler = Arc::new(ContentScheduler::open(&dir.path().join("scheduler.db")).await.unwrap());
        let executor = Arc::new(MockPlatformExecutor::default());
        let events = Arc::new(EventStore::open(&dir.path().join("events.db")).await.unwrap());
        let checkin = Arc::new(CheckinLog::open(&dir.path().join("checkin.db")).await.unwrap());
        let sink = Arc::new(MockNotificationSink::default());
        Handlers {
            queue,
            audit,
            scheduler,
            executor,
            events,
            notifier: Notifier::new(checkin, Some(sink)),
        }
    }

    #[tokio::test]
    async fn schedule_request_marks_approval_executed() {
        let dir = TempDir::new().unwrap();
        let h = handlers(&dir).await;
        let approval_id = h
            .queue
            .submit("sentrypost", "ops", "tweet", &json!({"text": "hi"}), "", 0.0)
            .await
            .unwrap();
        h.queue.approve(approval_id, "").await.unwrap();

        h.handle_schedule(&json!({
            "approval_id": approval_id,
            "action_data": {"text": "hi"},
            "content_type": "tweet",
            "scheduled_time": (Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
        }))
        .await
        .unwrap();

        let row = h.queue.get_by_id(approval_id).await.unwrap().unwrap();
        assert!(row.executed_at.is_some());
    }

    #[tokio::test]
    async fn execute_request_dispatches_and_marks_executed() {
        let dir = TempDir::new().unwrap();
        let h = handlers(&dir).await;
        let approval_id = h
            .queue
            .submit("sentrypost", "ops", "tweet", &json!({"text": "hi"}), "", 0.0)
            .await
            .unwrap();
        h.queue.approve(approval_id, "").await.unwrap();

        h.handle_execute(&json!({
            "approval_id": approval_id,
            "action_type": "tweet",
            "action_data": {"text": "hi"},
        }))
        .await
        .unwrap();

        let row = h.queue.get_by_id(approval_id).await.unwrap().unwrap();
        assert!(row.executed_at.is_some());
    }

    #[tokio::test]
    async fn feedback_with_empty_reason_is_ignored() {
        let dir = TempDir::new().unwrap();
        let h = handlers(&dir).await;
        h.handle_feedback(&json!({"approval_id": 1, "reason": ""})).await.unwrap();
        let stats = h.events.get_stats().await.unwrap();
        assert_eq!(stats.total, 0);
    }

    #[tokio::test]
    async fn feedback_with_reason_records_event() {
        let dir = TempDir::new().unwrap();
        let h = handlers(&dir).await;
        h.handle_feedback(&json!({
            "approval_id": 1,
            "reason": "too salesy",
            "content_context": {"theme_title": "launch", "category": "promo"},
        }))
        .await
        .unwrap();
        let stats = h.events.get_stats().await.unwrap();
        assert_eq!(stats.total, 1);
    }
}
