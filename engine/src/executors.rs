//! `ContentExecutor` adapters registered on the `ContentScheduler` at
//! boot. Scheduled content (`tweet`/`thread`/`reply`) ultimately posts
//! through the same `PlatformExecutor` the dashboard's `execute_*.json`
//! path uses; `video_distribute` has no backing implementation in this
//! build (video rendering is out of scope), so it answers honestly
//! instead of silently dropping the job, mirroring
//! `sentrypost_ops::handlers::Handlers::handle_render`.

use std::sync::Arc;

use async_trait::async_trait;
use sentrypost_providers::PlatformExecutor;
use sentrypost_storage::ContentExecutor;
use serde_json::Value;

pub struct PlatformContentExecutor {
    action_type: String,
    executor: Arc<dyn PlatformExecutor>,
}

impl PlatformContentExecutor {
    pub fn new(action_type: impl Into<String>, executor: Arc<dyn PlatformExecutor>) -> Self {
        Self {
            action_type: action_type.into(),
            executor,
        }
    }
}

#[async_trait]
impl ContentExecutor for PlatformContentExecutor {
    async fn execute(&self, content_data: &Value) -> anyhow::Result<Value> {
        self.executor.execute(&self.action_type, content_data).await
    }
}

#[derive(Default)]
pub struct VideoDistributeStub;

#[async_trait]
impl ContentExecutor for VideoDistributeStub {
    async fn execute(&self, _content_data: &Value) -> anyhow::Result<Value> {
        tracing::warn!("video_distribute job fired but no video renderer is configured in this build");
        Ok(serde_json::json!({
            "status": "skipped",
            "reason": "video rendering is not supported in this build",
        }))
    }
}
