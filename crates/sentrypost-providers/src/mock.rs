//! In-memory stand-ins for the external-collaborator traits, so core
//! logic can be exercised without real network calls. Used by this
//! crate's own tests and by downstream crates' test suites.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::traits::{ModelRouter, ModelTier, NotificationSink, PlatformExecutor, SocialPlatform, SocialPost};

/// Records every message it was asked to send.
#[derive(Default)]
pub struct MockNotificationSink {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationSink for MockNotificationSink {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        self.sent.lock().await.push(message.to_string());
        Ok(())
    }
}

/// Returns a configured canned response regardless of prompt, and records
/// every call for assertions.
pub struct MockModelRouter {
    pub response: String,
    pub calls: Mutex<Vec<(ModelTier, String)>>,
}

impl MockModelRouter {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelRouter for MockModelRouter {
    async fn invoke(&self, tier: ModelTier, prompt: &str, _max_tokens: u32) -> anyhow::Result<String> {
        self.calls.lock().await.push((tier, prompt.to_string()));
        Ok(self.response.clone())
    }
}

/// Accepts every action and echoes the payload back as the result.
#[derive(Default)]
pub struct MockPlatformExecutor {
    pub executed: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl PlatformExecutor for MockPlatformExecutor {
    async fn execute(&self, action_type: &str, action_data: &Value) -> anyhow::Result<Value> {
        self.executed
            .lock()
            .await
            .push((action_type.to_string(), action_data.clone()));
        Ok(serde_json::json!({ "status": "ok", "action_type": action_type }))
    }
}

/// Returns the same canned batch of posts for every query/call.
#[derive(Default)]
pub struct MockSocialPlatform {
    pub posts: Vec<SocialPost>,
}

impl MockSocialPlatform {
    pub fn new(posts: Vec<SocialPost>) -> Self {
        Self { posts }
    }
}

#[async_trait]
impl SocialPlatform for MockSocialPlatform {
    async fn search_conversations(&self, _query: &str, _max_results: u32) -> anyhow::Result<Vec<SocialPost>> {
        Ok(self.posts.clone())
    }

    async fn get_mentions(&self, _count: u32) -> anyhow::Result<Vec<SocialPost>> {
        Ok(self.posts.clone())
    }

    async fn get_my_recent_posts(&self, _count: u32) -> anyhow::Result<Vec<SocialPost>> {
        Ok(self.posts.clone())
    }

    async fn get_replies_to(&self, _post_id: &str, _count: u32) -> anyhow::Result<Vec<SocialPost>> {
        Ok(self.posts.clone())
    }

    async fn get_my_post_metrics(&self, _count: u32) -> anyhow::Result<Vec<SocialPost>> {
        Ok(self.posts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_sink_records_messages() {
        let sink = MockNotificationSink::default();
        sink.notify("hello").await.unwrap();
        assert_eq!(sink.sent.lock().await.as_slice(), ["hello".to_string()]);
    }

    #[tokio::test]
    async fn mock_router_returns_canned_response() {
        let router = MockModelRouter::new("{\"type\":\"goal\"}");
        let out = router.invoke(ModelTier::Cheap, "classify this", 200).await.unwrap();
        assert_eq!(out, "{\"type\":\"goal\"}");
        assert_eq!(router.calls.lock().await.len(), 1);
    }
}
