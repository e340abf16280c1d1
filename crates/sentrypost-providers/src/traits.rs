//! Narrow interfaces onto the external collaborators this daemon never
//! reimplements: the model router, platform network tools, and the
//! operator notification transport. Core logic depends only on these
//! traits, never on a concrete HTTP client, so it can be exercised in
//! tests against mocks (see `mock`).

use async_trait::async_trait;
use serde_json::Value;

/// Where an operator-facing message goes. Telegram is the only production
/// implementation; the Telegram operator UI's inbound command handling is
/// out of scope here, so this is send-only.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: &str) -> anyhow::Result<()>;
}

/// Which cost/capability tier to route a model call through. Mirrors the
/// CHEAP/STANDARD/PREMIUM split the original model router exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Cheap,
    Standard,
    Premium,
}

/// A single LLM call. `invoke` returns the raw text content; callers that
/// need JSON are responsible for their own tolerant extraction (stripping
/// markdown fences etc.) since the shape of that JSON is call-site specific.
#[async_trait]
pub trait ModelRouter: Send + Sync {
    async fn invoke(&self, tier: ModelTier, prompt: &str, max_tokens: u32) -> anyhow::Result<String>;
}

/// Executes an approved action against the target platform (Twitter/X,
/// Discord, WhatsApp, ...). `action_type` matches `Approval::action_type`;
/// `action_data` is that approval's payload. Returns an opaque result blob
/// (e.g. the created post id) persisted back onto the scheduled job.
#[async_trait]
pub trait PlatformExecutor: Send + Sync {
    async fn execute(&self, action_type: &str, action_data: &Value) -> anyhow::Result<Value>;
}

/// One social post as read back from a platform search/mentions/metrics
/// call. Shape matches the dict keys `growth_agent.py` reads off its
/// `twitter_tool` responses (`id`, `text`, `likes`, `replies`, `retweets`,
/// `author_username`, `author_followers`, `impressions`...). Optional
/// fields default to their rest-state when a given call doesn't populate
/// them (e.g. a mentions call has no `impressions`).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SocialPost {
    pub id: String,
    pub text: String,
    pub author_username: String,
    pub author_followers: i64,
    pub likes: i64,
    pub replies: i64,
    pub retweets: i64,
    pub quotes: i64,
    pub bookmarks: i64,
    pub impressions: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Read-only social platform queries the Growth Agent runs: search,
/// mentions, the principal's own recent posts/metrics, and replies to a
/// given post. Separate from `PlatformExecutor` because these never act on
/// anything — posting a drafted reply still goes through the Approval
/// Queue and `PlatformExecutor::execute`.
#[async_trait]
pub trait SocialPlatform: Send + Sync {
    async fn search_conversations(&self, query: &str, max_results: u32) -> anyhow::Result<Vec<SocialPost>>;
    async fn get_mentions(&self, count: u32) -> anyhow::Result<Vec<SocialPost>>;
    async fn get_my_recent_posts(&self, count: u32) -> anyhow::Result<Vec<SocialPost>>;
    async fn get_replies_to(&self, post_id: &str, count: u32) -> anyhow::Result<Vec<SocialPost>>;
    async fn get_my_post_metrics(&self, count: u32) -> anyhow::Result<Vec<SocialPost>>;
}
