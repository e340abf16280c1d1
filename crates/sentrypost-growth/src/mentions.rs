use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use sentrypost_providers::{ModelRouter, ModelTier, NotificationSink, SocialPlatform, SocialPost};
use sentrypost_storage::ApprovalQueue;
use serde_json::json;

use crate::db::GrowthDb;
use crate::types::GrowthResult;

const REPLY_COST_ESTIMATE: f64 = 0.001;

/// Polls mentions, drafts a reply for each new one (skipping mentions that
/// are themselves replies to one of the principal's own posts, since those
/// belong to normal conversation rather than inbound engagement), and
/// submits the drafts to the Approval Queue.
pub struct MentionMonitor {
    db: GrowthDb,
    platform: Arc<dyn SocialPlatform>,
    router: Arc<dyn ModelRouter>,
    queue: Arc<ApprovalQueue>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl MentionMonitor {
    pub fn new(
        db: GrowthDb,
        platform: Arc<dyn SocialPlatform>,
        router: Arc<dyn ModelRouter>,
        queue: Arc<ApprovalQueue>,
        notifier: Option<Arc<dyn NotificationSink>>,
    ) -> Self {
        Self {
            db,
            platform,
            router,
            queue,
            notifier,
        }
    }

    pub async fn run(&self) -> GrowthResult<usize> {
        let mentions = self.platform.get_mentions(20).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "mention fetch failed");
            Vec::new()
        });

        let mut drafted = 0usize;
        for mention in mentions {
            if self.already_seen(&mention.id).await? {
                continue;
            }

            let is_reply_to_principal = self.is_reply_to_principal(&mention).await;
            let mut approval_id = None;
            if !is_reply_to_principal {
                if let Ok(draft) = self.draft_reply(&mention).await {
                    if !draft.is_empty() {
                        let id = self
                            .queue
                            .submit(
                                "sentrypost",
                                "growth-mentions",
                                "reply",
                                &json!({ "tweet_id": mention.id, "text": draft }),
                                &format!("Reply to mention from @{}", mention.author_username),
                                REPLY_COST_ESTIMATE,
                            )
                            .await?;
                        approval_id = Some(id);
                        drafted += 1;
                        if let Some(notifier) = &self.notifier {
                            let _ = notifier
                                .notify(&format!("New mention from @{}: {}", mention.author_username, draft))
                                .await;
                        }
                    }
                }
            }

            self.store_seen_mention(&mention, is_reply_to_principal, approval_id).await?;
        }

        Ok(drafted)
    }

    async fn draft_reply(&self, mention: &SocialPost) -> anyhow::Result<String> {
        let prompt = format!(
            "Someone mentioned us: @{} said \"{}\"\n\nWrite a brief, genuine reply. Max 280 characters. \
             Return ONLY the reply text.",
            mention.author_username, mention.text
        );
        let reply = self.router.invoke(ModelTier::Cheap, &prompt, 150).await?;
        Ok(reply.trim().trim_matches('"').to_string())
    }

    /// A mention counts as "reply to principal" when it's a reply directed at
    /// one of our own recent posts rather than a standalone mention.
    async fn is_reply_to_principal(&self, mention: &SocialPost) -> bool {
        let Ok(own_posts) = self.platform.get_my_recent_posts(50).await else {
            return false;
        };
        own_posts.iter().any(|p| mention.text.contains(&p.id))
    }

    async fn already_seen(&self, tweet_id: &str) -> GrowthResult<bool> {
        let conn = self.db.conn().await;
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM seen_mentions WHERE tweet_id = ?1", params![tweet_id], |row| row.get(0))
            .ok();
        Ok(exists.is_some())
    }

    async fn store_seen_mention(
        &self,
        mention: &SocialPost,
        is_reply_to_principal: bool,
        approval_id: Option<i64>,
    ) -> GrowthResult<()> {
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT OR IGNORE INTO seen_mentions
                (tweet_id, author_username, text, is_reply_to_principal, reply_drafted, approval_id, seen_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                mention.id,
                mention.author_username,
                mention.text,
                is_reply_to_principal,
                approval_id.is_some(),
                approval_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrypost_providers::mock::{MockModelRouter, MockSocialPlatform};
    use tempfile::TempDir;

    fn mention(id: &str, text: &str) -> SocialPost {
        SocialPost {
            id: id.to_string(),
            text: text.to_string(),
            author_username: "bob".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn new_mention_is_drafted_and_submitted() {
        let dir = TempDir::new().unwrap();
        let db = GrowthDb::open(&dir.path().join("growth.db")).await.unwrap();
        let platform = Arc::new(MockSocialPlatform::new(vec![mention("m1", "hello there")]));
        let router = Arc::new(MockModelRouter::new("thanks for reaching out"));
        let queue = Arc::new(ApprovalQueue::open(&dir.path().join("approvals.db"), 48).await.unwrap());
        let monitor = MentionMonitor::new(db, platform, router, queue, None);

        let drafted = monitor.run().await.unwrap();
        assert_eq!(drafted, 1);
        assert_eq!(monitor.queue.get_pending(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_mention_is_not_processed_twice() {
        let dir = TempDir::new().unwrap();
        let db = GrowthDb::open(&dir.path().join("growth.db")).await.unwrap();
        let platform = Arc::new(MockSocialPlatform::new(vec![mention("m1", "hello there")]));
        let router = Arc::new(MockModelRouter::new("thanks for reaching out"));
        let queue = Arc::new(ApprovalQueue::open(&dir.path().join("approvals.db"), 48).await.unwrap());
        let monitor = MentionMonitor::new(db, platform, router, queue, None);

        monitor.run().await.unwrap();
        let second = monitor.run().await.unwrap();
        assert_eq!(second, 0);
        assert_eq!(monitor.queue.get_pending(None).await.unwrap().len(), 1);
    }
}
