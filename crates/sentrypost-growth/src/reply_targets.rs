use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use sentrypost_providers::{ModelRouter, ModelTier, NotificationSink, SocialPlatform, SocialPost};
use sentrypost_storage::{ApprovalQueue, AuditLog};
use serde_json::json;

use crate::db::GrowthDb;
use crate::types::GrowthResult;

const SEARCH_QUERIES: &[&str] = &[
    "AI agents autonomy",
    "AI consciousness debate",
    "decentralized marketplace",
    "CBDC digital currency",
    "digital ID surveillance",
    "open source AI models",
    "crypto regulation freedom",
    "AI replacing jobs",
];

const MIN_LIKES: i64 = 50;
const MIN_REPLIES: i64 = 10;
const TOP_N: usize = 5;
const REPLY_COST_ESTIMATE: f64 = 0.001;

struct ScoredTarget {
    post: SocialPost,
    score: f64,
    query: String,
}

fn score(post: &SocialPost) -> f64 {
    post.likes as f64 + 2.0 * post.replies as f64 + 1.5 * post.retweets as f64
        + 0.5 * (post.author_followers as f64 / 1000.0)
}

/// Searches configured queries for active conversations, scores and ranks
/// candidates, drafts replies via the LLM, and submits the top 5 to the
/// Approval Queue.
pub struct ReplyTargetFinder {
    db: GrowthDb,
    platform: Arc<dyn SocialPlatform>,
    router: Arc<dyn ModelRouter>,
    queue: Arc<ApprovalQueue>,
    audit: Arc<AuditLog>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl ReplyTargetFinder {
    pub fn new(
        db: GrowthDb,
        platform: Arc<dyn SocialPlatform>,
        router: Arc<dyn ModelRouter>,
        queue: Arc<ApprovalQueue>,
        audit: Arc<AuditLog>,
        notifier: Option<Arc<dyn NotificationSink>>,
    ) -> Self {
        Self {
            db,
            platform,
            router,
            queue,
            audit,
            notifier,
        }
    }

    pub async fn run(&self) -> GrowthResult<usize> {
        let mut candidates = Vec::new();
        for query in SEARCH_QUERIES {
            let results = match self.platform.search_conversations(query, 10).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(query, error = %e, "reply target search failed");
                    continue;
                }
            };
            for post in results {
                if post.likes < MIN_LIKES && post.replies < MIN_REPLIES {
                    continue;
                }
                if self.already_targeted(&post.id).await? {
                    continue;
                }
                candidates.push(ScoredTarget {
                    score: score(&post),
                    post,
                    query: query.to_string(),
                });
            }
        }

        if candidates.is_empty() {
            return Ok(0);
        }

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        candidates.truncate(TOP_N);

        let mut submitted = 0usize;
        let mut summary_lines = Vec::new();
        for target in &candidates {
            let draft = match self.draft_reply(target).await {
                Ok(d) if !d.is_empty() => d,
                _ => continue,
            };

            let approval_id = self
                .queue
                .submit(
                    "sentrypost",
                    "growth-reply",
                    "reply",
                    &json!({ "tweet_id": target.post.id, "text": draft }),
                    &format!(
                        "Reply to @{} ({} followers, {} likes) | Query: {}",
                        target.post.author_username, target.post.author_followers, target.post.likes, target.query
                    ),
                    REPLY_COST_ESTIMATE,
                )
                .await?;

            self.store_reply_target(target, &draft, approval_id).await?;
            summary_lines.push(format!("@{}: {}", target.post.author_username, draft));
            submitted += 1;
        }

        if submitted > 0 {
            if let Some(notifier) = &self.notifier {
                let message = format!("Found {submitted} reply targets\n\n{}", summary_lines.join("\n"));
                let _ = notifier.notify(&message).await;
            }
        }

        self.audit
            .log(
                "growth",
                sentrypost_types::AuditSeverity::Info,
                "reply_targets",
                &format!("found {} targets, submitted {submitted} replies", candidates.len()),
                "",
                true,
            )
            .await
            .ok();

        Ok(submitted)
    }

    async fn draft_reply(&self, target: &ScoredTarget) -> anyhow::Result<String> {
        let prompt = format!(
            "ORIGINAL POST by @{} ({} followers):\n{}\n\nTOPIC CONTEXT: found via search for '{}'\n\n\
             Write a reply that adds value to this conversation. Max 280 characters. Return ONLY the reply text.",
            target.post.author_username, target.post.author_followers, target.post.text, target.query
        );
        let reply = self.router.invoke(ModelTier::Cheap, &prompt, 150).await?;
        let reply = reply.trim().trim_matches('"').trim_matches('\'');
        Ok(if reply.chars().count() > 280 {
            format!("{}...", reply.chars().take(277).collect::<String>())
        } else {
            reply.to_string()
        })
    }

    async fn already_targeted(&self, tweet_id: &str) -> GrowthResult<bool> {
        let conn = self.db.conn().await;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM reply_targets WHERE tweet_id = ?1",
                params![tweet_id],
                |row| row.get(0),
            )
            .ok();
        Ok(exists.is_some())
    }

    async fn store_reply_target(&self, target: &ScoredTarget, draft: &str, approval_id: i64) -> GrowthResult<()> {
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT OR IGNORE INTO reply_targets
                (tweet_id, author_username, author_followers, tweet_text, likes, replies,
                 retweets, score, draft_reply, approval_id, status, found_at, search_query)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,'submitted',?11,?12)",
            params![
                target.post.id,
                target.post.author_username,
                target.post.author_followers,
                target.post.text,
                target.post.likes,
                target.post.replies,
                target.post.retweets,
                target.score,
                draft,
                approval_id,
                Utc::now().to_rfc3339(),
                target.query,
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

    fn post(id: &str, likes: i64, replies: i64) -> SocialPost {
        SocialPost {
            id: id.to_string(),
            text: "some hot take about CBDCs".to_string(),
            author_username: "alice".to_string(),
            author_followers: 10_000,
            likes,
            replies,
            retweets: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn low_engagement_posts_are_filtered_out() {
        let dir = TempDir::new().unwrap();
        let db = GrowthDb::open(&dir.path().join("growth.db")).await.unwrap();
        let platform = Arc::new(MockSocialPlatform::new(vec![post("1", 1, 0)]));
        let router = Arc::new(MockModelRouter::new("a reply"));
        let queue = Arc::new(ApprovalQueue::open(&dir.path().join("approvals.db"), 48).await.unwrap());
        let audit = Arc::new(AuditLog::open(&dir.path().join("audit.db")).await.unwrap());
        let finder = ReplyTargetFinder::new(db, platform, router, queue, audit, None);

        let submitted = finder.run().await.unwrap();
        assert_eq!(submitted, 0);
    }

    #[tokio::test]
    async fn high_engagement_post_is_submitted_once() {
        let dir = TempDir::new().unwrap();
        let db = GrowthDb::open(&dir.path().join("growth.db")).await.unwrap();
        let platform = Arc::new(MockSocialPlatform::new(vec![post("1", 100, 20)]));
        let router = Arc::new(MockModelRouter::new("a thoughtful reply"));
        let queue = Arc::new(ApprovalQueue::open(&dir.path().join("approvals.db"), 48).await.unwrap());
        let audit = Arc::new(AuditLog::open(&dir.path().join("audit.db")).await.unwrap());
        let finder = ReplyTargetFinder::new(db, platform, router, queue, audit, None);

        let submitted = finder.run().await.unwrap();
        // one SocialPost "1" matches every search query, but is only targeted once.
        assert_eq!(submitted, 1);
        let pending = finder.queue.get_pending(None).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}
