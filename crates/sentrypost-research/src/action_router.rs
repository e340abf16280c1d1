use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sentrypost_memory::EventStore;
use sentrypost_providers::{ModelRouter, ModelTier, NotificationSink};
use sentrypost_storage::ApprovalQueue;
use sentrypost_types::{ResearchItem, SuggestedAction};
use serde_json::json;

const CONTENT_PROMPT_HEADER: &str =
    "Draft a single social post (max 280 chars) in the configured persona's voice about this news. \
     No hashtags, no emojis. Return ONLY the post text.\n";

/// Score at or above which an item's `suggested_action` of `content` is
/// eligible to actually become a drafted tweet this cycle; overflow beyond
/// `max_drafts` items is downgraded to `knowledge`.
const CONTENT_SCORE_THRESHOLD: f64 = 8.0;
const REMEMBER_THRESHOLD: f64 = 6.0;

#[derive(Debug, Clone, Default)]
pub struct RoutingStats {
    pub alert_sent: i64,
    pub task_created: i64,
    pub content_queued: i64,
    pub knowledge_added: i64,
    pub watch_added: i64,
    pub ignored: i64,
}

/// Dispatches evaluated items to one of six actions.
pub struct ActionRouter {
    queue: Arc<ApprovalQueue>,
    router: Arc<dyn ModelRouter>,
    notifier: Option<Arc<dyn NotificationSink>>,
    events: Option<Arc<EventStore>>,
    knowledge_dir: PathBuf,
    todo_path: PathBuf,
}

impl ActionRouter {
    pub fn new(
        queue: Arc<ApprovalQueue>,
        router: Arc<dyn ModelRouter>,
        notifier: Option<Arc<dyn NotificationSink>>,
        events: Option<Arc<EventStore>>,
        knowledge_dir: PathBuf,
        todo_path: PathBuf,
    ) -> Self {
        Self {
            queue,
            router,
            notifier,
            events,
            knowledge_dir,
            todo_path,
        }
    }

    /// Routes a batch, downgrading overflow `content` items (beyond the top
    /// `max_drafts` by score) to `knowledge` before dispatch, matching
    /// `route_batch`'s `content_items[:max_drafts]` slice.
    pub async fn route_batch(&self, mut items: Vec<ResearchItem>, max_drafts: usize) -> RoutingStats {
        let mut content_candidates: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.relevance_score >= CONTENT_SCORE_THRESHOLD)
            .map(|(idx, _)| idx)
            .collect();
        content_candidates.sort_by(|&a, &b| {
            items[b]
                .relevance_score
                .partial_cmp(&items[a].relevance_score)
                .unwrap()
        });
        let drafted: std::collections::HashSet<usize> =
            content_candidates.into_iter().take(max_drafts).collect();

        let mut stats = RoutingStats::default();
        for (idx, item) in items.iter_mut().enumerate() {
            if item.priority == 0 && item.suggested_action == SuggestedAction::Ignore {
                stats.ignored += 1;
                continue;
            }
            if item.suggested_action == SuggestedAction::Content && !drafted.contains(&idx) {
                item.suggested_action = SuggestedAction::Knowledge;
            }

            match self.route(item).await {
                Ok(SuggestedAction::Alert) => stats.alert_sent += 1,
                Ok(SuggestedAction::Task) => stats.task_created += 1,
                Ok(SuggestedAction::Content) => stats.content_queued += 1,
                Ok(SuggestedAction::Knowledge) => stats.knowledge_added += 1,
                Ok(SuggestedAction::Watch) => stats.watch_added += 1,
                Ok(SuggestedAction::Ignore) => stats.ignored += 1,
                Err(e) => tracing::error!(item = %item.title, error = %e, "routing failed"),
            }
        }
        stats
    }

    async fn route(&self, item: &ResearchItem) -> anyhow::Result<SuggestedAction> {
        if let Some(events) = &self.events {
            if item.relevance_score >= REMEMBER_THRESHOLD {
                let summary = if item.summary.is_empty() {
                    item.content.chars().take(200).collect()
                } else {
                    item.summary.clone()
                };
                let _ = events
                    .add(&item.title, &summary, item.priority.clamp(1, 10), "research")
                    .await;
            }
        }

        match item.suggested_action {
            SuggestedAction::Alert => {
                self.send_alert(item).await?;
            }
            SuggestedAction::Task => {
                self.add_task(item)?;
            }
            SuggestedAction::Content => {
                self.draft_content(item).await?;
            }
            SuggestedAction::Knowledge => {
                self.write_markdown(&self.knowledge_dir.join(&item.source), item)?;
            }
            SuggestedAction::Watch => {
                self.write_markdown(&self.knowledge_dir.join("watchlist"), item)?;
            }
            SuggestedAction::Ignore => {}
        }
        Ok(item.suggested_action)
    }

    async fn send_alert(&self, item: &ResearchItem) -> anyhow::Result<()> {
        let message = format!(
            "RESEARCH ALERT\n\n{}\n\n{}\n\nGoals: {}\nSource: {}",
            item.title,
            item.summary,
            item.matched_goals.join(", "),
            item.url
        );
        if let Some(notifier) = &self.notifier {
            notifier.notify(&message).await?;
        } else {
            tracing::warn!(preview = %message.chars().take(100).collect::<String>(), "no notifier configured for alert");
        }
        Ok(())
    }

    fn add_task(&self, item: &ResearchItem) -> anyhow::Result<()> {
        if let Some(parent) = self.todo_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = format!(
            "- [ ] Review: {}\n  - Source: {}\n  - Summary: {}\n  - Added: {}\n\n",
            item.title,
            item.url,
            item.summary,
            Utc::now().format("%Y-%m-%d")
        );
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.todo_path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    async fn draft_content(&self, item: &ResearchItem) -> anyhow::Result<()> {
        let prompt = format!(
            "{CONTENT_PROMPT_HEADER}\nTitle: {}\nSummary: {}\nURL: {}",
            item.title,
            if item.summary.is_empty() {
                item.content.chars().take(500).collect::<String>()
            } else {
                item.summary.clone()
            },
            item.url
        );
        let draft = self.router.invoke(ModelTier::Standard, &prompt, 150).await?;
        let draft = draft.trim();
        if draft.is_empty() {
            return Ok(());
        }

        let approval_id = self
            .queue
            .submit(
                "research",
                "research-agent",
                "tweet",
                &json!({ "text": draft }),
                &format!("Research-triggered: {}\nSource: {}", item.title, item.url),
                0.0,
            )
            .await?;

        if let Some(notifier) = &self.notifier {
            notifier
                .notify(&format!(
                    "Content drafted for review (#{approval_id}):\n\n\"{draft}\"\n\nBased on: {}",
                    item.title
                ))
                .await?;
        }
        Ok(())
    }

    fn write_markdown(&self, dir: &Path, item: &ResearchItem) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let date = Utc::now().format("%Y%m%d");
        let safe_title: String = item
            .title
            .chars()
            .take(50)
            .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
            .collect();
        let path = dir.join(format!("{date}_{}.md", safe_title.trim()));

        let content = format!(
            "# {}\n\n**Source:** {}\n**URL:** {}\n**Added:** {}\n**Relevance:** {}/10\n**Priority:** {}\n\n## Summary\n\n{}\n\n## Matched Goals\n\n{}\n\n## Analysis\n\n{}\n",
            item.title,
            item.source,
            item.url,
            Utc::now().to_rfc3339(),
            item.relevance_score,
            item.priority,
            item.summary,
            item.matched_goals.join(", "),
            item.reasoning,
        );
        std::fs::write(path, content)?;
        Ok(())
    }
}
