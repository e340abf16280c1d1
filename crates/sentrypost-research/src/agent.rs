use std::sync::Arc;

use sentrypost_types::{ResearchDigest, SuggestedAction};

use crate::action_router::ActionRouter;
use crate::evaluator::GoalEvaluator;
use crate::scraper::Scraper;
use crate::store::ResearchStore;
use crate::types::ResearchResult;

const DEFAULT_MAX_DRAFTS: usize = 5;
const RELEVANCE_THRESHOLD: f64 = 3.0;

/// Ties together the four research-cycle stages (scrape, dedup, evaluate,
/// route).
pub struct ResearchAgent {
    scrapers: Vec<Arc<dyn Scraper>>,
    store: ResearchStore,
    evaluator: GoalEvaluator,
    action_router: ActionRouter,
    max_drafts: usize,
}

impl ResearchAgent {
    pub fn new(
        scrapers: Vec<Arc<dyn Scraper>>,
        store: ResearchStore,
        evaluator: GoalEvaluator,
        action_router: ActionRouter,
    ) -> Self {
        Self {
            scrapers,
            store,
            evaluator,
            action_router,
            max_drafts: DEFAULT_MAX_DRAFTS,
        }
    }

    pub fn with_max_drafts(mut self, max_drafts: usize) -> Self {
        self.max_drafts = max_drafts;
        self
    }

    /// Runs one full cycle: scrape every registered source, drop previously
    /// seen items, evaluate the rest against goals, route the relevant ones,
    /// persist everything, and return + record the cycle digest.
    pub async fn run_daily_research(&self) -> ResearchResult<ResearchDigest> {
        let mut digest = ResearchDigest::default();

        let mut all_items = Vec::new();
        for scraper in &self.scrapers {
            match scraper.scrape().await {
                Ok(items) => {
                    tracing::info!(scraper = scraper.name(), found = items.len(), "scraper complete");
                    all_items.extend(items);
                }
                Err(e) => {
                    let msg = format!("{} failed: {e}", scraper.name());
                    tracing::error!(scraper = scraper.name(), error = %e, "scraper failed");
                    digest.errors.push(msg);
                }
            }
        }
        digest.scraped = all_items.len() as i64;

        let new_items = self.store.filter_new(all_items).await?;
        digest.new = new_items.len() as i64;

        if new_items.is_empty() {
            self.store.record_digest(&digest).await?;
            return Ok(digest);
        }

        let evaluated = self.evaluator.evaluate_batch(new_items).await;
        let relevant: Vec<_> = evaluated
            .iter()
            .filter(|i| i.relevance_score > RELEVANCE_THRESHOLD)
            .cloned()
            .collect();
        digest.relevant = relevant.len() as i64;

        if !relevant.is_empty() {
            let stats = self.action_router.route_batch(relevant, self.max_drafts).await;
            digest.alerts = stats.alert_sent;
            digest.tasks = stats.task_created;
            digest.content = stats.content_queued;
            digest.knowledge = stats.knowledge_added;
        }

        self.store.save_batch(&evaluated).await?;
        self.store.record_digest(&digest).await?;

        Ok(digest)
    }

    pub async fn get_recent_findings(&self, hours: i64, min_relevance: f64) -> ResearchResult<Vec<sentrypost_types::ResearchItem>> {
        self.store.get_recent(hours, min_relevance).await
    }

    pub async fn get_pending_alerts(&self) -> ResearchResult<Vec<sentrypost_types::ResearchItem>> {
        // critical (4) and high (3) priority tiers, per evaluator::priority_to_rank.
        self.store.get_by_priority_at_least(3).await
    }

    pub fn goals(&self) -> &[crate::evaluator::ResearchGoal] {
        self.evaluator.goals()
    }
}

/// True when an item's suggested action made it past the relevance filter
/// into something actionable (used by tests and digests, never by the
/// routing path itself which reads `suggested_action` directly).
pub fn is_actionable(action: SuggestedAction) -> bool {
    !matches!(action, SuggestedAction::Ignore)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{GoalEvaluator, ResearchGoal};
    use crate::mock::StaticScraper;
    use sentrypost_providers::mock::MockModelRouter;
    use sentrypost_storage::ApprovalQueue;
    use sentrypost_types::ResearchItem;
    use tempfile::TempDir;

    async fn build_agent(dir: &TempDir, llm_response: &str) -> ResearchAgent {
        let store = ResearchStore::open(&dir.path().join("research.db")).await.unwrap();
        let router = Arc::new(MockModelRouter::new(llm_response));
        let goals = vec![ResearchGoal {
            id: "cbdc".to_string(),
            name: "CBDC".to_string(),
            description: "".to_string(),
            keywords: vec!["cbdc".to_string()],
            priority: "high".to_string(),
            action: "content".to_string(),
        }];
        let evaluator = GoalEvaluator::new(router.clone(), goals);
        let queue = Arc::new(ApprovalQueue::open(&dir.path().join("approvals.db"), 48).await.unwrap());
        let action_router = ActionRouter::new(
            queue,
            router,
            None,
            None,
            dir.path().join("knowledge"),
            dir.path().join("todo.md"),
        );

        let item = ResearchItem::unevaluated("rss", "item-1", "https://x", "CBDC rollout", "cbdc launched today", None);
        let scraper: Arc<dyn Scraper> = Arc::new(StaticScraper::new("rss", vec![item]));

        ResearchAgent::new(vec![scraper], store, evaluator, action_router)
    }

    #[tokio::test]
    async fn full_cycle_routes_and_records_digest() {
        let dir = TempDir::new().unwrap();
        let response = r#"{"summary": "s", "relevance_score": 9, "priority": "high",
                            "suggested_action": "knowledge", "reasoning": "r", "matched_goals": ["cbdc"]}"#;
        let agent = build_agent(&dir, response).await;

        let digest = agent.run_daily_research().await.unwrap();
        assert_eq!(digest.scraped, 1);
        assert_eq!(digest.new, 1);
        assert_eq!(digest.relevant, 1);
        assert_eq!(digest.knowledge, 1);
    }

    #[tokio::test]
    async fn second_cycle_sees_no_new_items() {
        let dir = TempDir::new().unwrap();
        let response = r#"{"summary": "s", "relevance_score": 9, "priority": "high",
                            "suggested_action": "knowledge", "reasoning": "r", "matched_goals": []}"#;
        let agent = build_agent(&dir, response).await;

        agent.run_daily_research().await.unwrap();
        let digest = agent.run_daily_research().await.unwrap();
        assert_eq!(digest.new, 0);
    }

    #[tokio::test]
    async fn failing_scraper_does_not_abort_cycle() {
        let dir = TempDir::new().unwrap();
        let store = ResearchStore::open(&dir.path().join("research.db")).await.unwrap();
        let router = Arc::new(MockModelRouter::new("{}"));
        let evaluator = GoalEvaluator::new(router.clone(), vec![]);
        let queue = Arc::new(ApprovalQueue::open(&dir.path().join("approvals.db"), 48).await.unwrap());
        let action_router = ActionRouter::new(
            queue,
            router,
            None,
            None,
            dir.path().join("knowledge"),
            dir.path().join("todo.md"),
        );
        let failing: Arc<dyn Scraper> = Arc::new(StaticScraper::failing("github"));
        let agent = ResearchAgent::new(vec![failing], store, evaluator, action_router);

        let digest = agent.run_daily_research().await.unwrap();
        assert_eq!(digest.scraped, 0);
        assert_eq!(digest.errors.len(), 1);
    }
}
