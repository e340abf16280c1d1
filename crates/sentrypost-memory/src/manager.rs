use std::path::Path;
use std::sync::Arc;

use sentrypost_providers::ModelRouter;
use sentrypost_types::GoalDetection;

use crate::event::EventStore;
use crate::goal::GoalStore;
use crate::knowledge::KnowledgeStore;
use crate::people::PeopleStore;
use crate::types::MemoryResult;

/// Facade over the four memory stores, each backed by its own SQLite file
/// under `memory_dir`. Mirrors the role of the original `MemoryManager`:
/// a single entry point the rest of the system talks to, with a
/// once-per-boot decay pass and best-effort goal detection wired through.
pub struct MemoryManager {
    pub people: PeopleStore,
    pub knowledge: KnowledgeStore,
    pub events: EventStore,
    pub goals: GoalStore,
}

impl MemoryManager {
    pub async fn open(memory_dir: &Path) -> MemoryResult<Self> {
        let people = PeopleStore::open(&memory_dir.join("people.db")).await?;
        let knowledge = KnowledgeStore::open(&memory_dir.join("knowledge.db")).await?;
        let events = EventStore::open(&memory_dir.join("events.db")).await?;
        let goals = GoalStore::open(&memory_dir.join("goals.db")).await?;
        Ok(Self {
            people,
            knowledge,
            events,
            goals,
        })
    }

    /// Runs once per process boot: decays event recall strength and prunes
    /// what's fallen below the floor. Idempotent to call more than once,
    /// but callers should only do it at startup.
    pub async fn start_session(&self) -> MemoryResult<crate::event::DecayReport> {
        self.events.decay_memories().await
    }

    /// Best-effort classification of free text into a goal or a fact.
    /// Delegates to `GoalStore::detect_and_store_goal`; failures are
    /// swallowed there, not here.
    pub async fn detect_and_store_goal(
        &self,
        router: &Arc<dyn ModelRouter>,
        message: &str,
    ) -> Option<GoalDetection> {
        self.goals
            .detect_and_store_goal(router, &self.knowledge, message)
            .await
    }

    /// Assembles a combined context block across all four stores, for
    /// injecting into an agent prompt. Empty sections are omitted.
    pub async fn retrieve_context(&self, topic: &str) -> MemoryResult<String> {
        let mut sections = Vec::new();

        let goals_ctx = self.goals.get_context(topic).await?;
        if !goals_ctx.is_empty() {
            sections.push(goals_ctx);
        }
        let knowledge_ctx = self.knowledge.get_context(topic).await?;
        if !knowledge_ctx.is_empty() {
            sections.push(knowledge_ctx);
        }
        let people_ctx = self.people.get_context(topic).await?;
        if !people_ctx.is_empty() {
            sections.push(people_ctx);
        }
        let events_ctx = self.events.get_context(topic).await?;
        if !events_ctx.is_empty() {
            sections.push(events_ctx);
        }

        Ok(sections.join("\n\n"))
    }

    pub async fn get_stats(&self) -> MemoryResult<MemoryStats> {
        Ok(MemoryStats {
            people: self.people.get_stats().await?,
            knowledge: self.knowledge.get_stats().await?,
            events: self.events.get_stats().await?,
            goals: self.goals.get_stats().await?,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryStats {
    pub people: crate::people::PeopleStats,
    pub knowledge: crate::knowledge::KnowledgeStats,
    pub events: crate::event::EventStats,
    pub goals: crate::goal::GoalStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrypost_providers::mock::MockModelRouter;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_all_four_stores_and_aggregates_context() {
        let dir = TempDir::new().unwrap();
        let manager = MemoryManager::open(dir.path()).await.unwrap();

        manager.goals.add("Ship v2", "rewrite the core", 9).await.unwrap();
        manager
            .knowledge
            .add("Pricing", "per seat", "fact", "conversation")
            .await
            .unwrap();

        let ctx = manager.retrieve_context("ship").await.unwrap();
        assert!(ctx.contains("Ship v2"));

        let stats = manager.get_stats().await.unwrap();
        assert_eq!(stats.goals.active, 1);
        assert_eq!(stats.knowledge.total, 1);
    }

    #[tokio::test]
    async fn start_session_runs_decay_without_error() {
        let dir = TempDir::new().unwrap();
        let manager = MemoryManager::open(dir.path()).await.unwrap();
        manager.events.add("Launch day", "shipped v1", 9, "milestone").await.unwrap();
        let report = manager.start_session().await.unwrap();
        assert_eq!(report.pruned, 0);
    }

    #[tokio::test]
    async fn detect_and_store_goal_delegates_to_goal_store() {
        let dir = TempDir::new().unwrap();
        let manager = MemoryManager::open(dir.path()).await.unwrap();
        let router: Arc<dyn ModelRouter> = Arc::new(MockModelRouter::new(
            r#"{"type": "goal", "title": "Launch beta", "description": "ship it", "priority": 9}"#,
        ));
        let result = manager
            .detect_and_store_goal(&router, "I really want to launch the beta this month")
            .await;
        assert_eq!(result, Some(GoalDetection::Goal));
    }
}
