use crate::db::{fts5_phrase, MemoryDb};
use crate::knowledge::KnowledgeStore;
use crate::types::MemoryResult;
use chrono::{DateTime, Utc};
use rusqlite::params;
use sentrypost_providers::{ModelRouter, ModelTier};
use sentrypost_types::{Goal, GoalDetection, GoalStatus};
use std::path::Path;
use std::sync::Arc;

const CLASSIFY_PROMPT_MIN_LEN: usize = 20;

/// Goal store, plus `detect_and_store_goal`: a best-effort LLM
/// classification of free text into goal/fact/neither, writing into this
/// store or `KnowledgeStore` respectively. Failures are swallowed — this
/// is enrichment, not a contract.
pub struct GoalStore {
    db: MemoryDb,
}

impl GoalStore {
    pub async fn open(db_path: &Path) -> MemoryResult<Self> {
        let db = MemoryDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS goals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                priority INTEGER NOT NULL DEFAULT 5,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS goals_fts USING fts5(
                title, description, content='goals', content_rowid='id'
            );
            CREATE TRIGGER IF NOT EXISTS goals_ai AFTER INSERT ON goals BEGIN
                INSERT INTO goals_fts(rowid, title, description)
                VALUES (new.id, new.title, new.description);
            END;
            CREATE TRIGGER IF NOT EXISTS goals_ad AFTER DELETE ON goals BEGIN
                INSERT INTO goals_fts(goals_fts, rowid, title, description)
                VALUES ('delete', old.id, old.title, old.description);
            END;
            CREATE TRIGGER IF NOT EXISTS goals_au AFTER UPDATE ON goals BEGIN
                INSERT INTO goals_fts(goals_fts, rowid, title, description)
                VALUES ('delete', old.id, old.title, old.description);
                INSERT INTO goals_fts(rowid, title, description)
                VALUES (new.id, new.title, new.description);
            END;",
        )?;
        drop(conn);
        Ok(Self { db })
    }

    pub async fn add(&self, title: &str, description: &str, priority: i64) -> MemoryResult<i64> {
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO goals (title, description, priority, status, created_at) VALUES (?1, ?2, ?3, 'active', ?4)",
            params![title, description, priority.clamp(1, 10), Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn get_active(&self, limit: i64) -> MemoryResult<Vec<Goal>> {
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, priority, status, created_at FROM goals
             WHERE status = 'active' ORDER BY priority DESC, created_at DESC LIMIT ?1",
        )?;
        let goals = stmt
            .query_map(params![limit], row_to_goal)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    pub async fn search(&self, query: &str, limit: i64) -> MemoryResult<Vec<Goal>> {
        let conn = self.db.conn().await;

        if self.db.fts5_available() {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.title, g.description, g.priority, g.status, g.created_at
                 FROM goals g JOIN goals_fts fts ON g.id = fts.rowid
                 WHERE goals_fts MATCH ?1
                 ORDER BY g.priority DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![fts5_phrase(query), limit], row_to_goal)
                .and_then(Iterator::collect::<Result<Vec<_>, _>>);
            if let Ok(goals) = rows {
                return Ok(goals);
            }
        }

        let like = format!("%{}%", query);
        let mut stmt = conn.prepare(
            "SELECT id, title, description, priority, status, created_at FROM goals
             WHERE title LIKE ?1 OR description LIKE ?1 ORDER BY priority DESC LIMIT ?2",
        )?;
        let goals = stmt
            .query_map(params![like, limit], row_to_goal)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    pub async fn get_context(&self, _topic: &str) -> MemoryResult<String> {
        let goals = self.get_active(10).await?;
        if goals.is_empty() {
            return Ok(String::new());
        }
        let mut lines = vec!["**Active Goals:**".to_string()];
        for g in goals {
            lines.push(format!("- [{}/10] {}", g.priority, g.title));
            if !g.description.is_empty() {
                let truncated: String = g.description.chars().take(100).collect();
                lines.push(format!("  {}", truncated));
            }
        }
        Ok(lines.join("\n"))
    }

    pub async fn get_stats(&self) -> MemoryResult<GoalStats> {
        let conn = self.db.conn().await;
        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM goals WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        let completed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM goals WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM goals", [], |row| row.get(0))?;
        Ok(GoalStats {
            active,
            completed,
            total,
        })
    }

    /// Classify free text as goal/fact/neither via the model router. On
    /// `goal` the row lands here; on `fact` it's routed to `knowledge`
    /// instead. Any failure (no router, malformed response, LLM error) is
    /// swallowed and returns `None` — this is best-effort enrichment.
    pub async fn detect_and_store_goal(
        &self,
        router: &Arc<dyn ModelRouter>,
        knowledge: &KnowledgeStore,
        message: &str,
    ) -> Option<GoalDetection> {
        if message.trim().len() < CLASSIFY_PROMPT_MIN_LEN {
            return None;
        }

        let prompt = format!(
            "Classify this message as one of: goal, fact, or neither.\n\n\
             A GOAL is something the speaker wants to achieve, build, fix, or change.\n\
             A FACT is a piece of knowledge, a decision, or a lesson learned.\n\
             NEITHER is casual conversation, questions, or greetings.\n\n\
             Message: {message}\n\n\
             Respond in JSON only (no markdown fences):\n\
             {{\"type\": \"goal\"|\"fact\"|\"neither\", \"title\": \"short title\", \
             \"description\": \"brief description\", \"priority\": 1-10}}"
        );

        let response = router.invoke(ModelTier::Cheap, &prompt, 200).await.ok()?;
        let parsed = parse_classification(&response)?;

        match parsed.kind.as_str() {
            "goal" if !parsed.title.is_empty() => {
                self.add(&parsed.title, &parsed.description, parsed.priority)
                    .await
                    .ok()?;
                Some(GoalDetection::Goal)
            }
            "fact" if !parsed.title.is_empty() => {
                knowledge
                    .add(&parsed.title, &parsed.description, "lesson", "conversation")
                    .await
                    .ok()?;
                Some(GoalDetection::Fact)
            }
            _ => Some(GoalDetection::Neither),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct GoalStats {
    pub active: i64,
    pub completed: i64,
    pub total: i64,
}

struct Classification {
    kind: String,
    title: String,
    description: String,
    priority: i64,
}

/// Tolerant JSON extraction: strips a leading/trailing markdown fence
/// before parsing, matching the Python original's `response.strip("```")`
/// handling of chat-model output.
fn parse_classification(text: &str) -> Option<Classification> {
    let trimmed = text.trim();
    let unfenced = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.rsplit_once("```").map(|(body, _)| body).unwrap_or(rest)
    } else {
        trimmed
    };
    let unfenced = unfenced.trim();
    if !unfenced.starts_with('{') {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(unfenced).ok()?;
    Some(Classification {
        kind: value.get("type")?.as_str().unwrap_or("neither").to_string(),
        title: value
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        description: value
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        priority: value.get("priority").and_then(|v| v.as_i64()).unwrap_or(5),
    })
}

fn row_to_goal(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
    let created_at: String = row.get(5)?;
    let status: String = row.get(4)?;
    Ok(Goal {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        priority: row.get(3)?,
        status: GoalStatus::parse(&status).unwrap_or(GoalStatus::Active),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrypost_providers::mock::MockModelRouter;
    use tempfile::TempDir;

    async fn setup() -> (GoalStore, KnowledgeStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let goals = GoalStore::open(&dir.path().join("goals.db")).await.unwrap();
        let knowledge = KnowledgeStore::open(&dir.path().join("knowledge.db"))
            .await
            .unwrap();
        (goals, knowledge, dir)
    }

    #[tokio::test]
    async fn add_and_search_roundtrip() {
        let (goals, _knowledge, _dir) = setup().await;
        goals.add("Ship v2", "Finish the rewrite", 8).await.unwrap();
        let found = goals.search("Ship", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].priority, 8);
    }

    #[tokio::test]
    async fn detect_and_store_goal_routes_goal_classification() {
        let (goals, knowledge, _dir) = setup().await;
        let router: Arc<dyn ModelRouter> = Arc::new(MockModelRouter::new(
            r#"{"type": "goal", "title": "Launch beta", "description": "ship it", "priority": 9}"#,
        ));

        let result = goals
            .detect_and_store_goal(&router, &knowledge, "I really want to launch the beta this month")
            .await;
        assert_eq!(result, Some(GoalDetection::Goal));

        let stored = goals.get_active(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Launch beta");
    }

    #[tokio::test]
    async fn detect_and_store_goal_routes_fact_to_knowledge() {
        let (goals, knowledge, _dir) = setup().await;
        let router: Arc<dyn ModelRouter> = Arc::new(MockModelRouter::new(
            r#"{"type": "fact", "title": "Pricing decided", "description": "per seat", "priority": 4}"#,
        ));

        let result = goals
            .detect_and_store_goal(&router, &knowledge, "We decided to go with per-seat pricing")
            .await;
        assert_eq!(result, Some(GoalDetection::Fact));
        assert!(goals.get_active(10).await.unwrap().is_empty());
        assert_eq!(knowledge.search("Pricing", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn detect_and_store_goal_skips_short_messages() {
        let (goals, knowledge, _dir) = setup().await;
        let router: Arc<dyn ModelRouter> = Arc::new(MockModelRouter::new("{}"));
        let result = goals.detect_and_store_goal(&router, &knowledge, "hi").await;
        assert_eq!(result, None);
    }
}
