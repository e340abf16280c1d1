use crate::db::{fts5_phrase, MemoryDb};
use crate::types::MemoryResult;
use chrono::{DateTime, Utc};
use rusqlite::params;
use sentrypost_types::Knowledge;
use std::path::Path;

/// Knowledge store: topic/content/category/source facts. Never fades.
pub struct KnowledgeStore {
    db: MemoryDb,
}

impl KnowledgeStore {
    pub async fn open(db_path: &Path) -> MemoryResult<Self> {
        let db = MemoryDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS knowledge (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                content TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'lesson',
                source TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
                topic, content, category, content='knowledge', content_rowid='id'
            );
            CREATE TRIGGER IF NOT EXISTS knowledge_ai AFTER INSERT ON knowledge BEGIN
                INSERT INTO knowledge_fts(rowid, topic, content, category)
                VALUES (new.id, new.topic, new.content, new.category);
            END;
            CREATE TRIGGER IF NOT EXISTS knowledge_ad AFTER DELETE ON knowledge BEGIN
                INSERT INTO knowledge_fts(knowledge_fts, rowid, topic, content, category)
                VALUES ('delete', old.id, old.topic, old.content, old.category);
            END;
            CREATE TRIGGER IF NOT EXISTS knowledge_au AFTER UPDATE ON knowledge BEGIN
                INSERT INTO knowledge_fts(knowledge_fts, rowid, topic, content, category)
                VALUES ('delete', old.id, old.topic, old.content, old.category);
                INSERT INTO knowledge_fts(rowid, topic, content, category)
                VALUES (new.id, new.topic, new.content, new.category);
            END;",
        )?;
        drop(conn);
        Ok(Self { db })
    }

    pub async fn add(
        &self,
        topic: &str,
        content: &str,
        category: &str,
        source: &str,
    ) -> MemoryResult<i64> {
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO knowledge (topic, content, category, source, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![topic, content, category, source, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn search(&self, query: &str, limit: i64) -> MemoryResult<Vec<Knowledge>> {
        let conn = self.db.conn().await;

        if self.db.fts5_available() {
            let mut stmt = conn.prepare(
                "SELECT k.id, k.topic, k.content, k.category, k.source, k.created_at
                 FROM knowledge k JOIN knowledge_fts fts ON k.id = fts.rowid
                 WHERE knowledge_fts MATCH ?1
                 ORDER BY k.created_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![fts5_phrase(query), limit], row_to_knowledge)
                .and_then(Iterator::collect::<Result<Vec<_>, _>>);
            if let Ok(items) = rows {
                return Ok(items);
            }
        }

        let like = format!("%{}%", query);
        let mut stmt = conn.prepare(
            "SELECT id, topic, content, category, source, created_at FROM knowledge
             WHERE topic LIKE ?1 OR content LIKE ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let items = stmt
            .query_map(params![like, limit], row_to_knowledge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub async fn get_context(&self, topic: &str) -> MemoryResult<String> {
        let matches = self.search(topic, 5).await?;
        if matches.is_empty() {
            return Ok(String::new());
        }
        let mut lines = vec!["**Knowledge:**".to_string()];
        for k in matches {
            lines.push(format!("- [{}] {}: {}", k.category, k.topic, k.content));
        }
        Ok(lines.join("\n"))
    }

    pub async fn get_stats(&self) -> MemoryResult<KnowledgeStats> {
        let conn = self.db.conn().await;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM knowledge", [], |row| row.get(0))?;
        Ok(KnowledgeStats { total })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct KnowledgeStats {
    pub total: i64,
}

fn row_to_knowledge(row: &rusqlite::Row) -> rusqlite::Result<Knowledge> {
    let created_at: String = row.get(5)?;
    Ok(Knowledge {
        id: row.get(0)?,
        topic: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        source: row.get(4)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn add_and_search_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = KnowledgeStore::open(&dir.path().join("knowledge.db"))
            .await
            .unwrap();
        store
            .add("Pricing", "FLIPT charges per seat", "fact", "conversation")
            .await
            .unwrap();

        let found = store.search("Pricing", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, "fact");

        let ctx = store.get_context("Pricing").await.unwrap();
        assert!(ctx.contains("FLIPT"));
    }
}
