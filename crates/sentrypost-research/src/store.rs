use std::path::Path;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::params;
use sentrypost_types::{ResearchDigest, ResearchItem, SuggestedAction};

use crate::db::ResearchDb;
use crate::types::ResearchResult;

/// Dedup-by-`source_id` store plus the `digests` table: a boot-durable
/// SQLite table is the source of truth for what's already been seen,
/// rather than an in-process set that a restart would forget.
#[derive(Clone)]
pub struct ResearchStore {
    db: ResearchDb,
}

impl ResearchStore {
    pub async fn open(db_path: &Path) -> ResearchResult<Self> {
        let db = ResearchDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS research_items (
                source_id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                published_at TEXT,
                relevance_score REAL NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 0,
                suggested_action TEXT NOT NULL DEFAULT 'ignore',
                matched_goals TEXT NOT NULL DEFAULT '[]',
                reasoning TEXT NOT NULL DEFAULT '',
                summary TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_research_created ON research_items(created_at);
            CREATE INDEX IF NOT EXISTS idx_research_priority ON research_items(priority);

            CREATE TABLE IF NOT EXISTS digests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                scraped INTEGER NOT NULL,
                new INTEGER NOT NULL,
                relevant INTEGER NOT NULL,
                alerts INTEGER NOT NULL,
                tasks INTEGER NOT NULL,
                content INTEGER NOT NULL,
                knowledge INTEGER NOT NULL,
                errors TEXT NOT NULL DEFAULT '[]'
            );",
        )?;
        drop(conn);
        Ok(Self { db })
    }

    /// Keeps only the items whose `source_id` has not been seen before.
    pub async fn filter_new(&self, items: Vec<ResearchItem>) -> ResearchResult<Vec<ResearchItem>> {
        let conn = self.db.conn().await;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let seen: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM research_items WHERE source_id = ?1",
                    params![item.source_id],
                    |row| row.get(0),
                )
                .ok();
            if seen.is_none() {
                out.push(item);
            }
        }
        Ok(out)
    }

    pub async fn save_batch(&self, items: &[ResearchItem]) -> ResearchResult<()> {
        let conn = self.db.conn().await;
        for item in items {
            conn.execute(
                "INSERT OR REPLACE INTO research_items
                    (source_id, source, url, title, content, published_at, relevance_score,
                     priority, suggested_action, matched_goals, reasoning, summary, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
                params![
                    item.source_id,
                    item.source,
                    item.url,
                    item.title,
                    item.content,
                    item.published_at.map(|d| d.to_rfc3339()),
                    item.relevance_score,
                    item.priority,
                    item.suggested_action.as_str(),
                    serde_json::to_string(&item.matched_goals)?,
                    item.reasoning,
                    item.summary,
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }
        Ok(())
    }

    pub async fn record_digest(&self, digest: &ResearchDigest) -> ResearchResult<()> {
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO digests (ts, scraped, new, relevant, alerts, tasks, content, knowledge, errors)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                Utc::now().to_rfc3339(),
                digest.scraped,
                digest.new,
                digest.relevant,
                digest.alerts,
                digest.tasks,
                digest.content,
                digest.knowledge,
                serde_json::to_string(&digest.errors)?,
            ],
        )?;
        Ok(())
    }

    pub async fn get_recent(&self, hours: i64, min_relevance: f64) -> ResearchResult<Vec<ResearchItem>> {
        let cutoff = (Utc::now() - ChronoDuration::hours(hours)).to_rfc3339();
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM research_items WHERE created_at > ?1 AND relevance_score >= ?2
             ORDER BY relevance_score DESC",
        )?;
        let rows = stmt
            .query_map(params![cutoff, min_relevance], row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn get_by_priority_at_least(&self, priority: i64) -> ResearchResult<Vec<ResearchItem>> {
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM research_items WHERE priority >= ?1 ORDER BY priority DESC, relevance_score DESC",
        )?;
        let rows = stmt
            .query_map(params![priority], row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn get_digest_stats(&self, days: i64) -> ResearchResult<Vec<ResearchDigest>> {
        let cutoff = (Utc::now() - ChronoDuration::days(days)).to_rfc3339();
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare("SELECT * FROM digests WHERE ts > ?1 ORDER BY ts DESC")?;
        let rows = stmt
            .query_map(params![cutoff], row_to_digest)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ResearchItem> {
    let published_at: Option<String> = row.get("published_at")?;
    let suggested_action: String = row.get("suggested_action")?;
    let matched_goals: String = row.get("matched_goals")?;
    Ok(ResearchItem {
        source: row.get("source")?,
        source_id: row.get("source_id")?,
        url: row.get("url")?,
        title: row.get("title")?,
        content: row.get("content")?,
        published_at: published_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s).ok().map(|dt| dt.with_timezone(&Utc))
        }),
        relevance_score: row.get("relevance_score")?,
        priority: row.get("priority")?,
        suggested_action: SuggestedAction::parse(&suggested_action).unwrap_or(SuggestedAction::Ignore),
        matched_goals: serde_json::from_str(&matched_goals).unwrap_or_default(),
        reasoning: row.get("reasoning")?,
        summary: row.get("summary")?,
    })
}

fn row_to_digest(row: &rusqlite::Row) -> rusqlite::Result<ResearchDigest> {
    let errors: String = row.get("errors")?;
    Ok(ResearchDigest {
        scraped: row.get("scraped")?,
        new: row.get("new")?,
        relevant: row.get("relevant")?,
        alerts: row.get("alerts")?,
        tasks: row.get("tasks")?,
        content: row.get("content")?,
        knowledge: row.get("knowledge")?,
        errors: serde_json::from_str(&errors).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(source_id: &str) -> ResearchItem {
        ResearchItem::unevaluated("rss", source_id, "https://x", "title", "content", None)
    }

    #[tokio::test]
    async fn filter_new_drops_previously_seen_source_ids() {
        let dir = TempDir::new().unwrap();
        let store = ResearchStore::open(&dir.path().join("research.db")).await.unwrap();

        store.save_batch(&[item("a")]).await.unwrap();

        let fresh = store.filter_new(vec![item("a"), item("b")]).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].source_id, "b");
    }

    #[tokio::test]
    async fn record_and_read_digest_history() {
        let dir = TempDir::new().unwrap();
        let store = ResearchStore::open(&dir.path().join("research.db")).await.unwrap();
        store
            .record_digest(&ResearchDigest {
                scraped: 10,
                new: 4,
                relevant: 2,
                alerts: 1,
                tasks: 0,
                content: 1,
                knowledge: 1,
                errors: vec![],
            })
            .await
            .unwrap();

        let history = store.get_digest_stats(7).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].scraped, 10);
    }

    #[tokio::test]
    async fn get_by_priority_at_least_filters_and_orders() {
        let dir = TempDir::new().unwrap();
        let store = ResearchStore::open(&dir.path().join("research.db")).await.unwrap();

        let mut high = item("high");
        high.priority = 3;
        let mut low = item("low");
        low.priority = 1;
        store.save_batch(&[high, low]).await.unwrap();

        let critical_plus = store.get_by_priority_at_least(3).await.unwrap();
        assert_eq!(critical_plus.len(), 1);
        assert_eq!(critical_plus[0].source_id, "high");
    }
}
