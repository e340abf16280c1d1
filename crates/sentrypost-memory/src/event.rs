use crate::db::{fts5_phrase, MemoryDb};
use crate::types::MemoryResult;
use chrono::{DateTime, Utc};
use rusqlite::params;
use sentrypost_types::Event;
use std::path::Path;

/// Significant events (significance >= 8) never decay below this strength.
const SIGNIFICANT_FLOOR: f64 = 0.5;
/// Significance threshold for the "where-were-you-when" floor.
const SIGNIFICANT_THRESHOLD: i64 = 8;
/// Below this strength (and not significant) an event is pruned.
const PRUNE_FLOOR: f64 = 0.05;
/// Regardless of strength, events older than this are pruned.
const MAX_AGE_DAYS: i64 = 365;
/// Daily multiplicative decay applied to recall_strength, keyed by
/// category — a milestone lingers longer than routine posted content.
/// Any category not listed here falls back to `DEFAULT_DECAY_FACTOR`.
const CATEGORY_DECAY_FACTORS: &[(&str, f64)] = &[
    ("milestone", 0.97),
    ("content_feedback", 0.96),
    ("content", 0.94),
];
const DEFAULT_DECAY_FACTOR: f64 = 0.95;

fn decay_factor_for(category: &str) -> f64 {
    CATEGORY_DECAY_FACTORS
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, factor)| *factor)
        .unwrap_or(DEFAULT_DECAY_FACTOR)
}

/// Event store: the only memory store that fades. Significance-weighted
/// daily decay is applied once per session at boot via `decay_memories`.
pub struct EventStore {
    db: MemoryDb,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DecayReport {
    pub decayed: i64,
    pub pruned: i64,
}

impl EventStore {
    pub async fn open(db_path: &Path) -> MemoryResult<Self> {
        let db = MemoryDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                significance INTEGER NOT NULL DEFAULT 5,
                recall_strength REAL NOT NULL DEFAULT 1.0,
                category TEXT NOT NULL DEFAULT 'general',
                created_at TEXT NOT NULL,
                last_decay_at TEXT NOT NULL
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS events_fts USING fts5(
                title, summary, category, content='events', content_rowid='id'
            );
            CREATE TRIGGER IF NOT EXISTS events_ai AFTER INSERT ON events BEGIN
                INSERT INTO events_fts(rowid, title, summary, category)
                VALUES (new.id, new.title, new.summary, new.category);
            END;
            CREATE TRIGGER IF NOT EXISTS events_ad AFTER DELETE ON events BEGIN
                INSERT INTO events_fts(events_fts, rowid, title, summary, category)
                VALUES ('delete', old.id, old.title, old.summary, old.category);
            END;
            CREATE TRIGGER IF NOT EXISTS events_au AFTER UPDATE ON events BEGIN
                INSERT INTO events_fts(events_fts, rowid, title, summary, category)
                VALUES ('delete', old.id, old.title, old.summary, old.category);
                INSERT INTO events_fts(rowid, title, summary, category)
                VALUES (new.id, new.title, new.summary, new.category);
            END;",
        )?;
        drop(conn);
        Ok(Self { db })
    }

    pub async fn add(
        &self,
        title: &str,
        summary: &str,
        significance: i64,
        category: &str,
    ) -> MemoryResult<i64> {
        let conn = self.db.conn().await;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO events (title, summary, significance, recall_strength, category, created_at, last_decay_at)
             VALUES (?1, ?2, ?3, 1.0, ?4, ?5, ?5)",
            params![title, summary, significance.clamp(1, 10), category, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn search(&self, query: &str, limit: i64) -> MemoryResult<Vec<Event>> {
        let conn = self.db.conn().await;

        if self.db.fts5_available() {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.title, e.summary, e.significance, e.recall_strength, e.category, e.created_at
                 FROM events e JOIN events_fts fts ON e.id = fts.rowid
                 WHERE events_fts MATCH ?1
                 ORDER BY e.recall_strength DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![fts5_phrase(query), limit], row_to_event)
                .and_then(Iterator::collect::<Result<Vec<_>, _>>);
            if let Ok(items) = rows {
                return Ok(items);
            }
        }

        let like = format!("%{}%", query);
        let mut stmt = conn.prepare(
            "SELECT id, title, summary, significance, recall_strength, category, created_at FROM events
             WHERE title LIKE ?1 OR summary LIKE ?1 ORDER BY recall_strength DESC LIMIT ?2",
        )?;
        let items = stmt
            .query_map(params![like, limit], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub async fn get_context(&self, topic: &str) -> MemoryResult<String> {
        let matches = self.search(topic, 5).await?;
        if matches.is_empty() {
            return Ok(String::new());
        }
        let mut lines = vec!["**Events:**".to_string()];
        for e in matches {
            lines.push(format!("- {} ({}): {}", e.title, e.category, e.summary));
        }
        Ok(lines.join("\n"))
    }

    pub async fn get_stats(&self) -> MemoryResult<EventStats> {
        let conn = self.db.conn().await;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        let avg_recall_strength: f64 = conn
            .query_row(
                "SELECT COALESCE(AVG(recall_strength), 0.0) FROM events",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0.0);
        Ok(EventStats {
            total,
            avg_recall_strength,
        })
    }

    /// Apply one decay step to every event, pruning rows that fall below
    /// floor or exceed the max age. Called once per session at boot.
    pub async fn decay_memories(&self) -> MemoryResult<DecayReport> {
        let now = Utc::now();
        let rows: Vec<(i64, i64, f64, String, DateTime<Utc>, DateTime<Utc>)> = {
            let conn = self.db.conn().await;
            let mut stmt = conn.prepare(
                "SELECT id, significance, recall_strength, category, created_at, last_decay_at FROM events",
            )?;
            stmt.query_map([], |row| {
                let created_at: String = row.get(4)?;
                let last_decay_at: String = row.get(5)?;
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    DateTime::parse_from_rfc3339(&created_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or(now),
                    DateTime::parse_from_rfc3339(&last_decay_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or(now),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };

        let mut report = DecayReport::default();
        let conn = self.db.conn().await;
        for (id, significance, recall_strength, category, created_at, last_decay_at) in rows {
            let age_days = (now - created_at).num_days();
            if age_days > MAX_AGE_DAYS {
                conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
                report.pruned += 1;
                continue;
            }

            let elapsed_days = (now - last_decay_at).num_days().max(0);
            if elapsed_days == 0 {
                continue;
            }

            let mut new_strength = recall_strength * decay_factor_for(&category).powi(elapsed_days as i32);
            if significance >= SIGNIFICANT_THRESHOLD {
                new_strength = new_strength.max(SIGNIFICANT_FLOOR);
            } else if new_strength < PRUNE_FLOOR {
                conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
                report.pruned += 1;
                continue;
            }

            conn.execute(
                "UPDATE events SET recall_strength = ?1, last_decay_at = ?2 WHERE id = ?3",
                params![new_strength, now.to_rfc3339(), id],
            )?;
            report.decayed += 1;
        }

        Ok(report)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EventStats {
    pub total: i64,
    pub avg_recall_strength: f64,
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let created_at: String = row.get(6)?;
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        summary: row.get(2)?,
        significance: row.get(3)?,
        recall_strength: row.get(4)?,
        category: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params as rparams;
    use tempfile::TempDir;

    #[tokio::test]
    async fn add_and_search_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::open(&dir.path().join("events.db"))
            .await
            .unwrap();
        store
            .add("Launch day", "Shipped v1", 9, "milestone")
            .await
            .unwrap();

        let found = store.search("Launch", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].recall_strength, 1.0);
    }

    #[tokio::test]
    async fn significant_event_floors_at_half_strength() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::open(&dir.path().join("events.db"))
            .await
            .unwrap();
        let id = store.add("Big day", "...", 9, "milestone").await.unwrap();

        // Backdate last_decay_at by 200 days to simulate elapsed time.
        let backdated = (Utc::now() - chrono::Duration::days(200)).to_rfc3339();
        {
            let conn = store.db.conn().await;
            conn.execute(
                "UPDATE events SET last_decay_at = ?1 WHERE id = ?2",
                rparams![backdated, id],
            )
            .unwrap();
        }

        store.decay_memories().await.unwrap();
        let found = store.search("Big day", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].recall_strength >= SIGNIFICANT_FLOOR);
    }

    #[tokio::test]
    async fn category_decay_factors_differ() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::open(&dir.path().join("events.db"))
            .await
            .unwrap();
        let milestone_id = store.add("Big day", "...", 5, "milestone").await.unwrap();
        let content_id = store.add("Routine post", "...", 5, "content").await.unwrap();

        let backdated = (Utc::now() - chrono::Duration::days(10)).to_rfc3339();
        {
            let conn = store.db.conn().await;
            conn.execute(
                "UPDATE events SET last_decay_at = ?1 WHERE id IN (?2, ?3)",
                rparams![backdated, milestone_id, content_id],
            )
            .unwrap();
        }

        store.decay_memories().await.unwrap();

        let conn = store.db.conn().await;
        let milestone_strength: f64 = conn
            .query_row("SELECT recall_strength FROM events WHERE id = ?1", rparams![milestone_id], |row| row.get(0))
            .unwrap();
        let content_strength: f64 = conn
            .query_row("SELECT recall_strength FROM events WHERE id = ?1", rparams![content_id], |row| row.get(0))
            .unwrap();
        assert!(milestone_strength > content_strength);
    }

    #[tokio::test]
    async fn insignificant_event_prunes_below_floor() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::open(&dir.path().join("events.db"))
            .await
            .unwrap();
        let id = store.add("Small thing", "...", 2, "noise").await.unwrap();

        let backdated = (Utc::now() - chrono::Duration::days(300)).to_rfc3339();
        {
            let conn = store.db.conn().await;
            conn.execute(
                "UPDATE events SET last_decay_at = ?1 WHERE id = ?2",
                rparams![backdated, id],
            )
            .unwrap();
        }

        let report = store.decay_memories().await.unwrap();
        assert_eq!(report.pruned, 1);
        let found = store.search("Small thing", 10).await.unwrap();
        assert!(found.is_empty());
    }
}
