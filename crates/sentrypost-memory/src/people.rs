use crate::db::{fts5_phrase, MemoryDb};
use crate::types::MemoryResult;
use chrono::{DateTime, Utc};
use rusqlite::params;
use sentrypost_types::Person;
use std::path::Path;

/// People store: identities and interaction history. Relationships never
/// fade, unlike the event store.
pub struct PeopleStore {
    db: MemoryDb,
}

impl PeopleStore {
    pub async fn open(db_path: &Path) -> MemoryResult<Self> {
        let db = MemoryDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS people (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                relationship TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT '',
                interaction_count INTEGER NOT NULL DEFAULT 0,
                last_interaction_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS people_fts USING fts5(
                name, relationship, notes, content='people', content_rowid='id'
            );
            CREATE TRIGGER IF NOT EXISTS people_ai AFTER INSERT ON people BEGIN
                INSERT INTO people_fts(rowid, name, relationship, notes)
                VALUES (new.id, new.name, new.relationship, new.notes);
            END;
            CREATE TRIGGER IF NOT EXISTS people_ad AFTER DELETE ON people BEGIN
                INSERT INTO people_fts(people_fts, rowid, name, relationship, notes)
                VALUES ('delete', old.id, old.name, old.relationship, old.notes);
            END;
            CREATE TRIGGER IF NOT EXISTS people_au AFTER UPDATE ON people BEGIN
                INSERT INTO people_fts(people_fts, rowid, name, relationship, notes)
                VALUES ('delete', old.id, old.name, old.relationship, old.notes);
                INSERT INTO people_fts(rowid, name, relationship, notes)
                VALUES (new.id, new.name, new.relationship, new.notes);
            END;",
        )?;
        drop(conn);
        Ok(Self { db })
    }

    pub async fn add(&self, name: &str, relationship: &str, notes: &str) -> MemoryResult<i64> {
        let conn = self.db.conn().await;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO people (name, relationship, notes, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, relationship, notes, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn record_interaction(&self, id: i64) -> MemoryResult<()> {
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE people SET interaction_count = interaction_count + 1, last_interaction_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub async fn search(&self, query: &str, limit: i64) -> MemoryResult<Vec<Person>> {
        let conn = self.db.conn().await;

        if self.db.fts5_available() {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.name, p.relationship, p.notes, p.interaction_count,
                        p.last_interaction_at, p.created_at
                 FROM people p JOIN people_fts fts ON p.id = fts.rowid
                 WHERE people_fts MATCH ?1
                 ORDER BY p.interaction_count DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![fts5_phrase(query), limit], row_to_person)
                .and_then(Iterator::collect::<Result<Vec<_>, _>>);
            if let Ok(people) = rows {
                return Ok(people);
            }
        }

        let like = format!("%{}%", query);
        let mut stmt = conn.prepare(
            "SELECT id, name, relationship, notes, interaction_count, last_interaction_at, created_at
             FROM people WHERE name LIKE ?1 OR notes LIKE ?1
             ORDER BY interaction_count DESC LIMIT ?2",
        )?;
        let people = stmt
            .query_map(params![like, limit], row_to_person)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(people)
    }

    pub async fn get_context(&self, topic: &str) -> MemoryResult<String> {
        let matches = self.search(topic, 5).await?;
        if matches.is_empty() {
            return Ok(String::new());
        }
        let mut lines = vec!["**People:**".to_string()];
        for p in matches {
            lines.push(format!("- {} ({}): {}", p.name, p.relationship, p.notes));
        }
        Ok(lines.join("\n"))
    }

    pub async fn get_stats(&self) -> MemoryResult<PeopleStats> {
        let conn = self.db.conn().await;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))?;
        let known: i64 = conn.query_row(
            "SELECT COUNT(*) FROM people WHERE interaction_count > 0",
            [],
            |row| row.get(0),
        )?;
        Ok(PeopleStats { total, known })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PeopleStats {
    pub total: i64,
    pub known: i64,
}

fn row_to_person(row: &rusqlite::Row) -> rusqlite::Result<Person> {
    let created_at: String = row.get(6)?;
    let last_interaction_at: Option<String> = row.get(5)?;
    Ok(Person {
        id: row.get(0)?,
        name: row.get(1)?,
        relationship: row.get(2)?,
        notes: row.get(3)?,
        interaction_count: row.get(4)?,
        last_interaction_at: last_interaction_at.and_then(|s| parse_ts(&s)),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
