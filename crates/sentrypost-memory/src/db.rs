use crate::types::MemoryResult;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Shared connection handle for one of the four memory stores. Each store
/// (people, knowledge, event, goal) owns its own `.db` file and its own
/// `MemoryDb`.
#[derive(Clone)]
pub struct MemoryDb {
    conn: Arc<Mutex<Connection>>,
    fts5_available: bool,
}

impl MemoryDb {
    pub async fn open(db_path: &Path) -> MemoryResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous = NORMAL", [])?;

        let fts5_available = Self::probe_fts5(&conn);
        if !fts5_available {
            tracing::warn!(path = %db_path.display(), "FTS5 unavailable, falling back to LIKE search");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            fts5_available,
        })
    }

    fn probe_fts5(conn: &Connection) -> bool {
        conn.execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS __fts5_probe USING fts5(x);
             DROP TABLE __fts5_probe;",
        )
        .is_ok()
    }

    pub fn fts5_available(&self) -> bool {
        self.fts5_available
    }

    pub async fn conn(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Escape a user search query for safe embedding inside an FTS5 MATCH
/// string: wrap the whole query as one phrase so stray FTS5 operator
/// syntax in user input can't change the query shape.
pub fn fts5_phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn opens_and_enables_wal() {
        let dir = TempDir::new().unwrap();
        let db = MemoryDb::open(&dir.path().join("test.db")).await.unwrap();
        assert!(db.fts5_available());
        let conn = db.conn().await;
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn fts5_phrase_escapes_quotes() {
        assert_eq!(fts5_phrase("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
