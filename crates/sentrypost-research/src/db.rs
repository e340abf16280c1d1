use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::types::ResearchResult;

/// One connection per `.db` file, following the same pattern as
/// `sentrypost-memory::db::MemoryDb` and `sentrypost-storage::db::StorageDb`.
#[derive(Clone)]
pub struct ResearchDb {
    conn: Arc<Mutex<Connection>>,
}

impl ResearchDb {
    pub async fn open(db_path: &Path) -> ResearchResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous = NORMAL", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn conn(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn opens_and_enables_wal() {
        let dir = TempDir::new().unwrap();
        let db = ResearchDb::open(&dir.path().join("research.db")).await.unwrap();
        let conn = db.conn().await;
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();
        assert_eq!(mode, "wal");
    }
}
