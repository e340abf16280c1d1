use crate::types::StorageResult;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Shared connection handle for one subsystem's SQLite file. Each of
/// `approvals.db`, `scheduler.db`, `audit.db`, `checkin.db`,
/// `kill_switch.db`, `budget.db` owns its own `StorageDb`. No
/// cross-database transactions exist between them.
#[derive(Clone)]
pub struct StorageDb {
    conn: Arc<Mutex<Connection>>,
}

impl StorageDb {
    pub async fn open(db_path: &Path) -> StorageResult<Self> {
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
        let db = StorageDb::open(&dir.path().join("test.db")).await.unwrap();
        let conn = db.conn().await;
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }
}
