use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::types::GrowthResult;

/// One connection for the whole `growth.db` file (`tweet_metrics`,
/// `reply_targets`, `seen_mentions`, `daily_reports`, `daily_tweet_schedule`),
/// matching `growth_agent.py::_init_db`'s single-file layout. Same
/// connection-sharing pattern as `sentrypost-storage::db::StorageDb`.
#[derive(Clone)]
pub struct GrowthDb {
    conn: Arc<Mutex<Connection>>,
}

impl GrowthDb {
    pub async fn open(db_path: &Path) -> GrowthResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous = NORMAL", [])?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tweet_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tweet_id TEXT UNIQUE NOT NULL,
                text TEXT NOT NULL,
                impressions INTEGER NOT NULL DEFAULT 0,
                likes INTEGER NOT NULL DEFAULT 0,
                retweets INTEGER NOT NULL DEFAULT 0,
                replies INTEGER NOT NULL DEFAULT 0,
                quotes INTEGER NOT NULL DEFAULT 0,
                bookmarks INTEGER NOT NULL DEFAULT 0,
                created_at TEXT,
                tracked_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS reply_targets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tweet_id TEXT NOT NULL UNIQUE,
                author_username TEXT NOT NULL,
                author_followers INTEGER NOT NULL DEFAULT 0,
                tweet_text TEXT NOT NULL,
                likes INTEGER NOT NULL DEFAULT 0,
                replies INTEGER NOT NULL DEFAULT 0,
                retweets INTEGER NOT NULL DEFAULT 0,
                score REAL NOT NULL DEFAULT 0,
                draft_reply TEXT NOT NULL DEFAULT '',
                approval_id INTEGER,
                status TEXT NOT NULL DEFAULT 'found',
                found_at TEXT NOT NULL,
                search_query TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS seen_mentions (
                tweet_id TEXT PRIMARY KEY,
                author_username TEXT NOT NULL DEFAULT '',
                text TEXT NOT NULL DEFAULT '',
                is_reply_to_principal INTEGER NOT NULL DEFAULT 0,
                reply_drafted INTEGER NOT NULL DEFAULT 0,
                approval_id INTEGER,
                seen_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS daily_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                report_date TEXT NOT NULL,
                total_tweets INTEGER NOT NULL DEFAULT 0,
                total_impressions INTEGER NOT NULL DEFAULT 0,
                total_likes INTEGER NOT NULL DEFAULT 0,
                total_replies INTEGER NOT NULL DEFAULT 0,
                total_retweets INTEGER NOT NULL DEFAULT 0,
                engagement_rate REAL NOT NULL DEFAULT 0,
                best_tweet_id TEXT,
                worst_tweet_id TEXT,
                report_text TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS daily_tweet_schedule (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                schedule_date TEXT NOT NULL,
                planned_count INTEGER NOT NULL,
                slot_times TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
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
    async fn opens_and_creates_all_five_tables() {
        let dir = TempDir::new().unwrap();
        let db = GrowthDb::open(&dir.path().join("growth.db")).await.unwrap();
        let conn = db.conn().await;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
                 ('tweet_metrics','reply_targets','seen_mentions','daily_reports','daily_tweet_schedule')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }
}
