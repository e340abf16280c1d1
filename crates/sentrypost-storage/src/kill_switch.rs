use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::params;
use sentrypost_types::KillSwitchState;

use crate::db::StorageDb;
use crate::types::StorageResult;

/// Persistent global kill switch. `is_active` is a hot read checked at
/// the top of every periodic job and every action handler, so it is
/// backed by an `AtomicBool` cache in addition to the SQLite row —
/// activation/deactivation write both.
pub struct KillSwitch {
    db: StorageDb,
    active: Arc<AtomicBool>,
}

impl KillSwitch {
    pub async fn open(db_path: &Path) -> StorageResult<Self> {
        let db = StorageDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kill_switch (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                active INTEGER NOT NULL DEFAULT 0,
                reason TEXT NOT NULL DEFAULT '',
                since TEXT NOT NULL
            );",
        )?;
        let existing: Option<i64> = conn
            .query_row("SELECT active FROM kill_switch WHERE id = 1", [], |row| row.get(0))
            .ok();
        if existing.is_none() {
            conn.execute(
                "INSERT INTO kill_switch (id, active, reason, since) VALUES (1, 0, '', ?1)",
                params![Utc::now().to_rfc3339()],
            )?;
        }
        let active = existing.unwrap_or(0) != 0;
        drop(conn);
        Ok(Self {
            db,
            active: Arc::new(AtomicBool::new(active)),
        })
    }

    /// Hot read — no async, no lock contention, safe to call from any
    /// periodic job or action handler's entry point.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub async fn activate(&self, reason: &str) -> StorageResult<()> {
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE kill_switch SET active=1, reason=?1, since=?2 WHERE id=1",
            params![reason, Utc::now().to_rfc3339()],
        )?;
        drop(conn);
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    pub async fn deactivate(&self) -> StorageResult<()> {
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE kill_switch SET active=0, reason='', since=?1 WHERE id=1",
            params![Utc::now().to_rfc3339()],
        )?;
        drop(conn);
        self.active.store(false, Ordering::Release);
        Ok(())
    }

    pub async fn get_state(&self) -> StorageResult<KillSwitchState> {
        let conn = self.db.conn().await;
        let (active, reason, since): (i64, String, String) = conn.query_row(
            "SELECT active, reason, since FROM kill_switch WHERE id=1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(KillSwitchState {
            active: active != 0,
            reason,
            since: DateTime::parse_from_rfc3339(&since)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}
