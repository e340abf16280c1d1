use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::params;
use sentrypost_types::{AuditRow, AuditSeverity};
use tokio::sync::broadcast;
use tracing::error;

use crate::db::StorageDb;
use crate::types::StorageResult;

/// Append-only record of every significant event. `severity=critical`
/// rows are additionally broadcast to subscribers — engine boot
/// subscribes a task that forwards those onto the configured
/// `NotificationSink`. A `broadcast::Sender` replaces a stored-closure
/// callback invoked from worker threads, which doesn't survive the move
/// to an async, multi-task runtime.
#[derive(Clone)]
pub struct AuditLog {
    db: StorageDb,
    tx: broadcast::Sender<AuditRow>,
}

impl AuditLog {
    pub async fn open(db_path: &Path) -> StorageResult<Self> {
        let db = StorageDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project TEXT NOT NULL,
                severity TEXT NOT NULL,
                topic TEXT NOT NULL,
                message TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                success INTEGER NOT NULL DEFAULT 1,
                ts TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_severity ON audit_log(severity);
            CREATE INDEX IF NOT EXISTS idx_audit_project ON audit_log(project);",
        )?;
        drop(conn);
        let (tx, _rx) = broadcast::channel(2048);
        Ok(Self { db, tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditRow> {
        self.tx.subscribe()
    }

    pub async fn log(
        &self,
        project: &str,
        severity: AuditSeverity,
        topic: &str,
        message: &str,
        details: &str,
        success: bool,
    ) -> StorageResult<AuditRow> {
        let ts = Utc::now();
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO audit_log (project, severity, topic, message, details, success, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![project, severity.as_str(), topic, message, details, success, ts.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        let row = AuditRow {
            id,
            project: project.to_string(),
            severity,
            topic: topic.to_string(),
            message: message.to_string(),
            details: details.to_string(),
            success,
            ts,
        };

        if severity == AuditSeverity::Critical {
            error!(project, topic, message, "critical audit event");
        }
        let _ = self.tx.send(row.clone());
        Ok(row)
    }

    pub async fn get_recent(&self, limit: i64) -> StorageResult<Vec<AuditRow>> {
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare("SELECT * FROM audit_log ORDER BY ts DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit], row_to_audit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_audit(row: &rusqlite::Row) -> rusqlite::Result<AuditRow> {
    let severity: String = row.get("severity")?;
    let ts: String = row.get("ts")?;
    Ok(AuditRow {
        id: row.get("id")?,
        project: row.get("project")?,
        severity: AuditSeverity::parse(&severity).unwrap_or(AuditSeverity::Info),
        topic: row.get("topic")?,
        message: row.get("message")?,
        details: row.get("details")?,
        success: row.get("success")?,
        ts: DateTime::parse_from_rfc3339(&ts)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn log_persists_and_returns_row() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(&dir.path().join("audit.db")).await.unwrap();
        audit
            .log("proj", AuditSeverity::Info, "boot", "engine started", "", true)
            .await
            .unwrap();

        let recent = audit.get_recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].topic, "boot");
    }

    #[tokio::test]
    async fn critical_severity_is_broadcast_to_subscribers() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(&dir.path().join("audit.db")).await.unwrap();
        let mut rx = audit.subscribe();

        audit
            .log("proj", AuditSeverity::Critical, "kill_switch", "activated", "", true)
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.severity, AuditSeverity::Critical);
    }
}
