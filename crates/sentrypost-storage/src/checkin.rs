use std::path::Path;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::params;
use sentrypost_types::{CheckinEntry, NotificationUrgency};
use sha2::{Digest, Sha256};

use crate::db::StorageDb;
use crate::types::StorageResult;

const DEDUP_WINDOW_HOURS: i64 = 4;
const CLEANUP_WINDOW_DAYS: i64 = 30;
const URGENT_MARKER: &str = "\u{1F6A8} URGENT";

const URGENT_KEYWORDS: &[&str] = &[
    "security",
    "api down",
    "kill switch",
    "breach",
    "credentials",
    "token expired",
    "rate limit",
    "banned",
    "critical",
    "emergency",
];

const PROGRESS_ACTION_TYPES: &[&str] = &["progress", "pre_execution", "rendering"];

/// Dedup + urgency gate for every operator notification: hash-based and
/// topic-based dedup lookups, 30-day `cleanup`, and urgency
/// classification (`classify_urgency`) folded into a single
/// `should_send` entry point.
pub struct CheckinLog {
    db: StorageDb,
}

impl CheckinLog {
    pub async fn open(db_path: &Path) -> StorageResult<Self> {
        let db = StorageDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkin_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                message_hash TEXT NOT NULL,
                message_summary TEXT NOT NULL DEFAULT '',
                action_type TEXT NOT NULL DEFAULT '',
                details TEXT NOT NULL DEFAULT '',
                sent_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checkin_topic_sent ON checkin_log(topic, sent_at);
            CREATE INDEX IF NOT EXISTS idx_checkin_hash_sent ON checkin_log(message_hash, sent_at);",
        )?;
        drop(conn);
        Ok(Self { db })
    }

    /// The single gate every operator notification flows through.
    /// Returns `None` if the message should be dropped (either a
    /// duplicate within the dedup window, or classified `skip`).
    /// Otherwise returns the urgency and the text to actually send
    /// (urgent messages get a marker prefix).
    pub async fn should_send(
        &self,
        message: &str,
        topic: &str,
        action_type: &str,
    ) -> StorageResult<Option<(NotificationUrgency, String)>> {
        if self.has_recently_sent_message(message, DEDUP_WINDOW_HOURS).await? {
            return Ok(None);
        }

        match classify_urgency(action_type, message) {
            NotificationUrgency::Skip => Ok(None),
            NotificationUrgency::Notify => Ok(Some((NotificationUrgency::Notify, message.to_string()))),
            NotificationUrgency::Urgent => {
                Ok(Some((NotificationUrgency::Urgent, format!("{URGENT_MARKER}: {message}"))))
            }
        }
    }

    /// Record a notification as sent, after the caller has actually
    /// delivered it. Must be called exactly once per successful send —
    /// it's what makes future `should_send` dedup checks see this one.
    pub async fn record_sent(
        &self,
        topic: &str,
        message: &str,
        action_type: &str,
        details: &str,
    ) -> StorageResult<()> {
        let hash = Self::hash(message);
        let summary: String = message.chars().take(200).collect();
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO checkin_log (topic, message_hash, message_summary, action_type, details, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![topic, hash, summary, action_type, details, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub async fn has_recently_notified(&self, topic: &str, hours: i64) -> StorageResult<bool> {
        let cutoff = (Utc::now() - ChronoDuration::hours(hours)).to_rfc3339();
        let conn = self.db.conn().await;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM checkin_log WHERE topic = ?1 AND sent_at > ?2 LIMIT 1",
                params![topic, cutoff],
                |row| row.get(0),
            )
            .ok();
        Ok(exists.is_some())
    }

    pub async fn has_recently_sent_message(&self, message: &str, hours: i64) -> StorageResult<bool> {
        let hash = Self::hash(message);
        let cutoff = (Utc::now() - ChronoDuration::hours(hours)).to_rfc3339();
        let conn = self.db.conn().await;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM checkin_log WHERE message_hash = ?1 AND sent_at > ?2 LIMIT 1",
                params![hash, cutoff],
                |row| row.get(0),
            )
            .ok();
        Ok(exists.is_some())
    }

    pub async fn get_recent(&self, hours: i64, limit: i64) -> StorageResult<Vec<CheckinEntry>> {
        let cutoff = (Utc::now() - ChronoDuration::hours(hours)).to_rfc3339();
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM checkin_log WHERE sent_at > ?1 ORDER BY sent_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cutoff, limit], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Deletes entries older than 30 days. Returns count pruned.
    pub async fn cleanup(&self) -> StorageResult<usize> {
        let cutoff = (Utc::now() - ChronoDuration::days(CLEANUP_WINDOW_DAYS)).to_rfc3339();
        let conn = self.db.conn().await;
        let deleted = conn.execute("DELETE FROM checkin_log WHERE sent_at < ?1", params![cutoff])?;
        Ok(deleted)
    }

    fn hash(message: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(message.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Pure classification, no I/O: progress-only chatter is dropped, urgent
/// keywords get flagged, everything else is a plain notification.
pub fn classify_urgency(action_type: &str, message: &str) -> NotificationUrgency {
    let lower_action = action_type.to_ascii_lowercase();
    let lower_message = message.to_ascii_lowercase();

    if PROGRESS_ACTION_TYPES.iter().any(|p| lower_action == *p)
        || lower_message.contains("rendering")
        || lower_message.trim_end().ends_with("...")
    {
        return NotificationUrgency::Skip;
    }

    if URGENT_KEYWORDS.iter().any(|kw| lower_message.contains(kw)) {
        return NotificationUrgency::Urgent;
    }

    NotificationUrgency::Notify
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CheckinEntry> {
    let sent_at: String = row.get("sent_at")?;
    Ok(CheckinEntry {
        id: row.get("id")?,
        topic: row.get("topic")?,
        message_hash: row.get("message_hash")?,
        message_summary: row.get("message_summary")?,
        action_type: row.get("action_type")?,
        details: row.get("details")?,
        sent_at: DateTime::parse_from_rfc3339(&sent_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn duplicate_message_is_dropped_within_window() {
        let dir = TempDir::new().unwrap();
        let log = CheckinLog::open(&dir.path().join("checkin.db")).await.unwrap();

        let first = log.should_send("All good", "schedule", "notify").await.unwrap();
        assert!(first.is_some());
        log.record_sent("schedule", "All good", "notify", "").await.unwrap();

        let second = log.should_send("All good", "schedule", "notify").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn progress_only_message_is_skipped() {
        let dir = TempDir::new().unwrap();
        let log = CheckinLog::open(&dir.path().join("checkin.db")).await.unwrap();
        let result = log.should_send("Rendering video...", "render", "progress").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn urgent_keyword_gets_marker_prefix() {
        let dir = TempDir::new().unwrap();
        let log = CheckinLog::open(&dir.path().join("checkin.db")).await.unwrap();
        let (urgency, text) = log
            .should_send("API token expired, please rotate", "auth", "alert")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(urgency, NotificationUrgency::Urgent);
        assert!(text.starts_with(URGENT_MARKER));
    }

    #[test]
    fn classify_urgency_covers_all_three_classes() {
        assert_eq!(classify_urgency("progress", "rendering frame 4/10..."), NotificationUrgency::Skip);
        assert_eq!(classify_urgency("notify", "tweet posted successfully"), NotificationUrgency::Notify);
        assert_eq!(classify_urgency("alert", "security breach detected"), NotificationUrgency::Urgent);
    }

    #[tokio::test]
    async fn cleanup_prunes_entries_older_than_30_days() {
        let dir = TempDir::new().unwrap();
        let log = CheckinLog::open(&dir.path().join("checkin.db")).await.unwrap();
        log.record_sent("schedule", "old message", "notify", "").await.unwrap();

        {
            let conn = log.db.conn().await;
            let stale = (Utc::now() - ChronoDuration::days(40)).to_rfc3339();
            conn.execute("UPDATE checkin_log SET sent_at = ?1", params![stale]).unwrap();
        }

        let pruned = log.cleanup().await.unwrap();
        assert_eq!(pruned, 1);
    }
}
