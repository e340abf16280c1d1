use std::path::Path;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, OptionalExtension};
use sentrypost_types::{Approval, ApprovalStats, ApprovalStatus};
use serde_json::Value;

use crate::db::StorageDb;
use crate::types::StorageResult;

/// Sole durable store of outbound actions and sole authority on their
/// status. Every transition is a single `UPDATE ... WHERE id=? AND
/// status=?`-shaped statement, so a concurrent approve+reject race
/// resolves to one success and one no-op — never a hybrid state.
///
/// Every transition is one atomic single-statement update rather than a
/// read-then-write round trip.
pub struct ApprovalQueue {
    db: StorageDb,
    expiry_hours: i64,
}

impl ApprovalQueue {
    pub async fn open(db_path: &Path, expiry_hours: i64) -> StorageResult<Self> {
        let db = StorageDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS approvals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                action_data TEXT NOT NULL,
                context_summary TEXT NOT NULL DEFAULT '',
                cost_estimate REAL NOT NULL DEFAULT 0.0,
                status TEXT NOT NULL DEFAULT 'pending',
                operator_notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                reviewed_at TEXT,
                executed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_approvals_status ON approvals(status);
            CREATE INDEX IF NOT EXISTS idx_approvals_project ON approvals(project_id);",
        )?;
        drop(conn);
        Ok(Self { db, expiry_hours })
    }

    pub async fn submit(
        &self,
        project_id: &str,
        agent_id: &str,
        action_type: &str,
        action_data: &Value,
        context_summary: &str,
        cost_estimate: f64,
    ) -> StorageResult<i64> {
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO approvals
                (project_id, agent_id, action_type, action_data, context_summary, cost_estimate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project_id,
                agent_id,
                action_type,
                serde_json::to_string(action_data)?,
                context_summary,
                cost_estimate,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn approve(&self, id: i64, notes: &str) -> StorageResult<Option<Approval>> {
        let conn = self.db.conn().await;
        let updated = conn.execute(
            "UPDATE approvals SET status='approved', operator_notes=?1, reviewed_at=?2
             WHERE id=?3 AND status='pending'",
            params![notes, Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        drop(conn);
        self.get_by_id(id).await
    }

    pub async fn reject(&self, id: i64, reason: &str) -> StorageResult<Option<Approval>> {
        let conn = self.db.conn().await;
        let updated = conn.execute(
            "UPDATE approvals SET status='rejected', operator_notes=?1, reviewed_at=?2
             WHERE id=?3 AND status='pending'",
            params![reason, Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        drop(conn);
        self.get_by_id(id).await
    }

    pub async fn edit_and_approve(
        &self,
        id: i64,
        new_action_data: &Value,
        notes: &str,
    ) -> StorageResult<Option<Approval>> {
        let conn = self.db.conn().await;
        let updated = conn.execute(
            "UPDATE approvals SET status='edited', action_data=?1, operator_notes=?2, reviewed_at=?3
             WHERE id=?4 AND status='pending'",
            params![
                serde_json::to_string(new_action_data)?,
                notes,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        drop(conn);
        self.get_by_id(id).await
    }

    /// Idempotent: a second call on an already-executed row is a no-op,
    /// never a second write.
    pub async fn mark_executed(&self, id: i64) -> StorageResult<()> {
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE approvals SET executed_at=?1
             WHERE id=?2 AND status IN ('approved', 'edited') AND executed_at IS NULL",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub async fn get_pending(&self, project_id: Option<&str>) -> StorageResult<Vec<Approval>> {
        let conn = self.db.conn().await;
        let rows = match project_id {
            Some(project) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM approvals WHERE status='pending' AND project_id=?1 ORDER BY created_at ASC",
                )?;
                stmt.query_map(params![project], row_to_approval)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn
                    .prepare("SELECT * FROM approvals WHERE status='pending' ORDER BY created_at ASC")?;
                stmt.query_map([], row_to_approval)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    pub async fn get_by_id(&self, id: i64) -> StorageResult<Option<Approval>> {
        let conn = self.db.conn().await;
        let row = conn
            .query_row("SELECT * FROM approvals WHERE id=?1", params![id], row_to_approval)
            .optional()?;
        Ok(row)
    }

    /// Used for crash recovery: rows approved/edited but never executed.
    pub async fn get_approved_unexecuted(&self) -> StorageResult<Vec<Approval>> {
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM approvals WHERE status IN ('approved', 'edited') AND executed_at IS NULL
             ORDER BY reviewed_at ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_approval)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn get_last_executed(&self, action_type: &str) -> StorageResult<Option<Approval>> {
        let conn = self.db.conn().await;
        let row = conn
            .query_row(
                "SELECT * FROM approvals WHERE action_type=?1 AND executed_at IS NOT NULL
                 ORDER BY executed_at DESC LIMIT 1",
                params![action_type],
                row_to_approval,
            )
            .optional()?;
        Ok(row)
    }

    /// Pending rows older than `expiry_hours` -> expired. Returns count.
    pub async fn expire_old(&self) -> StorageResult<usize> {
        let cutoff = (Utc::now() - ChronoDuration::hours(self.expiry_hours)).to_rfc3339();
        let conn = self.db.conn().await;
        let updated = conn.execute(
            "UPDATE approvals SET status='expired' WHERE status='pending' AND created_at < ?1",
            params![cutoff],
        )?;
        Ok(updated)
    }

    pub async fn get_stats(&self, project_id: Option<&str>) -> StorageResult<ApprovalStats> {
        let conn = self.db.conn().await;
        let count_for = |status: &str| -> rusqlite::Result<i64> {
            match project_id {
                Some(project) => conn.query_row(
                    "SELECT COUNT(*) FROM approvals WHERE status=?1 AND project_id=?2",
                    params![status, project],
                    |row| row.get(0),
                ),
                None => conn.query_row(
                    "SELECT COUNT(*) FROM approvals WHERE status=?1",
                    params![status],
                    |row| row.get(0),
                ),
            }
        };
        Ok(ApprovalStats {
            pending: count_for("pending")?,
            approved: count_for("approved")?,
            rejected: count_for("rejected")?,
            edited: count_for("edited")?,
            expired: count_for("expired")?,
        })
    }

    /// Purely-derived rendering helper for the operator UI. Covers every
    /// `action_type` the approval data model supports, beyond the
    /// handful used as illustrative examples elsewhere.
    pub fn format_preview(approval: &Approval) -> String {
        let data = &approval.action_data;
        match approval.action_type.as_str() {
            "tweet" => format!("Tweet: \"{}\"", text_field(data, "text")),
            "thread" => {
                let tweets = data
                    .get("tweets")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let parts: Vec<String> = tweets
                    .iter()
                    .enumerate()
                    .map(|(i, t)| format!("[{}] {}", i + 1, t.as_str().unwrap_or_default()))
                    .collect();
                format!("Thread:\n{}", parts.join("\n---\n"))
            }
            "discord_message" | "discord_announce" => format!(
                "Discord #{}: \"{}\"",
                text_field(data, "channel_name"),
                text_field(data, "text")
            ),
            "whatsapp_send" => format!(
                "WhatsApp to {}: \"{}\"",
                text_field(data, "target"),
                text_field(data, "text")
            ),
            "reply" => format!(
                "Reply to {}:\n\"{}\"",
                text_field(data, "tweet_id"),
                text_field(data, "text")
            ),
            "video_create" => format!("Video script: \"{}...\"", truncated(data, "script", 200)),
            "script_review" => {
                let pillar = text_field(data, "pillar");
                let category = text_field(data, "category");
                let word_count = data.get("word_count").and_then(Value::as_i64).unwrap_or(0);
                let est_dur = data.get("estimated_duration").and_then(Value::as_f64).unwrap_or(0.0);
                let mut parts = Vec::new();
                if !pillar.is_empty() {
                    parts.push(format!("Pillar {pillar}"));
                }
                if !category.is_empty() {
                    parts.push(format!("[{category}]"));
                }
                parts.push(format!("{word_count} words"));
                parts.push(format!("~{:.0}s", est_dur));
                format!("{}\nScript: \"{}...\"", parts.join(" | "), truncated(data, "script", 200))
            }
            "comic_distribute" => {
                let title = data.get("title").and_then(Value::as_str).unwrap_or("Untitled");
                let panel_count = data.get("panel_count").and_then(Value::as_i64).unwrap_or(0);
                let synopsis = text_field(data, "synopsis");
                let pdf_path = text_field(data, "pdf_path");
                let video_path = text_field(data, "video_path");
                let cost = data.get("total_cost").and_then(Value::as_f64).unwrap_or(0.0);
                let mut parts = vec![format!("Comic: {title}"), format!("{panel_count} panels")];
                if !synopsis.is_empty() {
                    parts.push(format!("\"{}\"", truncate(&synopsis, 120)));
                }
                let mut preview = parts.join(" | ");
                if !pdf_path.is_empty() {
                    preview.push_str(&format!("\nPDF: {pdf_path}"));
                }
                if !video_path.is_empty() {
                    preview.push_str(&format!("\nVideo: {video_path}"));
                }
                preview.push_str(&format!("\nCost: ${:.2}", cost));
                preview
            }
            "video_distribute" | "video_tweet" => {
                let pillar = text_field(data, "pillar");
                let category = text_field(data, "category");
                let video_path = text_field(data, "video_path");
                let mut parts = Vec::new();
                if !pillar.is_empty() {
                    parts.push(format!("Pillar {pillar}"));
                }
                if !category.is_empty() {
                    parts.push(format!("[{category}]"));
                }
                let header = parts.join(" ");
                let mut preview = if header.is_empty() {
                    format!("Script: \"{}...\"", truncated(data, "script", 200))
                } else {
                    format!("{header}\nScript: \"{}...\"", truncated(data, "script", 200))
                };
                if !video_path.is_empty() {
                    preview.push_str(&format!("\nVideo: {video_path}"));
                }
                preview
            }
            _ => {
                let pretty = serde_json::to_string_pretty(data).unwrap_or_default();
                truncate(&pretty, 500)
            }
        }
    }
}

fn text_field(data: &Value, field: &str) -> String {
    data.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn truncated(data: &Value, field: &str, max: usize) -> String {
    truncate(&text_field(data, field), max)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn row_to_approval(row: &rusqlite::Row) -> rusqlite::Result<Approval> {
    let action_data: String = row.get("action_data")?;
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let reviewed_at: Option<String> = row.get("reviewed_at")?;
    let executed_at: Option<String> = row.get("executed_at")?;
    Ok(Approval {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        agent_id: row.get("agent_id")?,
        action_type: row.get("action_type")?,
        action_data: serde_json::from_str(&action_data).unwrap_or(Value::Null),
        context_summary: row.get("context_summary")?,
        cost_estimate: row.get("cost_estimate")?,
        status: ApprovalStatus::parse(&status).unwrap_or(ApprovalStatus::Pending),
        operator_notes: row.get("operator_notes")?,
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
        reviewed_at: reviewed_at.and_then(|s| parse_ts(&s)),
        executed_at: executed_at.and_then(|s| parse_ts(&s)),
    })
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (ApprovalQueue, TempDir) {
        let dir = TempDir::new().unwrap();
        let queue = ApprovalQueue::open(&dir.path().join("approvals.db"), 24).await.unwrap();
        (queue, dir)
    }

    #[tokio::test]
    async fn submit_then_approve_roundtrip() {
        let (queue, _dir) = setup().await;
        let id = queue
            .submit("proj", "agent", "tweet", &json!({"text": "hello"}), "why not", 0.0)
            .await
            .unwrap();

        let approved = queue.approve(id, "looks good").await.unwrap().unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert!(approved.reviewed_at.is_some());
    }

    #[tokio::test]
    async fn terminal_state_cannot_transition_again() {
        let (queue, _dir) = setup().await;
        let id = queue
            .submit("proj", "agent", "tweet", &json!({"text": "hello"}), "", 0.0)
            .await
            .unwrap();

        queue.approve(id, "").await.unwrap();
        let second = queue.reject(id, "too late").await.unwrap();
        assert!(second.is_none());

        let row = queue.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(row.status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn concurrent_approve_and_reject_resolve_to_one_winner() {
        let (queue, _dir) = setup().await;
        let id = queue
            .submit("proj", "agent", "tweet", &json!({"text": "hello"}), "", 0.0)
            .await
            .unwrap();

        let (approve_result, reject_result) =
            tokio::join!(queue.approve(id, "a"), queue.reject(id, "b"));

        let winners = [approve_result.unwrap().is_some(), reject_result.unwrap().is_some()];
        assert_eq!(winners.iter().filter(|w| **w).count(), 1);
    }

    #[tokio::test]
    async fn mark_executed_is_idempotent() {
        let (queue, _dir) = setup().await;
        let id = queue
            .submit("proj", "agent", "tweet", &json!({"text": "hello"}), "", 0.0)
            .await
            .unwrap();
        queue.approve(id, "").await.unwrap();

        queue.mark_executed(id).await.unwrap();
        let first = queue.get_by_id(id).await.unwrap().unwrap();
        queue.mark_executed(id).await.unwrap();
        let second = queue.get_by_id(id).await.unwrap().unwrap();

        assert_eq!(first.executed_at, second.executed_at);
    }

    #[tokio::test]
    async fn expire_old_only_touches_pending_past_expiry() {
        let (queue, _dir) = setup().await;
        let id = queue
            .submit("proj", "agent", "tweet", &json!({"text": "hello"}), "", 0.0)
            .await
            .unwrap();

        {
            let conn = queue.db.conn().await;
            let stale = (Utc::now() - ChronoDuration::hours(48)).to_rfc3339();
            conn.execute("UPDATE approvals SET created_at=?1 WHERE id=?2", params![stale, id])
                .unwrap();
        }

        let count = queue.expire_old().await.unwrap();
        assert_eq!(count, 1);
        let row = queue.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(row.status, ApprovalStatus::Expired);
    }

    #[tokio::test]
    async fn get_stats_groups_by_status() {
        let (queue, _dir) = setup().await;
        queue
            .submit("proj", "agent", "tweet", &json!({"text": "a"}), "", 0.0)
            .await
            .unwrap();
        let id2 = queue
            .submit("proj", "agent", "tweet", &json!({"text": "b"}), "", 0.0)
            .await
            .unwrap();
        queue.approve(id2, "").await.unwrap();

        let stats = queue.get_stats(None).await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved, 1);
    }

    #[test]
    fn format_preview_renders_tweet() {
        let approval = Approval {
            id: 1,
            project_id: "p".into(),
            agent_id: "a".into(),
            action_type: "tweet".into(),
            action_data: json!({"text": "hi there"}),
            context_summary: String::new(),
            cost_estimate: 0.0,
            status: ApprovalStatus::Pending,
            operator_notes: String::new(),
            created_at: Utc::now(),
            reviewed_at: None,
            executed_at: None,
        };
        assert_eq!(ApprovalQueue::format_preview(&approval), "Tweet: \"hi there\"");
    }

    #[test]
    fn format_preview_renders_comic_distribute() {
        let approval = Approval {
            id: 1,
            project_id: "p".into(),
            agent_id: "a".into(),
            action_type: "comic_distribute".into(),
            action_data: json!({"title": "Ep 1", "panel_count": 6, "total_cost": 1.5}),
            context_summary: String::new(),
            cost_estimate: 0.0,
            status: ApprovalStatus::Pending,
            operator_notes: String::new(),
            created_at: Utc::now(),
            reviewed_at: None,
            executed_at: None,
        };
        let preview = ApprovalQueue::format_preview(&approval);
        assert!(preview.contains("Comic: Ep 1"));
        assert!(preview.contains("Cost: $1.50"));
    }
}
