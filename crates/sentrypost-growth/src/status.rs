use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::db::GrowthDb;
use crate::types::GrowthResult;

/// Ambient introspection snapshot, surfaced by the engine's HTTP status
/// endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct GrowthStatus {
    pub tweets_tracked: i64,
    pub reply_targets_7d: i64,
    pub reports_generated: i64,
}

pub async fn get_status(db: &GrowthDb) -> GrowthResult<GrowthStatus> {
    let conn = db.conn().await;
    let tweets_tracked: i64 = conn.query_row("SELECT COUNT(*) FROM tweet_metrics", [], |row| row.get(0))?;

    let week_ago = (Utc::now() - ChronoDuration::days(7)).to_rfc3339();
    let reply_targets_7d: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reply_targets WHERE found_at > ?1",
        params![week_ago],
        |row| row.get(0),
    )?;

    let reports_generated: i64 = conn.query_row("SELECT COUNT(*) FROM daily_reports", [], |row| row.get(0))?;

    Ok(GrowthStatus {
        tweets_tracked,
        reply_targets_7d,
        reports_generated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn empty_db_reports_zeroes() {
        let dir = TempDir::new().unwrap();
        let db = GrowthDb::open(&dir.path().join("growth.db")).await.unwrap();
        let status = get_status(&db).await.unwrap();
        assert_eq!(status.tweets_tracked, 0);
        assert_eq!(status.reply_targets_7d, 0);
        assert_eq!(status.reports_generated, 0);
    }
}
