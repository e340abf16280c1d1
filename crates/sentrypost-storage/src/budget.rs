use std::path::Path;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use sentrypost_types::TokenBudget;

use crate::db::StorageDb;
use crate::types::StorageResult;

const DEFAULT_DAILY_LIMIT_USD: f64 = 20.0;
const DEFAULT_MONTHLY_LIMIT_USD: f64 = 300.0;

/// Per-project daily/monthly spend tracking. `daily_spend_usd` resets
/// whenever `record_spend` observes a new day; `monthly_spend_usd` resets
/// on a new month, matching how `TokenBudget::would_exceed` is meant to
/// be read (a spend window, not an all-time total).
pub struct BudgetTracker {
    db: StorageDb,
}

impl BudgetTracker {
    pub async fn open(db_path: &Path) -> StorageResult<Self> {
        let db = StorageDb::open(db_path).await?;
        let conn = db.conn().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS budgets (
                project_id TEXT PRIMARY KEY,
                daily_limit_usd REAL NOT NULL DEFAULT 20.0,
                monthly_limit_usd REAL NOT NULL DEFAULT 300.0,
                daily_spend_usd REAL NOT NULL DEFAULT 0.0,
                monthly_spend_usd REAL NOT NULL DEFAULT 0.0,
                daily_reset_date TEXT NOT NULL,
                monthly_reset_month TEXT NOT NULL
            );",
        )?;
        drop(conn);
        Ok(Self { db })
    }

    pub async fn get(&self, project_id: &str) -> StorageResult<TokenBudget> {
        self.roll_windows(project_id).await?;
        let conn = self.db.conn().await;
        let row = conn
            .query_row(
                "SELECT daily_limit_usd, monthly_limit_usd, daily_spend_usd, monthly_spend_usd
                 FROM budgets WHERE project_id=?1",
                params![project_id],
                |row| {
                    Ok(TokenBudget {
                        project_id: project_id.to_string(),
                        daily_limit_usd: row.get(0)?,
                        monthly_limit_usd: row.get(1)?,
                        daily_spend_usd: row.get(2)?,
                        monthly_spend_usd: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or(TokenBudget {
            project_id: project_id.to_string(),
            daily_limit_usd: DEFAULT_DAILY_LIMIT_USD,
            monthly_limit_usd: DEFAULT_MONTHLY_LIMIT_USD,
            daily_spend_usd: 0.0,
            monthly_spend_usd: 0.0,
        }))
    }

    pub async fn set_limits(&self, project_id: &str, daily: f64, monthly: f64) -> StorageResult<()> {
        self.ensure_row(project_id).await?;
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE budgets SET daily_limit_usd=?1, monthly_limit_usd=?2 WHERE project_id=?3",
            params![daily, monthly, project_id],
        )?;
        Ok(())
    }

    /// Records spend against the running totals. Returns `false` (and
    /// does not record) if the spend would exceed either limit — callers
    /// should check this before committing to a cost_estimate.
    pub async fn record_spend(&self, project_id: &str, cost: f64) -> StorageResult<bool> {
        self.roll_windows(project_id).await?;
        let budget = self.get(project_id).await?;
        if budget.would_exceed(cost) {
            return Ok(false);
        }
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE budgets SET daily_spend_usd = daily_spend_usd + ?1,
             monthly_spend_usd = monthly_spend_usd + ?1 WHERE project_id=?2",
            params![cost, project_id],
        )?;
        Ok(true)
    }

    async fn ensure_row(&self, project_id: &str) -> StorageResult<()> {
        let conn = self.db.conn().await;
        let now = Utc::now();
        conn.execute(
            "INSERT OR IGNORE INTO budgets
                (project_id, daily_limit_usd, monthly_limit_usd, daily_spend_usd, monthly_spend_usd,
                 daily_reset_date, monthly_reset_month)
             VALUES (?1, ?2, ?3, 0.0, 0.0, ?4, ?5)",
            params![
                project_id,
                DEFAULT_DAILY_LIMIT_USD,
                DEFAULT_MONTHLY_LIMIT_USD,
                now.format("%Y-%m-%d").to_string(),
                now.format("%Y-%m").to_string(),
            ],
        )?;
        Ok(())
    }

    async fn roll_windows(&self, project_id: &str) -> StorageResult<()> {
        self.ensure_row(project_id).await?;
        let now = Utc::now();
        let today = now.format("%Y-%m-%d").to_string();
        let this_month = now.format("%Y-%m").to_string();
        let conn = self.db.conn().await;
        conn.execute(
            "UPDATE budgets SET daily_spend_usd=0.0, daily_reset_date=?1
             WHERE project_id=?2 AND daily_reset_date <> ?1",
            params![today, project_id],
        )?;
        conn.execute(
            "UPDATE budgets SET monthly_spend_usd=0.0, monthly_reset_month=?1
             WHERE project_id=?2 AND monthly_reset_month <> ?1",
            params![this_month, project_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn default_budget_has_no_spend() {
        let dir = TempDir::new().unwrap();
        let tracker = BudgetTracker::open(&dir.path().join("budget.db")).await.unwrap();
        let budget = tracker.get("proj").await.unwrap();
        assert_eq!(budget.daily_spend_usd, 0.0);
        assert_eq!(budget.daily_limit_usd, DEFAULT_DAILY_LIMIT_USD);
    }

    #[tokio::test]
    async fn record_spend_accumulates_and_rejects_over_limit() {
        let dir = TempDir::new().unwrap();
        let tracker = BudgetTracker::open(&dir.path().join("budget.db")).await.unwrap();
        tracker.set_limits("proj", 10.0, 100.0).await.unwrap();

        assert!(tracker.record_spend("proj", 4.0).await.unwrap());
        assert!(tracker.record_spend("proj", 4.0).await.unwrap());
        assert!(!tracker.record_spend("proj", 4.0).await.unwrap());

        let budget = tracker.get("proj").await.unwrap();
        assert_eq!(budget.daily_spend_usd, 8.0);
    }
}
