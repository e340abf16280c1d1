use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rusqlite::params;
use sentrypost_providers::SocialPlatform;

use crate::db::GrowthDb;
use crate::types::GrowthResult;

/// Upserts impression/engagement counters for the principal's own recent
/// posts into `tweet_metrics`, keyed by `tweet_id`.
pub struct PerformanceTracker {
    db: GrowthDb,
    platform: Arc<dyn SocialPlatform>,
}

impl PerformanceTracker {
    pub fn new(db: GrowthDb, platform: Arc<dyn SocialPlatform>) -> Self {
        Self { db, platform }
    }

    pub async fn run(&self) -> GrowthResult<usize> {
        let posts = self.platform.get_my_post_metrics(50).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "performance metrics fetch failed");
            Vec::new()
        });

        let conn = self.db.conn().await;
        for post in &posts {
            conn.execute(
                "INSERT INTO tweet_metrics
                    (tweet_id, text, impressions, likes, retweets, replies, quotes, bookmarks, created_at, tracked_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                 ON CONFLICT(tweet_id) DO UPDATE SET
                    impressions=excluded.impressions,
                    likes=excluded.likes,
                    retweets=excluded.retweets,
                    replies=excluded.replies,
                    quotes=excluded.quotes,
                    bookmarks=excluded.bookmarks,
                    tracked_at=excluded.tracked_at",
                params![
                    post.id,
                    post.text,
                    post.impressions,
                    post.likes,
                    post.retweets,
                    post.replies,
                    post.quotes,
                    post.bookmarks,
                    post.created_at.map(|t| t.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }
        Ok(posts.len())
    }
}

struct DayTotals {
    total_tweets: i64,
    total_impressions: i64,
    total_likes: i64,
    total_replies: i64,
    total_retweets: i64,
    best_tweet_id: Option<String>,
    worst_tweet_id: Option<String>,
}

/// Aggregates the day's `tweet_metrics` rows into a `daily_reports` entry.
pub struct ReportGenerator {
    db: GrowthDb,
}

impl ReportGenerator {
    pub fn new(db: GrowthDb) -> Self {
        Self { db }
    }

    pub async fn run(&self, report_date: NaiveDate) -> GrowthResult<String> {
        let conn = self.db.conn().await;
        let day_str = report_date.format("%Y-%m-%d").to_string();

        let mut stmt = conn.prepare(
            "SELECT tweet_id, impressions, likes, retweets, replies FROM tweet_metrics
             WHERE tracked_at LIKE ?1 || '%' OR created_at LIKE ?1 || '%'",
        )?;
        let rows = stmt.query_map(params![day_str], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut totals = DayTotals {
            total_tweets: 0,
            total_impressions: 0,
            total_likes: 0,
            total_replies: 0,
            total_retweets: 0,
            best_tweet_id: None,
            worst_tweet_id: None,
        };
        let mut best_engagement = i64::MIN;
        let mut worst_engagement = i64::MAX;

        for row in rows {
            let (tweet_id, impressions, likes, retweets, replies) = row?;
            totals.total_tweets += 1;
            totals.total_impressions += impressions;
            totals.total_likes += likes;
            totals.total_retweets += retweets;
            totals.total_replies += replies;

            let engagement = likes + retweets + replies;
            if engagement > best_engagement {
                best_engagement = engagement;
                totals.best_tweet_id = Some(tweet_id.clone());
            }
            if engagement < worst_engagement {
                worst_engagement = engagement;
                totals.worst_tweet_id = Some(tweet_id);
            }
        }
        drop(stmt);

        let engagement_rate = if totals.total_impressions > 0 {
            (totals.total_likes + totals.total_retweets + totals.total_replies) as f64
                / totals.total_impressions as f64
                * 100.0
        } else {
            0.0
        };

        let report_text = format!(
            "Daily report for {day_str}: {} tweets, {} impressions, {} likes, {} retweets, \
             {} replies, {:.2}% engagement rate",
            totals.total_tweets,
            totals.total_impressions,
            totals.total_likes,
            totals.total_retweets,
            totals.total_replies,
            engagement_rate
        );

        conn.execute(
            "INSERT INTO daily_reports
                (report_date, total_tweets, total_impressions, total_likes, total_replies,
                 total_retweets, engagement_rate, best_tweet_id, worst_tweet_id, report_text, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                day_str,
                totals.total_tweets,
                totals.total_impressions,
                totals.total_likes,
                totals.total_replies,
                totals.total_retweets,
                engagement_rate,
                totals.best_tweet_id,
                totals.worst_tweet_id,
                report_text,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(report_text)
    }
}
