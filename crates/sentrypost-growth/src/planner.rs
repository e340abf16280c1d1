use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use rand::Rng;
use rusqlite::params;
use sentrypost_storage::ContentScheduler;
use sentrypost_types::DailyPlan;

use crate::db::GrowthDb;
use crate::types::GrowthResult;

const WINDOW_START_HOUR: i64 = 4;
const WINDOW_END_HOUR: i64 = 19;
const MIN_GAP_MINUTES: i64 = 120;
const MAX_GAP_MINUTES: i64 = 360;
const MIN_COUNT: i64 = 4;
const MAX_COUNT: i64 = 8;
const BEST_HOURS_MIN_TOTAL: i64 = 20;
const BEST_HOURS_MIN_SAMPLE: i64 = 3;

/// Plans a day's worth of natural-looking posting slots in the
/// 04:00-19:00 UTC window, nudged toward historically well-performing
/// hours once enough `tweet_metrics` history exists. The RNG is injected
/// so tests can exercise the gap-enforcement and clamp passes
/// deterministically with a seeded generator.
pub struct DailyPlanner {
    db: GrowthDb,
}

impl DailyPlanner {
    pub fn new(db: GrowthDb) -> Self {
        Self { db }
    }

    /// Idempotent: returns the existing plan for `date` if one was already
    /// stored, otherwise generates and persists a new one.
    pub async fn plan_daily_schedule(&self, date: NaiveDate, rng: &mut dyn rand::RngCore) -> GrowthResult<DailyPlan> {
        if let Some(existing) = self.get_plan(date).await? {
            return Ok(existing);
        }

        let count = rng.gen_range(MIN_COUNT..=MAX_COUNT);
        let best_hours = self.best_performing_hours().await?;
        let slot_times = generate_organic_times(date, count, &best_hours, rng);

        let conn = self.db.conn().await;
        let slot_json = serde_json::to_string(
            &slot_times.iter().map(|t| t.to_rfc3339()).collect::<Vec<_>>(),
        )?;
        conn.execute(
            "INSERT INTO daily_tweet_schedule (schedule_date, planned_count, slot_times, created_at)
             VALUES (?1,?2,?3,?4)",
            params![date.format("%Y-%m-%d").to_string(), count, slot_json, Utc::now().to_rfc3339()],
        )?;

        Ok(DailyPlan {
            schedule_date: date,
            planned_count: slot_times.len() as i64,
            slot_times,
        })
    }

    pub async fn get_plan(&self, date: NaiveDate) -> GrowthResult<Option<DailyPlan>> {
        let conn = self.db.conn().await;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT planned_count, slot_times FROM daily_tweet_schedule
                 WHERE schedule_date = ?1 ORDER BY id DESC LIMIT 1",
                params![date.format("%Y-%m-%d").to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        Ok(row.map(|(planned_count, slot_json)| {
            let slot_times: Vec<DateTime<Utc>> = serde_json::from_str::<Vec<String>>(&slot_json)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|s| DateTime::parse_from_rfc3339(&s).ok().map(|dt| dt.with_timezone(&Utc)))
                .collect();
            DailyPlan {
                schedule_date: date,
                planned_count,
                slot_times,
            }
        }))
    }

    /// Returns the first remaining slot in today's plan that is still at
    /// least 5 minutes out and doesn't fall within 90 minutes of a pending
    /// `scheduler.db` entry. Used to assign an approved tweet to an open
    /// planned time instead of posting it immediately.
    pub async fn get_next_planned_slot(
        &self,
        scheduler: &ContentScheduler,
        today: NaiveDate,
    ) -> GrowthResult<Option<DateTime<Utc>>> {
        let Some(plan) = self.get_plan(today).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let taken: Vec<DateTime<Utc>> = scheduler
            .get_pending()
            .await
            .map(|jobs| jobs.into_iter().map(|j| j.scheduled_time).collect())
            .unwrap_or_default();

        for slot in plan.slot_times {
            if slot <= now + ChronoDuration::minutes(5) {
                continue;
            }
            let conflict = taken.iter().any(|t| (*t - slot).num_seconds().abs() < 5400);
            if !conflict {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    async fn best_performing_hours(&self) -> GrowthResult<Vec<i64>> {
        let conn = self.db.conn().await;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM tweet_metrics", [], |row| row.get(0))?;
        if total < BEST_HOURS_MIN_TOTAL {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(
            "SELECT CAST(strftime('%H', created_at) AS INTEGER) as hour,
                    AVG(likes + retweets + replies) as avg_engagement,
                    COUNT(*) as sample_size
             FROM tweet_metrics
             WHERE created_at IS NOT NULL AND created_at != ''
             GROUP BY hour
             HAVING sample_size >= ?1
             ORDER BY avg_engagement DESC
             LIMIT 6",
        )?;
        let hours = stmt
            .query_map(params![BEST_HOURS_MIN_SAMPLE], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hours)
    }
}

fn organic_minute(rng: &mut dyn rand::RngCore) -> i64 {
    loop {
        let minute = rng.gen_range(1..=58);
        if minute != 0 && minute != 30 {
            return minute;
        }
    }
}

/// Pure function over an injected RNG so the gap-enforcement and clamp
/// behavior can be tested deterministically with a seeded generator.
fn generate_organic_times(
    date: NaiveDate,
    count: i64,
    best_hours: &[i64],
    rng: &mut dyn rand::RngCore,
) -> Vec<DateTime<Utc>> {
    let window_hours = (WINDOW_END_HOUR - WINDOW_START_HOUR) as f64;
    let segment_size = window_hours / count as f64;

    let mut times: Vec<(i64, i64)> = Vec::with_capacity(count as usize);
    for i in 0..count {
        let seg_start = WINDOW_START_HOUR as f64 + i as f64 * segment_size;
        let seg_end = WINDOW_START_HOUR as f64 + (i + 1) as f64 * segment_size;

        let best_in_segment: Vec<i64> = best_hours
            .iter()
            .copied()
            .filter(|&h| (h as f64) >= seg_start && (h as f64) < seg_end)
            .collect();

        if !best_in_segment.is_empty() && rng.gen_range(0.0..1.0) < 0.6 {
            let hour = best_in_segment[rng.gen_range(0..best_in_segment.len())];
            times.push((hour, organic_minute(rng)));
            continue;
        }

        let hour_float = rng.gen_range(seg_start..(seg_end - 0.02).max(seg_start));
        times.push((hour_float as i64, organic_minute(rng)));
    }

    for _pass in 0..3 {
        for i in 1..times.len() {
            let prev_minutes = times[i - 1].0 * 60 + times[i - 1].1;
            let curr_minutes = times[i].0 * 60 + times[i].1;
            let gap = curr_minutes - prev_minutes;

            if gap < MIN_GAP_MINUTES {
                let new_minutes = prev_minutes + MIN_GAP_MINUTES + rng.gen_range(0..=15);
                let new_hour = (new_minutes / 60).min(WINDOW_END_HOUR - 1);
                let mut new_minute = new_minutes % 60;
                if new_minute == 0 || new_minute == 30 {
                    new_minute += rng.gen_range(1..=5);
                }
                times[i] = (new_hour, new_minute.min(59));
            } else if gap > MAX_GAP_MINUTES {
                let mid = prev_minutes + gap / 2;
                let new_hour = (mid / 60).min(WINDOW_END_HOUR - 1);
                let mut new_minute = mid % 60;
                if new_minute == 0 || new_minute == 30 {
                    new_minute += rng.gen_range(1..=5);
                }
                times[i] = (new_hour, new_minute.min(59));
            }
        }
    }

    let mut cleaned: Vec<(i64, i64)> = times.first().copied().into_iter().collect();
    for &(hour, minute) in times.iter().skip(1) {
        let prev_minutes = cleaned.last().map(|(h, m)| h * 60 + m).unwrap_or(0);
        let curr_minutes = hour * 60 + minute;
        if curr_minutes - prev_minutes >= 115 {
            cleaned.push((hour, minute));
        }
    }

    cleaned
        .into_iter()
        .map(|(hour, minute)| {
            let hour = hour.clamp(WINDOW_START_HOUR, WINDOW_END_HOUR - 1);
            let minute = minute.clamp(0, 59);
            Utc.with_ymd_and_hms(date.year(), date.month(), date.day(), hour as u32, minute as u32, 0)
                .single()
                .unwrap_or_else(Utc::now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[tokio::test]
    async fn plan_is_idempotent_for_same_date() {
        let dir = TempDir::new().unwrap();
        let db = GrowthDb::open(&dir.path().join("growth.db")).await.unwrap();
        let planner = DailyPlanner::new(db);
        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let first = planner.plan_daily_schedule(date, &mut rng).await.unwrap();
        let second = planner.plan_daily_schedule(date, &mut rng).await.unwrap();
        assert_eq!(first.slot_times, second.slot_times);
    }

    #[tokio::test]
    async fn plan_has_slots_within_window_and_min_gap() {
        let dir = TempDir::new().unwrap();
        let db = GrowthDb::open(&dir.path().join("growth.db")).await.unwrap();
        let planner = DailyPlanner::new(db);
        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let plan = planner.plan_daily_schedule(date, &mut rng).await.unwrap();
        assert!(plan.planned_count >= 1 && plan.planned_count <= MAX_COUNT);
        for slot in &plan.slot_times {
            let hour = slot.format("%H").to_string().parse::<i64>().unwrap();
            assert!((WINDOW_START_HOUR..WINDOW_END_HOUR).contains(&hour));
            let minute = slot.format("%M").to_string().parse::<i64>().unwrap();
            assert_ne!(minute, 0);
            assert_ne!(minute, 30);
        }
        for pair in plan.slot_times.windows(2) {
            assert!((pair[1] - pair[0]).num_minutes() >= 115);
        }
    }

    #[test]
    fn scenario_4_plan_spacing() {
        let mut rng = StdRng::seed_from_u64(4);
        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let times = generate_organic_times(date, MAX_COUNT, &[], &mut rng);

        assert!(!times.is_empty() && times.len() <= MAX_COUNT as usize);
        for slot in &times {
            let minute = slot.format("%M").to_string().parse::<i64>().unwrap();
            assert_ne!(minute, 0);
            assert_ne!(minute, 30);
        }
        for pair in times.windows(2) {
            let gap = (pair[1] - pair[0]).num_minutes();
            assert!((115..=375).contains(&gap), "gap {gap} out of [115, 375]");
        }
    }

    #[test]
    fn generate_organic_times_respects_count_without_history() {
        let mut rng = StdRng::seed_from_u64(1);
        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let times = generate_organic_times(date, 5, &[], &mut rng);
        assert!(!times.is_empty());
        assert!(times.len() <= 5);
    }
}
