use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A per-date declarative posting timetable. Re-planning for an existing
/// date is idempotent — see `sentrypost-growth::planner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPlan {
    pub schedule_date: NaiveDate,
    pub planned_count: i64,
    pub slot_times: Vec<DateTime<Utc>>,
}
