//! Shared data model for the Sentrypost operator core.
//!
//! Every type here is a plain serde-friendly struct/enum; persistence and
//! behavior live in the crates that own each store (`sentrypost-storage`,
//! `sentrypost-memory`).

mod approval;
mod audit;
mod budget;
mod checkin;
mod daily_plan;
mod kill_switch;
mod memory;
mod research;
mod scheduled_job;

pub use approval::{Approval, ApprovalStats, ApprovalStatus};
pub use audit::{AuditRow, AuditSeverity};
pub use budget::TokenBudget;
pub use checkin::{CheckinEntry, NotificationUrgency};
pub use daily_plan::DailyPlan;
pub use kill_switch::KillSwitchState;
pub use memory::{Event, Goal, GoalDetection, GoalStatus, Knowledge, Person};
pub use research::{ResearchDigest, ResearchItem, SuggestedAction};
pub use scheduled_job::{JobStatus, ScheduledJob};
