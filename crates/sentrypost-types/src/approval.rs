use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of an [`Approval`] row. Transitions: `Pending -> {Approved, Edited,
/// Rejected, Expired}`. Every other state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Edited,
    Expired,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Edited => "edited",
            ApprovalStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            "edited" => Some(ApprovalStatus::Edited),
            "expired" => Some(ApprovalStatus::Expired),
            _ => None,
        }
    }

    /// True for `approved` and `edited` — the states an executor may act on.
    pub fn is_actionable(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Edited)
    }
}

/// A proposed outbound action awaiting (or past) human judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: i64,
    pub project_id: String,
    pub agent_id: String,
    pub action_type: String,
    pub action_data: Value,
    pub context_summary: String,
    pub cost_estimate: f64,
    pub status: ApprovalStatus,
    pub operator_notes: String,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Per-status counters returned by `ApprovalQueue::get_stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalStats {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub edited: i64,
    pub expired: i64,
}
