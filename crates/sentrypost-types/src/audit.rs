use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warn,
    Reject,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warn => "warn",
            AuditSeverity::Reject => "reject",
            AuditSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(AuditSeverity::Info),
            "warn" => Some(AuditSeverity::Warn),
            "reject" => Some(AuditSeverity::Reject),
            "critical" => Some(AuditSeverity::Critical),
            _ => None,
        }
    }
}

/// Append-only audit record. Severity `Critical` triggers a synchronous
/// alert dispatch (see `sentrypost-storage::audit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: i64,
    pub project: String,
    pub severity: AuditSeverity,
    pub topic: String,
    pub message: String,
    pub details: String,
    pub success: bool,
    pub ts: DateTime<Utc>,
}
