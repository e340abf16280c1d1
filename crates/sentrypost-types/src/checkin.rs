use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observability record for a sent operator notification. Exists solely to
/// dedupe — never read back for content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinEntry {
    pub id: i64,
    pub topic: String,
    pub message_hash: String,
    pub message_summary: String,
    pub action_type: String,
    pub details: String,
    pub sent_at: DateTime<Utc>,
}

/// Urgency classification produced by `should_send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationUrgency {
    /// Progress-only chatter ("rendering...") — drop silently.
    Skip,
    /// Ordinary status update — send as-is.
    Notify,
    /// Matches an urgent keyword — send with a visible marker prefix.
    Urgent,
}
