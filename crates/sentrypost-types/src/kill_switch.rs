use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent global kill switch. When active every periodic job and
/// pipeline action must short-circuit before any side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchState {
    pub active: bool,
    pub reason: String,
    pub since: DateTime<Utc>,
}

impl Default for KillSwitchState {
    fn default() -> Self {
        Self {
            active: false,
            reason: String::new(),
            since: Utc::now(),
        }
    }
}
