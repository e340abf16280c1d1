use serde::{Deserialize, Serialize};

/// Per-project daily/monthly spend limits and running totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    pub project_id: String,
    pub daily_limit_usd: f64,
    pub monthly_limit_usd: f64,
    pub daily_spend_usd: f64,
    pub monthly_spend_usd: f64,
}

impl TokenBudget {
    pub fn daily_remaining(&self) -> f64 {
        (self.daily_limit_usd - self.daily_spend_usd).max(0.0)
    }

    pub fn monthly_remaining(&self) -> f64 {
        (self.monthly_limit_usd - self.monthly_spend_usd).max(0.0)
    }

    pub fn would_exceed(&self, cost: f64) -> bool {
        self.daily_spend_usd + cost > self.daily_limit_usd
            || self.monthly_spend_usd + cost > self.monthly_limit_usd
    }
}
