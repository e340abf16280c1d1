use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Alert,
    Task,
    Content,
    Knowledge,
    Watch,
    Ignore,
}

impl SuggestedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestedAction::Alert => "alert",
            SuggestedAction::Task => "task",
            SuggestedAction::Content => "content",
            SuggestedAction::Knowledge => "knowledge",
            SuggestedAction::Watch => "watch",
            SuggestedAction::Ignore => "ignore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "alert" => Some(SuggestedAction::Alert),
            "task" => Some(SuggestedAction::Task),
            "content" => Some(SuggestedAction::Content),
            "knowledge" => Some(SuggestedAction::Knowledge),
            "watch" => Some(SuggestedAction::Watch),
            "ignore" => Some(SuggestedAction::Ignore),
            _ => None,
        }
    }
}

/// An ingested external document plus its evaluation annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchItem {
    pub source: String,
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub relevance_score: f64,
    pub priority: i64,
    pub suggested_action: SuggestedAction,
    pub matched_goals: Vec<String>,
    pub reasoning: String,
    pub summary: String,
}

impl ResearchItem {
    /// A freshly-scraped item before evaluation has run.
    pub fn unevaluated(
        source: impl Into<String>,
        source_id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
            url: url.into(),
            title: title.into(),
            content: content.into(),
            published_at,
            relevance_score: 0.0,
            priority: 0,
            suggested_action: SuggestedAction::Ignore,
            matched_goals: Vec::new(),
            reasoning: String::new(),
            summary: String::new(),
        }
    }
}

/// Summary of a single research cycle, persisted to the `digests` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchDigest {
    pub scraped: i64,
    pub new: i64,
    pub relevant: i64,
    pub alerts: i64,
    pub tasks: i64,
    pub content: i64,
    pub knowledge: i64,
    pub errors: Vec<String>,
}
