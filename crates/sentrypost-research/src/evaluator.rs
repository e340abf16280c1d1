use sentrypost_providers::{ModelRouter, ModelTier};
use sentrypost_types::{ResearchItem, SuggestedAction};
use serde::Deserialize;

const EVALUATION_PROMPT_HEADER: &str = "You are scoring an item against a fixed set of research goals.\n\nRespond with ONLY a JSON object of the shape:\n{\"summary\": \"...\", \"relevance_score\": 8, \"priority\": \"high\", \"suggested_action\": \"content\", \"reasoning\": \"...\", \"matched_goals\": [\"goal-id\"]}\n\nsuggested_action must be one of: alert, task, content, knowledge, watch, ignore.\n";

const TRANSCRIPT_SUMMARY_HEADER: &str =
    "Summarize the key insights from this transcript in under 500 words, focused on anything actionable.\n";

/// One configured research goal, as read from `research_goals.json`'s
/// `goals` list.
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchGoal {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_priority() -> String {
    "medium".to_string()
}

fn default_action() -> String {
    "knowledge".to_string()
}

#[derive(Debug, Deserialize)]
struct EvalResponse {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    relevance_score: f64,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    suggested_action: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    matched_goals: Vec<String>,
}

/// Two-stage keyword-prefilter + LLM scorer.
pub struct GoalEvaluator {
    router: std::sync::Arc<dyn ModelRouter>,
    goals: Vec<ResearchGoal>,
}

impl GoalEvaluator {
    pub fn new(router: std::sync::Arc<dyn ModelRouter>, goals: Vec<ResearchGoal>) -> Self {
        Self { router, goals }
    }

    pub fn goals(&self) -> &[ResearchGoal] {
        &self.goals
    }

    fn keyword_match(&self, item: &ResearchItem) -> bool {
        let haystack = format!("{} {}", item.title, item.content).to_lowercase();
        self.goals
            .iter()
            .flat_map(|g| g.keywords.iter())
            .any(|kw| haystack.contains(&kw.to_lowercase()))
    }

    /// First-pass LLM condensation for long transcripts, replacing
    /// `item.content` in the subsequent evaluation call. Falls back to a
    /// plain truncation if the model call fails.
    async fn summarize_transcript(&self, item: &ResearchItem) -> String {
        let prompt = format!(
            "{TRANSCRIPT_SUMMARY_HEADER}\nTitle: {}\nURL: {}\n\nTRANSCRIPT:\n{}",
            item.title,
            item.url,
            &item.content.chars().take(15_000).collect::<String>()
        );
        match self.router.invoke(ModelTier::Cheap, &prompt, 800).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            _ => item.content.chars().take(1500).collect(),
        }
    }

    /// Evaluates a single item in place. Items with zero keyword matches
    /// short-circuit to `{score: 0, action: ignore}` without an LLM call.
    pub async fn evaluate(&self, mut item: ResearchItem) -> ResearchItem {
        if !self.keyword_match(&item) {
            item.relevance_score = 0.0;
            item.priority = 0;
            item.suggested_action = SuggestedAction::Ignore;
            item.reasoning = "no keyword matches".to_string();
            return item;
        }

        let mut eval_content = item.content.clone();
        if item.source == "transcript" && item.content.len() > 2000 {
            eval_content = self.summarize_transcript(&item).await;
            item.summary = eval_content.clone();
        }

        let prompt = format!(
            "{EVALUATION_PROMPT_HEADER}\nSource: {}\nTitle: {}\nURL: {}\nContent: {}",
            item.source,
            item.title,
            item.url,
            &eval_content.chars().take(1500).collect::<String>()
        );

        match self.router.invoke(ModelTier::Cheap, &prompt, 500).await {
            Ok(raw) => match parse_eval_response(&raw) {
                Some(result) => {
                    item.summary = result.summary;
                    item.matched_goals = result.matched_goals;
                    item.relevance_score = result.relevance_score;
                    item.priority = priority_to_rank(&result.priority);
                    item.suggested_action =
                        SuggestedAction::parse(&result.suggested_action).unwrap_or(SuggestedAction::Ignore);
                    item.reasoning = result.reasoning;
                }
                None => {
                    item.reasoning = "failed to parse evaluation response".to_string();
                }
            },
            Err(e) => {
                tracing::error!(item = %item.title, error = %e, "evaluation failed");
                item.reasoning = format!("evaluation error: {e}");
            }
        }

        item
    }

    pub async fn evaluate_batch(&self, items: Vec<ResearchItem>) -> Vec<ResearchItem> {
        let mut evaluated = Vec::with_capacity(items.len());
        for item in items {
            evaluated.push(self.evaluate(item).await);
        }
        evaluated
    }
}

/// `critical`/`high`/`medium`/`low`/anything else ranked as an integer so
/// it can be indexed and compared without string matching downstream.
pub fn priority_to_rank(priority: &str) -> i64 {
    match priority.to_lowercase().as_str() {
        "critical" => 4,
        "high" => 3,
        "medium" => 2,
        "low" => 1,
        _ => 0,
    }
}

fn parse_eval_response(raw: &str) -> Option<EvalResponse> {
    let cleaned = strip_markdown_fences(raw);
    serde_json::from_str(&cleaned).ok()
}

fn strip_markdown_fences(raw: &str) -> String {
    if let Some(start) = raw.find("```json") {
        let rest = &raw[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim().to_string();
        }
    }
    if let Some(start) = raw.find("```") {
        let rest = &raw[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim().to_string();
        }
    }
    raw.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrypost_providers::mock::MockModelRouter;
    use std::sync::Arc;

    fn goals() -> Vec<ResearchGoal> {
        vec![ResearchGoal {
            id: "cbdc".to_string(),
            name: "CBDC tracking".to_string(),
            description: "track CBDC rollouts".to_string(),
            keywords: vec!["cbdc".to_string(), "digital id".to_string()],
            priority: "high".to_string(),
            action: "content".to_string(),
        }]
    }

    #[tokio::test]
    async fn no_keyword_match_short_circuits_without_llm_call() {
        let router = Arc::new(MockModelRouter::new("{}"));
        let evaluator = GoalEvaluator::new(router.clone(), goals());

        let item = ResearchItem::unevaluated("rss", "1", "https://x", "cat memes", "nothing relevant", None);
        let result = evaluator.evaluate(item).await;

        assert_eq!(result.suggested_action, SuggestedAction::Ignore);
        assert_eq!(result.relevance_score, 0.0);
        assert!(router.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn keyword_match_invokes_llm_and_parses_response() {
        let response = r#"```json
        {"summary": "CBDC launched", "relevance_score": 9, "priority": "critical",
         "suggested_action": "content", "reasoning": "control grid", "matched_goals": ["cbdc"]}
        ```"#;
        let router = Arc::new(MockModelRouter::new(response));
        let evaluator = GoalEvaluator::new(router, goals());

        let item = ResearchItem::unevaluated("rss", "1", "https://x", "CBDC news", "the cbdc launched today", None);
        let result = evaluator.evaluate(item).await;

        assert_eq!(result.relevance_score, 9.0);
        assert_eq!(result.priority, 4);
        assert_eq!(result.suggested_action, SuggestedAction::Content);
        assert_eq!(result.matched_goals, vec!["cbdc".to_string()]);
    }

    #[tokio::test]
    async fn unparseable_response_is_swallowed() {
        let router = Arc::new(MockModelRouter::new("not json at all"));
        let evaluator = GoalEvaluator::new(router, goals());
        let item = ResearchItem::unevaluated("rss", "1", "https://x", "cbdc news", "cbdc details", None);
        let result = evaluator.evaluate(item).await;
        assert_eq!(result.reasoning, "failed to parse evaluation response");
    }
}
