//! Ambient configuration: state directory resolution (CLI flag > env var
//! > default) and the small JSON-file-backed settings blob every boot
//! reads, under the state dir. One file plus env/CLI overrides — no
//! multi-layer global/project/managed merge.

use std::path::{Path, PathBuf};

use sentrypost_research::ResearchGoal;
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub rss_feeds: Vec<RssFeedConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssFeedConfig {
    pub name: String,
    pub url: String,
}

fn default_hostname() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8420
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            rss_feeds: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Reads `<state_dir>/config.json`, writing a default one on first run
    /// so the file is always present for an operator to hand-edit afterward.
    pub async fn load_or_init(state_dir: &Path) -> anyhow::Result<Self> {
        let path = state_dir.join("config.json");
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(_) => {
                let config = Self::default();
                fs::create_dir_all(state_dir).await?;
                fs::write(&path, serde_json::to_string_pretty(&config)?).await?;
                Ok(config)
            }
        }
    }
}

const DEFAULT_RESEARCH_GOALS: &str = r#"[
    {
        "id": "ai-autonomy",
        "name": "AI autonomy and agents",
        "description": "Developments in autonomous AI agents and multi-agent systems.",
        "keywords": ["ai agent", "autonomous agent", "multi-agent"],
        "priority": "high",
        "action": "content"
    },
    {
        "id": "open-source-ai",
        "name": "Open source AI",
        "description": "Releases and debates around open-weight and open-source models.",
        "keywords": ["open source", "open weight", "local model"],
        "priority": "medium",
        "action": "knowledge"
    }
]"#;

/// Reads `<state_dir>/research_goals.json`, writing the built-in default
/// set on first run. JSON rather than YAML, to match this engine's one
/// config-format policy instead of adding a YAML dependency for a single
/// file.
pub async fn load_or_init_research_goals(state_dir: &Path) -> anyhow::Result<Vec<ResearchGoal>> {
    let path = state_dir.join("research_goals.json");
    match fs::read_to_string(&path).await {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(_) => {
            fs::create_dir_all(state_dir).await?;
            fs::write(&path, DEFAULT_RESEARCH_GOALS).await?;
            Ok(serde_json::from_str(DEFAULT_RESEARCH_GOALS)?)
        }
    }
}

/// CLI flag > `SENTRYPOST_STATE_DIR` env var > `.sentrypost` default.
pub fn resolve_state_dir(flag: Option<String>) -> PathBuf {
    if let Some(dir) = flag {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("SENTRYPOST_STATE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    PathBuf::from(".sentrypost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_state_dir_prefers_flag_over_env() {
        std::env::set_var("SENTRYPOST_STATE_DIR", "/tmp/from-env");
        let resolved = resolve_state_dir(Some("/tmp/from-flag".to_string()));
        assert_eq!(resolved, PathBuf::from("/tmp/from-flag"));
        std::env::remove_var("SENTRYPOST_STATE_DIR");
    }

    #[tokio::test]
    async fn load_or_init_writes_default_on_first_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig::load_or_init(dir.path()).await.unwrap();
        assert_eq!(config.port, default_port());
        assert!(dir.path().join("config.json").exists());
    }

    #[tokio::test]
    async fn research_goals_default_to_built_in_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let goals = load_or_init_research_goals(dir.path()).await.unwrap();
        assert!(!goals.is_empty());
        assert!(dir.path().join("research_goals.json").exists());
    }
}
