use async_trait::async_trait;
use sentrypost_types::ResearchItem;

/// One external source of research items: a `name` and an async
/// `scrape()` that never raises past its own boundary. The research
/// cycle swallows per-scraper failures and keeps going, so `scrape`
/// returns a `Result` the caller logs and discards rather than one that
/// aborts the whole cycle.
#[async_trait]
pub trait Scraper: Send + Sync {
    fn name(&self) -> &str;
    async fn scrape(&self) -> anyhow::Result<Vec<ResearchItem>>;
}
