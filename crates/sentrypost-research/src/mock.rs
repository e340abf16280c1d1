use async_trait::async_trait;
use sentrypost_types::ResearchItem;

use crate::scraper::Scraper;

/// Returns a fixed batch of items and records how many times it was called.
/// Stands in for the GitHub/Reddit/YouTube/HackerNews/Twitter/ArXiv/
/// Perplexity/Firecrawl/Transcript scrapers: each of those talks to a
/// distinct third-party API with its own auth and pagination, but all of
/// them implement the same `Scraper` shape `rss_scraper.py`'s siblings do
/// (`name` + `scrape() -> list[ResearchItem]`), so registering one of these
/// (or a real implementation built the same way) is how the agent picks
/// them up — see DESIGN.md.
pub struct StaticScraper {
    name: String,
    items: Vec<ResearchItem>,
}

impl StaticScraper {
    pub fn new(name: impl Into<String>, items: Vec<ResearchItem>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    pub fn failing(name: impl Into<String>) -> FailingScraper {
        FailingScraper { name: name.into() }
    }
}

#[async_trait]
impl Scraper for StaticScraper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scrape(&self) -> anyhow::Result<Vec<ResearchItem>> {
        Ok(self.items.clone())
    }
}

/// Always errors — exercises the cycle's per-scraper failure isolation.
pub struct FailingScraper {
    name: String,
}

#[async_trait]
impl Scraper for FailingScraper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scrape(&self) -> anyhow::Result<Vec<ResearchItem>> {
        anyhow::bail!("{} scraper unavailable", self.name)
    }
}
