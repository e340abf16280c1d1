use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sentrypost_types::ResearchItem;

use crate::scraper::Scraper;

/// A single configured feed. Analogous to one entry of the Python source's
/// `config/research_goals.yaml::sources.rss.feeds` list.
#[derive(Debug, Clone)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

/// Scrapes RSS 2.0 / Atom feeds, extracting items with `regex` rather
/// than a full XML parser. Feeds that don't cleanly match the
/// `<item>`/`<entry>` shape simply yield no items.
pub struct RssScraper {
    client: reqwest::Client,
    feeds: Vec<FeedSource>,
    item_re: Regex,
    entry_re: Regex,
    tag_re: Regex,
}

impl RssScraper {
    pub fn new(feeds: Vec<FeedSource>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            feeds,
            item_re: Regex::new(r"(?s)<item>(.*?)</item>").unwrap(),
            entry_re: Regex::new(r"(?s)<entry>(.*?)</entry>").unwrap(),
            tag_re: Regex::new(r"(?s)<[^>]+>").unwrap(),
        }
    }

    async fn scrape_feed(&self, feed: &FeedSource) -> anyhow::Result<Vec<ResearchItem>> {
        let body = self.client.get(&feed.url).send().await?.text().await?;

        let mut items: Vec<ResearchItem> = self
            .item_re
            .captures_iter(&body)
            .filter_map(|cap| self.parse_block(&cap[1], &feed.name))
            .collect();

        if items.is_empty() {
            items = self
                .entry_re
                .captures_iter(&body)
                .filter_map(|cap| self.parse_block(&cap[1], &feed.name))
                .collect();
        }

        Ok(items)
    }

    fn parse_block(&self, block: &str, feed_name: &str) -> Option<ResearchItem> {
        let title = self.extract_tag(block, "title")?;
        let link = self
            .extract_tag(block, "link")
            .or_else(|| self.extract_atom_link(block))?;
        if title.is_empty() || link.is_empty() {
            return None;
        }

        let description = self
            .extract_tag(block, "description")
            .or_else(|| self.extract_tag(block, "summary"))
            .or_else(|| self.extract_tag(block, "content"))
            .unwrap_or_default();
        let guid = self.extract_tag(block, "guid").unwrap_or_else(|| link.clone());
        let pub_date = self
            .extract_tag(block, "pubDate")
            .or_else(|| self.extract_tag(block, "published"))
            .and_then(|s| parse_feed_date(&s));

        Some(ResearchItem::unevaluated(
            "rss",
            format!("{feed_name}:{guid}"),
            link,
            title,
            clean_html(&description),
            pub_date,
        ))
    }

    fn extract_tag(&self, block: &str, tag: &str) -> Option<String> {
        let re = Regex::new(&format!(r"(?s)<{tag}[^>]*>(.*?)</{tag}>")).ok()?;
        re.captures(block)
            .map(|c| strip_cdata(c[1].trim()))
            .filter(|s| !s.is_empty())
    }

    fn extract_atom_link(&self, block: &str) -> Option<String> {
        let re = Regex::new(r#"<link[^>]*href="([^"]+)"[^>]*/?>"#).ok()?;
        re.captures(block).map(|c| c[1].to_string())
    }
}

#[async_trait]
impl Scraper for RssScraper {
    fn name(&self) -> &str {
        "rss"
    }

    async fn scrape(&self) -> anyhow::Result<Vec<ResearchItem>> {
        let mut items = Vec::new();
        for feed in &self.feeds {
            match self.scrape_feed(feed).await {
                Ok(found) => items.extend(found),
                Err(e) => tracing::warn!(feed = %feed.name, error = %e, "rss scrape failed"),
            }
        }
        Ok(items)
    }
}

fn strip_cdata(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("<![CDATA[")
        .trim_end_matches("]]>")
        .to_string()
}

fn clean_html(raw: &str) -> String {
    let re = Regex::new(r"(?s)<[^>]+>").unwrap();
    re.replace_all(raw, "").trim().to_string()
}

fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc3339(raw.trim()).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rss_2_0_item_block() {
        let scraper = RssScraper::new(vec![]);
        let block = r#"
            <title>Big CBDC Announcement</title>
            <link>https://example.com/a</link>
            <description><![CDATA[Some <b>HTML</b> content]]></description>
            <pubDate>Tue, 10 Jun 2025 09:00:00 GMT</pubDate>
            <guid>abc-123</guid>
        "#;
        let item = scraper.parse_block(block, "Example Feed").unwrap();
        assert_eq!(item.title, "Big CBDC Announcement");
        assert_eq!(item.url, "https://example.com/a");
        assert_eq!(item.source_id, "Example Feed:abc-123");
        assert_eq!(item.content, "Some HTML content");
        assert!(item.published_at.is_some());
    }

    #[test]
    fn missing_title_or_link_is_dropped() {
        let scraper = RssScraper::new(vec![]);
        assert!(scraper.parse_block("<description>no title here</description>", "feed").is_none());
    }

    #[test]
    fn atom_entry_link_href_is_extracted() {
        let scraper = RssScraper::new(vec![]);
        let block = r#"
            <title>Atom Entry</title>
            <link href="https://example.com/b" rel="alternate"/>
            <summary>summary text</summary>
            <published>2025-06-10T09:00:00Z</published>
        "#;
        let item = scraper.parse_block(block, "Atom Feed").unwrap();
        assert_eq!(item.url, "https://example.com/b");
        assert_eq!(item.content, "summary text");
    }
}
