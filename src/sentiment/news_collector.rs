// =============================================================================
// RSS headline collector
// =============================================================================
//
// Pulls headlines from a fixed list of economy / stock-market RSS feeds,
// deduplicates by URL, and returns them newest-first. A failing source is
// logged and skipped; the collection never fails as a whole.
// =============================================================================

use std::collections::HashSet;
use std::io::Cursor;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rss::Channel;
use serde::Serialize;
use tracing::{info, warn};

/// Feed URLs polled on every collection.
pub const DEFAULT_SOURCES: [&str; 7] = [
    // Global economy
    "https://rss.nytimes.com/services/xml/rss/nyt/Business.xml",
    "https://feeds.bbci.co.uk/news/business/rss.xml",
    // Domestic economy
    "https://www.hankyung.com/feed/economy",
    "https://www.mk.co.kr/rss/30100041/",
    "https://www.yna.co.kr/rss/economy.xml",
    // Stock-market keyword searches
    "https://news.google.com/rss/search?q=kospi+market&hl=ko&gl=KR&ceid=KR:ko",
    "https://news.google.com/rss/search?q=stock+outlook&hl=ko&gl=KR&ceid=KR:ko",
];

/// One collected headline.
#[derive(Debug, Clone, Serialize)]
pub struct NewsHeadline {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub category: String,
}

/// Category for a feed URL.
fn source_category(url: &str) -> &'static str {
    if url.contains("news.google.com/rss/search") {
        return "stock_market";
    }
    if url.contains("nytimes.com") || url.contains("bbci.co.uk") {
        return "global_economy";
    }
    if url.contains("hankyung.com") || url.contains("mk.co.kr") || url.contains("yna.co.kr") {
        return "domestic_economy";
    }
    "general"
}

/// Collects headlines from the configured RSS feeds.
pub struct NewsCollector {
    http: reqwest::Client,
    sources: Vec<String>,
}

impl NewsCollector {
    pub fn new() -> Self {
        Self::with_sources(DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_sources(sources: Vec<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to build reqwest client");
        Self { http, sources }
    }

    /// Collect headlines across all sources. Per-source failures are logged
    /// and skipped; the result is URL-deduplicated and sorted newest-first.
    pub async fn fetch_headlines(&self) -> Vec<NewsHeadline> {
        let mut headlines = Vec::new();

        for url in &self.sources {
            match self.fetch_single(url).await {
                Ok(mut batch) => headlines.append(&mut batch),
                Err(err) => warn!(source = %url, error = %err, "RSS fetch failed, skipping source"),
            }
        }

        let headlines = dedup_and_sort(headlines);
        info!(count = headlines.len(), "news headlines collected");
        headlines
    }

    async fn fetch_single(&self, url: &str) -> anyhow::Result<Vec<NewsHeadline>> {
        let bytes = self
            .http
            .get(url)
            .header("User-Agent", "meridian-trader/1.0")
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let channel = Channel::read_from(Cursor::new(bytes))?;
        Ok(parse_channel(&channel, url))
    }
}

impl Default for NewsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a parsed RSS channel to headlines. The entry's own category tag wins
/// over the source-level category when present.
fn parse_channel(channel: &Channel, url: &str) -> Vec<NewsHeadline> {
    let source_title = if channel.title().is_empty() {
        url.to_string()
    } else {
        channel.title().to_string()
    };
    let fallback_category = source_category(url);

    channel
        .items()
        .iter()
        .map(|item| {
            let published_at = item
                .pub_date()
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            let category = item
                .categories()
                .first()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| fallback_category.to_string());

            NewsHeadline {
                title: item.title().unwrap_or_default().to_string(),
                source: source_title.clone(),
                url: item.link().unwrap_or_default().to_string(),
                published_at,
                category,
            }
        })
        .collect()
}

/// Deduplicate by URL (first occurrence wins) and sort newest-first.
pub fn dedup_and_sort(headlines: Vec<NewsHeadline>) -> Vec<NewsHeadline> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<NewsHeadline> = headlines
        .into_iter()
        .filter(|h| seen.insert(h.url.clone()))
        .collect();
    out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    out
}
