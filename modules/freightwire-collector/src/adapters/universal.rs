//! Zero-config universal adapter for unknown sites.
//!
//! Strategy cascade, first success wins:
//! 1. Feed autodiscovery: `<link rel="alternate">` tags plus common paths.
//! 2. Heuristic page scan for feed-shaped hrefs.
//! 3. Article-link extraction from the landing page with Readability.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use freightwire_common::error::Result;
use freightwire_common::{FreightwireError, ParserConfig, RawArticle, Source};

use crate::extract::extract_page;

use super::{http_client, FeedAdapter, FetchOutcome, SourceAdapter};

/// Hard cap on strategy-3 page fetches per cycle.
const MAX_PAGE_FETCHES: usize = 20;

const COMMON_FEED_PATHS: &[&str] = &[
    "/feed",
    "/rss",
    "/atom.xml",
    "/feed.xml",
    "/rss.xml",
    "/index.xml",
];

static NON_ARTICLE_SEGMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)/(tag|category|categories|author|page|search|login|signup|register|contact",
        r"|about|privacy|terms|faq|help|archive|archives|wp-content|wp-admin",
        r"|cdn-cgi|static|assets|images|img|css|js|fonts)(/|$)",
    ))
    .expect("valid regex")
});

static NON_ARTICLE_EXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(png|jpe?g|gif|svg|webp|ico|css|js|woff2?|ttf|eot|pdf|zip|gz|mp[34]|mov)$")
        .expect("valid regex")
});

static YEAR_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\d{4}/").expect("valid regex"));
static SLUG_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/[a-z0-9]+-[a-z0-9]+-").expect("valid regex"));
static NUMERIC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\d{3,}").expect("valid regex"));

pub struct UniversalAdapter {
    client: reqwest::Client,
    feed: FeedAdapter,
}

impl Default for UniversalAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl UniversalAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            feed: FeedAdapter::new(),
        }
    }

    /// Fetch from an arbitrary site URL, capped at `max_articles`.
    pub async fn fetch_url(&self, url: &str, max_articles: usize) -> Result<FetchOutcome> {
        let page_html = self.get_text(url).await.ok();

        // Strategy 1: feed autodiscovery.
        if let Some(feed_url) = self.discover_feed(url, page_html.as_deref()).await {
            debug!(url, feed_url, "universal: feed autodiscovery hit");
            let mut outcome = self.feed.fetch_feed(&feed_url, max_articles, true).await?;
            tag_strategy(&mut outcome, "feed_autodiscovery");
            info!(url, articles = outcome.articles.len(), strategy = "feed_autodiscovery", "universal: fetched");
            return Ok(outcome);
        }

        // Strategy 2: heuristic scan of the page for feed-shaped hrefs.
        if let Some(html) = &page_html {
            for candidate in scan_for_feed_hrefs(html, url) {
                if self.is_valid_feed(&candidate).await {
                    debug!(url, feed_url = candidate, "universal: feed href scan hit");
                    let mut outcome =
                        self.feed.fetch_feed(&candidate, max_articles, true).await?;
                    tag_strategy(&mut outcome, "feed_href_scan");
                    info!(url, articles = outcome.articles.len(), strategy = "feed_href_scan", "universal: fetched");
                    return Ok(outcome);
                }
            }
        }

        // Strategy 3: extract article links from the landing page.
        let html = match page_html {
            Some(html) => html,
            None => {
                return Err(FreightwireError::Network(format!(
                    "landing page fetch failed: {url}"
                )))
            }
        };

        let candidates = collect_article_links(&html, url);
        let mut outcome = FetchOutcome::default();

        for (link_url, link_text) in candidates
            .into_iter()
            .take(max_articles.min(MAX_PAGE_FETCHES))
        {
            match self.extract_article(&link_url, &link_text).await {
                Ok(Some(article)) => outcome.articles.push(article),
                Ok(None) => {}
                Err(e) => outcome.errors.push(format!("{link_url}: {e}")),
            }
        }

        info!(url, articles = outcome.articles.len(), strategy = "page_extraction", "universal: fetched");
        Ok(outcome)
    }

    /// Find a working feed URL for a site (strategies 1 + 2 only). The
    /// discovery validator uses this to classify candidates.
    pub async fn find_feed_url(&self, url: &str) -> Option<String> {
        let html = self.get_text(url).await.ok();
        if let Some(found) = self.discover_feed(url, html.as_deref()).await {
            return Some(found);
        }
        if let Some(html) = &html {
            for candidate in scan_for_feed_hrefs(html, url) {
                if self.is_valid_feed(&candidate).await {
                    return Some(candidate);
                }
            }
        }
        None
    }

    async fn discover_feed(&self, url: &str, html: Option<&str>) -> Option<String> {
        if let Some(html) = html {
            for link in feed_link_tags(html, url) {
                if self.is_valid_feed(&link).await {
                    return Some(link);
                }
            }
        }

        let base = Url::parse(url).ok()?;
        let root = format!("{}://{}", base.scheme(), base.host_str()?);
        for path in COMMON_FEED_PATHS {
            let candidate = format!("{root}{path}");
            if self.is_valid_feed(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    /// Sniff whether a URL serves RSS/Atom content.
    async fn is_valid_feed(&self, feed_url: &str) -> bool {
        match self.get_text(feed_url).await {
            Ok(text) => {
                let head: String = text.chars().take(2000).collect();
                head.contains("<rss") || head.contains("<feed") || head.to_lowercase().contains("<rdf")
            }
            Err(_) => false,
        }
    }

    async fn extract_article(&self, url: &str, link_text: &str) -> Result<Option<RawArticle>> {
        let html = self.get_text(url).await?;
        let (markdown, text) = extract_page(&html, url);
        let Some(text) = text else {
            return Ok(None);
        };

        let title = page_title(&html)
            .or_else(|| (!link_text.is_empty()).then(|| link_text.to_string()));
        let Some(title) = title else {
            return Ok(None);
        };

        let mut article = RawArticle::new(url, title);
        article.body_markdown = markdown;
        article.body_text = Some(text);
        article.metadata = serde_json::json!({ "adapter": "universal", "strategy": "page_extraction" });
        Ok(Some(article))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FreightwireError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FreightwireError::Network(format!("HTTP {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| FreightwireError::Network(e.to_string()))
    }
}

#[async_trait]
impl SourceAdapter for UniversalAdapter {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        let max_articles = match &source.parser_config.0 {
            ParserConfig::Universal(cfg) => cfg.max_articles.unwrap_or(MAX_PAGE_FETCHES),
            _ => MAX_PAGE_FETCHES,
        };
        self.fetch_url(&source.url, max_articles).await
    }
}

fn tag_strategy(outcome: &mut FetchOutcome, strategy: &str) {
    for article in &mut outcome.articles {
        article.metadata = serde_json::json!({ "adapter": "universal", "strategy": strategy });
    }
}

/// `<link rel="alternate" type="application/rss+xml|atom+xml">` hrefs,
/// absolutized against the page URL.
fn feed_link_tags(html: &str, page_url: &str) -> Vec<String> {
    let selector = Selector::parse(
        r#"link[rel="alternate"][type="application/rss+xml"], link[rel="alternate"][type="application/atom+xml"]"#,
    )
    .expect("static selector");

    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|u| u.to_string())
        .collect()
}

/// Anchors whose href looks like a feed URL.
fn scan_for_feed_hrefs(html: &str, page_url: &str) -> Vec<String> {
    static FEED_HREF: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)(/feed/?$|/rss/?$|\.xml$|/atom/?$|feed\.xml|rss\.xml)").expect("valid regex")
    });

    let anchor = Selector::parse("a[href]").expect("static selector");
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut seen = std::collections::HashSet::new();
    document
        .select(&anchor)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| FEED_HREF.is_match(href))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|u| u.to_string())
        .filter(|u| seen.insert(u.clone()))
        .take(5)
        .collect()
}

/// Heuristic filter separating article URLs from navigation.
fn looks_like_article_url(url: &Url, base_domain: &str) -> bool {
    let host = url.host_str().unwrap_or_default();
    if !host.ends_with(base_domain) {
        return false;
    }

    let path = url.path();
    if path.is_empty() || path == "/" {
        return false;
    }
    if NON_ARTICLE_EXT.is_match(path) || NON_ARTICLE_SEGMENTS.is_match(path) {
        return false;
    }

    // Article paths run at least two segments deep (/news/some-story).
    let depth = path.split('/').filter(|s| !s.is_empty()).count();
    if depth < 2 {
        return false;
    }

    YEAR_SEGMENT.is_match(path)
        || SLUG_SEGMENT.is_match(path)
        || NUMERIC_ID.is_match(path)
        || path.ends_with(".html")
        || path.ends_with(".htm")
        || depth >= 2
}

/// Collect candidate article links from a landing page, deduplicated in
/// document order.
fn collect_article_links(html: &str, page_url: &str) -> Vec<(String, String)> {
    let anchor = Selector::parse("a[href]").expect("static selector");
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let base_domain = base
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_string())
        .unwrap_or_default();

    let document = Html::parse_document(html);
    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for el in document.select(&anchor) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = base.join(href.trim()) else {
            continue;
        };
        resolved.set_fragment(None);
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        if !looks_like_article_url(&resolved, &base_domain) {
            continue;
        }

        let text = el.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            continue;
        }

        let url = resolved.to_string();
        if seen.insert(url.clone()) {
            links.push((url, text));
        }
    }

    links
}

fn page_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").expect("static selector");
    let document = Html::parse_document(html);
    let title = document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())?;
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn finds_feed_link_tags() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/feed.xml">
        </head></html>"#;
        let feeds = feed_link_tags(html, "https://example.com/news");
        assert_eq!(feeds, vec!["https://example.com/feed.xml"]);
    }

    #[test]
    fn feed_link_tags_absent() {
        assert!(feed_link_tags("<html></html>", "https://example.com").is_empty());
    }

    #[test]
    fn scans_feed_shaped_hrefs() {
        let html = r#"<a href="/rss">RSS</a> <a href="/about">About</a>"#;
        let feeds = scan_for_feed_hrefs(html, "https://example.com");
        assert_eq!(feeds, vec!["https://example.com/rss"]);
    }

    #[test]
    fn article_url_with_slug_accepted() {
        assert!(looks_like_article_url(
            &url("https://example.com/news/rates-surge-again"),
            "example.com"
        ));
    }

    #[test]
    fn article_url_with_year_accepted() {
        assert!(looks_like_article_url(
            &url("https://example.com/2026/03/story"),
            "example.com"
        ));
    }

    #[test]
    fn category_index_rejected() {
        assert!(!looks_like_article_url(
            &url("https://example.com/category/shipping"),
            "example.com"
        ));
    }

    #[test]
    fn shallow_path_rejected() {
        assert!(!looks_like_article_url(
            &url("https://example.com/news"),
            "example.com"
        ));
    }

    #[test]
    fn asset_rejected() {
        assert!(!looks_like_article_url(
            &url("https://example.com/img/logo-large-2x.png"),
            "example.com"
        ));
    }

    #[test]
    fn cross_domain_rejected() {
        assert!(!looks_like_article_url(
            &url("https://other.com/news/rates-surge-again"),
            "example.com"
        ));
    }

    #[test]
    fn collects_and_dedups_article_links() {
        let html = r#"
            <a href="/news/rates-surge-again">Rates surge</a>
            <a href="/news/rates-surge-again#comments">Rates surge</a>
            <a href="/category/ocean">Ocean</a>
            <a href="https://example.com/2026/01/port-update">Port update</a>
        "#;
        let links = collect_article_links(html, "https://example.com");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].0, "https://example.com/news/rates-surge-again");
    }

    #[test]
    fn extracts_page_title() {
        assert_eq!(
            page_title("<html><head><title> Rates surge </title></head></html>").as_deref(),
            Some("Rates surge")
        );
        assert!(page_title("<html></html>").is_none());
    }
}
