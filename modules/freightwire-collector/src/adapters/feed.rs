//! RSS/Atom feed adapter.

use async_trait::async_trait;
use tracing::{debug, info};

use freightwire_common::error::Result;
use freightwire_common::text::clean_text;
use freightwire_common::{FreightwireError, ParserConfig, RawArticle, Source};

use crate::extract::extract_page;

use super::{http_client, FetchOutcome, SourceAdapter};

const DEFAULT_MAX_ITEMS: usize = 20;

/// Minimum usable length for an RSS summary standing in for a full body.
const MIN_SUMMARY_LEN: usize = 50;

pub struct FeedAdapter {
    client: reqwest::Client,
}

impl Default for FeedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }

    /// Fetch and parse a feed URL into raw articles. Also used by the
    /// universal adapter once it has discovered a feed.
    pub async fn fetch_feed(
        &self,
        feed_url: &str,
        max_items: usize,
        fetch_full_text: bool,
    ) -> Result<FetchOutcome> {
        let resp = self
            .client
            .get(feed_url)
            .send()
            .await
            .map_err(|e| FreightwireError::Network(format!("feed fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(FreightwireError::Network(format!(
                "feed fetch failed: HTTP {} from {feed_url}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FreightwireError::Network(format!("feed body read failed: {e}")))?;

        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| FreightwireError::Parse(format!("feed parse failed: {e}")))?;

        let mut outcome = FetchOutcome::default();

        for entry in feed.entries.into_iter().take(max_items) {
            let url = match entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
            {
                Some(u) => u,
                None => {
                    outcome.errors.push("entry without a link skipped".to_string());
                    continue;
                }
            };

            let title = match entry.title.as_ref().map(|t| t.content.trim().to_string()) {
                Some(t) if !t.is_empty() => t,
                _ => {
                    outcome.errors.push(format!("entry without a title skipped: {url}"));
                    continue;
                }
            };

            let published_at = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.with_timezone(&chrono::Utc));

            let summary = entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .or_else(|| {
                    entry
                        .content
                        .as_ref()
                        .and_then(|c| c.body.clone())
                });

            let mut article = RawArticle::new(url.clone(), title);
            article.published_at = published_at;
            article.author = entry.authors.first().map(|a| a.name.clone());

            if fetch_full_text {
                match self.fetch_article_body(&url).await {
                    Ok((markdown, text)) => {
                        article.body_markdown = markdown;
                        article.body_text = text;
                    }
                    Err(e) => {
                        debug!(url, error = %e, "full-text fetch failed, falling back to summary");
                        outcome.errors.push(format!("{url}: {e}"));
                    }
                }
            }

            // Fallback: the feed's own summary, when it carries real content.
            if article.body_text.is_none() {
                if let Some(clean) = summary.as_deref().and_then(clean_text) {
                    if clean.len() >= MIN_SUMMARY_LEN {
                        article.body_markdown = Some(clean.clone());
                        article.body_text = Some(clean);
                    }
                }
            }

            outcome.articles.push(article);
        }

        info!(
            feed_url,
            items = outcome.articles.len(),
            errors = outcome.errors.len(),
            "feed: parsed"
        );

        Ok(outcome)
    }

    async fn fetch_article_body(&self, url: &str) -> Result<(Option<String>, Option<String>)> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FreightwireError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FreightwireError::Network(format!("HTTP {}", resp.status())));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| FreightwireError::Network(e.to_string()))?;

        Ok(extract_page(&html, url))
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        let (max_items, fetch_full_text) = match &source.parser_config.0 {
            ParserConfig::Feed(cfg) => (
                cfg.max_items.unwrap_or(DEFAULT_MAX_ITEMS),
                cfg.fetch_full_text.unwrap_or(true),
            ),
            _ => (DEFAULT_MAX_ITEMS, true),
        };

        self.fetch_feed(&source.url, max_items, fetch_full_text).await
    }
}
