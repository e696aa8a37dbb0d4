//! Source adapters. Each adapter turns one `Source` into raw articles and
//! never touches the store; the scheduler owns persistence and deadlines.

mod api;
mod feed;
mod scraper;
mod universal;

pub use api::ApiAdapter;
pub use feed::FeedAdapter;
pub use scraper::ScraperAdapter;
pub use universal::UniversalAdapter;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use freightwire_common::error::Result;
use freightwire_common::{FreightwireError, ParserConfig, RawArticle, Source, SourceKind};

pub const USER_AGENT: &str = "freightwire/0.1 (+https://freightwire.dev; news aggregation bot)";

/// Per-request timeout inside an adapter; the scheduler applies the overall
/// fetch deadline on top.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one adapter fetch: best-effort articles plus the per-entry
/// errors that didn't abort the run. A fetch-level failure is returned as an
/// error instead and never conflated with "zero new articles".
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub articles: Vec<RawArticle>,
    pub errors: Vec<String>,
}

impl FetchOutcome {
    pub fn new(articles: Vec<RawArticle>) -> Self {
        Self {
            articles,
            errors: Vec::new(),
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome>;
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .expect("Failed to build adapter HTTP client")
}

/// The four adapters behind one dispatch point.
pub struct AdapterPlane {
    feed: FeedAdapter,
    api: ApiAdapter,
    scraper: ScraperAdapter,
    universal: UniversalAdapter,
}

impl Default for AdapterPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterPlane {
    pub fn new() -> Self {
        Self {
            feed: FeedAdapter::new(),
            api: ApiAdapter::new(),
            scraper: ScraperAdapter::new(),
            universal: UniversalAdapter::new(),
        }
    }

    /// Dispatch a fetch by source kind, checking that the stored parser
    /// configuration matches the declared kind.
    pub async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        match (source.kind, &source.parser_config.0) {
            (SourceKind::Feed, ParserConfig::Feed(_)) | (SourceKind::Feed, ParserConfig::Universal(_)) => {
                self.feed.fetch(source).await
            }
            (SourceKind::Api, ParserConfig::Api(_)) => self.api.fetch(source).await,
            (SourceKind::Scraper, ParserConfig::Scraper(_)) => self.scraper.fetch(source).await,
            (SourceKind::Universal, _) => self.universal.fetch(source).await,
            (kind, _) => Err(FreightwireError::Config(format!(
                "source {} declares kind {kind} but its parser_config does not match",
                source.source_id
            ))),
        }
    }
}

/// Parse a timestamp from the loose formats APIs and pages emit.
pub(crate) fn parse_date_flexible(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }

    None
}

/// Parse with an explicit strptime-style format first, falling back to the
/// flexible parser.
pub(crate) fn parse_date_with_format(raw: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    if let Some(fmt) = format {
        if let Ok(dt) = DateTime::parse_from_str(raw.trim(), fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw.trim(), fmt) {
            return Some(naive.and_utc());
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), fmt) {
            return date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        }
    }
    parse_date_flexible(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339() {
        let dt = parse_date_flexible("2026-03-01T12:30:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-03-01T12:30:00+00:00");
    }

    #[test]
    fn parses_rfc2822() {
        assert!(parse_date_flexible("Tue, 03 Mar 2026 09:00:00 GMT").is_some());
    }

    #[test]
    fn parses_date_only() {
        let dt = parse_date_flexible("2026-03-01").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2026-03-01 00:00");
    }

    #[test]
    fn parses_long_form() {
        assert!(parse_date_flexible("March 1, 2026").is_some());
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_date_flexible("tomorrow-ish").is_none());
        assert!(parse_date_flexible("").is_none());
    }

    #[test]
    fn explicit_format_wins() {
        let dt = parse_date_with_format("01.03.2026", Some("%d.%m.%Y")).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2026-03-01");
    }
}
