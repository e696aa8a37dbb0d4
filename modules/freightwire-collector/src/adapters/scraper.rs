//! CSS-selector scraping adapter for sites without feeds or APIs.

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use freightwire_common::error::Result;
use freightwire_common::{FreightwireError, ParserConfig, RawArticle, ScraperConfig, Source};

use crate::extract::extract_page;

use super::{http_client, parse_date_with_format, FetchOutcome, SourceAdapter};

const DEFAULT_MAX_ARTICLES: usize = 20;

pub struct ScraperAdapter {
    client: reqwest::Client,
}

impl Default for ScraperAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScraperAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }

    async fn scrape(&self, index_url: &str, cfg: &ScraperConfig) -> Result<FetchOutcome> {
        let resp = self
            .client
            .get(index_url)
            .send()
            .await
            .map_err(|e| FreightwireError::Network(format!("index fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(FreightwireError::Network(format!(
                "index fetch failed: HTTP {} from {index_url}",
                resp.status()
            )));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| FreightwireError::Network(e.to_string()))?;

        let base = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| derive_base_url(index_url));

        // Parse and extract links in one sync scope; the DOM is not Send and
        // must not live across an await.
        let links = collect_links(&html, &cfg.list_selector, &base)?;

        if links.is_empty() {
            debug!(index_url, selector = %cfg.list_selector, "no article links matched");
            return Ok(FetchOutcome::default());
        }

        let max = cfg.max_articles.unwrap_or(DEFAULT_MAX_ARTICLES);
        let mut outcome = FetchOutcome::default();

        for (link_url, link_text) in links.into_iter().take(max) {
            match self.scrape_article(&link_url, &link_text, cfg).await {
                Ok(Some(article)) => outcome.articles.push(article),
                Ok(None) => {}
                Err(e) => outcome.errors.push(format!("{link_url}: {e}")),
            }
        }

        info!(
            index_url,
            articles = outcome.articles.len(),
            errors = outcome.errors.len(),
            "scraper: fetched"
        );

        Ok(outcome)
    }

    async fn scrape_article(
        &self,
        url: &str,
        link_text: &str,
        cfg: &ScraperConfig,
    ) -> Result<Option<RawArticle>> {
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

        let selected = select_detail_fields(&html, cfg)?;

        let title = selected
            .title
            .or_else(|| (!link_text.is_empty()).then(|| link_text.to_string()));
        let title = match title {
            Some(t) => t,
            None => return Ok(None),
        };

        let mut article = RawArticle::new(url, title);
        article.published_at = selected
            .date
            .as_deref()
            .and_then(|d| parse_date_with_format(d, cfg.date_format.as_deref()));

        if let Some(body) = selected.body {
            article.body_markdown = Some(body.clone());
            article.body_text = Some(body);
        } else {
            // Detail selectors didn't resolve; fall back to Readability.
            let (markdown, text) = extract_page(&html, url);
            article.body_markdown = markdown;
            article.body_text = text;
        }

        if article.body_text.is_none() {
            return Ok(None);
        }

        article.metadata = serde_json::json!({ "adapter": "scraper" });
        Ok(Some(article))
    }
}

#[async_trait]
impl SourceAdapter for ScraperAdapter {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        let cfg = match &source.parser_config.0 {
            ParserConfig::Scraper(cfg) => cfg,
            _ => {
                return Err(FreightwireError::Config(format!(
                    "source {} has no scraper parser config",
                    source.source_id
                )))
            }
        };
        self.scrape(&source.url, cfg).await
    }
}

struct DetailFields {
    title: Option<String>,
    body: Option<String>,
    date: Option<String>,
}

fn parse_selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw)
        .map_err(|e| FreightwireError::Config(format!("invalid CSS selector '{raw}': {e}")))
}

/// Collect (absolute_url, link_text) pairs matched by the list selector,
/// deduplicated in document order.
fn collect_links(html: &str, list_selector: &str, base_url: &str) -> Result<Vec<(String, String)>> {
    let selector = parse_selector(list_selector)?;
    let anchor = Selector::parse("a[href]").expect("static selector");
    let base = Url::parse(base_url)
        .map_err(|e| FreightwireError::Config(format!("invalid base url '{base_url}': {e}")))?;

    let document = Html::parse_document(html);
    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let a = if element.value().name() == "a" {
            Some(element)
        } else {
            element.select(&anchor).next()
        };
        let Some(a) = a else { continue };
        let Some(href) = a.value().attr("href") else {
            continue;
        };

        let Ok(resolved) = base.join(href.trim()) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }

        let url = resolved.to_string();
        if seen.insert(url.clone()) {
            let text = a.text().collect::<String>().trim().to_string();
            links.push((url, text));
        }
    }

    Ok(links)
}

fn select_detail_fields(html: &str, cfg: &ScraperConfig) -> Result<DetailFields> {
    let document = Html::parse_document(html);

    let select_text = |raw: &str| -> Result<Option<String>> {
        let selector = parse_selector(raw)?;
        Ok(document.select(&selector).next().map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        }))
    };

    let title = match &cfg.title_selector {
        Some(s) => select_text(s)?.filter(|t| !t.is_empty()),
        None => None,
    };
    let body = match &cfg.body_selector {
        Some(s) => select_text(s)?.filter(|b| !b.is_empty()),
        None => None,
    };
    let date = match &cfg.date_selector {
        Some(s) => select_text(s)?.filter(|d| !d.is_empty()),
        None => None,
    };

    Ok(DetailFields { title, body, date })
}

fn derive_base_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => format!("{}://{}", u.scheme(), u.host_str().unwrap_or_default()),
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
        <html><body>
          <div class="headline"><a href="/news/rates-surge">Rates surge</a></div>
          <div class="headline"><a href="/news/port-strike">Port strike looms</a></div>
          <div class="headline"><a href="/news/rates-surge">Rates surge (dup)</a></div>
          <div class="other"><a href="/about">About</a></div>
          <div class="headline"><a href="mailto:x@y.com">Mail</a></div>
        </body></html>
    "#;

    #[test]
    fn collects_matching_links_absolutized() {
        let links = collect_links(INDEX, ".headline a", "https://example.com").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].0, "https://example.com/news/rates-surge");
        assert_eq!(links[0].1, "Rates surge");
        assert_eq!(links[1].0, "https://example.com/news/port-strike");
    }

    #[test]
    fn container_selector_finds_inner_anchor() {
        let links = collect_links(INDEX, "div.headline", "https://example.com").unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn non_http_schemes_skipped() {
        let links = collect_links(INDEX, ".headline a", "https://example.com").unwrap();
        assert!(links.iter().all(|(u, _)| u.starts_with("https://")));
    }

    #[test]
    fn invalid_selector_is_config_error() {
        assert!(collect_links(INDEX, "[[[", "https://example.com").is_err());
    }

    #[test]
    fn detail_selectors_extract_fields() {
        let html = r#"
            <article>
              <h1 class="title">Rates surge</h1>
              <time class="date">2026-03-01</time>
              <div class="content"><p>Spot rates rose.</p><p>More detail.</p></div>
            </article>
        "#;
        let cfg = ScraperConfig {
            list_selector: "a".to_string(),
            title_selector: Some("h1.title".to_string()),
            body_selector: Some("div.content".to_string()),
            date_selector: Some("time.date".to_string()),
            date_format: None,
            base_url: None,
            max_articles: None,
        };
        let fields = select_detail_fields(html, &cfg).unwrap();
        assert_eq!(fields.title.as_deref(), Some("Rates surge"));
        assert_eq!(fields.body.as_deref(), Some("Spot rates rose. More detail."));
        assert_eq!(fields.date.as_deref(), Some("2026-03-01"));
    }

    #[test]
    fn derive_base() {
        assert_eq!(
            derive_base_url("https://example.com/news/index.html"),
            "https://example.com"
        );
    }
}
