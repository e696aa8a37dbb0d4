//! Discovery scan: generate source candidates from web search and seed-page
//! crawling, filter through the domain blocklist, and persist the survivors.

use std::collections::HashSet;

use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use freightwire_common::error::Result;
use freightwire_common::FreightwireError;

use crate::adapters::{http_client, USER_AGENT};
use crate::store::{NewCandidate, Store};

use super::seeds::DiscoverySeeds;

/// Cap on new candidates persisted per scan.
const MAX_CANDIDATES_PER_RUN: usize = 50;

/// Search results taken per query.
const RESULTS_PER_QUERY: usize = 10;

/// Queries issued per language per scan.
const QUERIES_PER_LANGUAGE: usize = 5;

/// Domains never worth tracking as sources.
const BLOCKED_DOMAINS: &[&str] = &[
    "google.com",
    "bing.com",
    "yahoo.com",
    "baidu.com",
    "duckduckgo.com",
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "reddit.com",
    "wikipedia.org",
    "amazon.com",
    "ebay.com",
    "alibaba.com",
    "taobao.com",
    "github.com",
    "stackoverflow.com",
];

#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub raw_results: usize,
    pub saved: usize,
}

#[derive(Debug, Clone)]
struct RawCandidate {
    url: String,
    name: Option<String>,
    language: Option<String>,
    discovered_via: &'static str,
    discovery_query: Option<String>,
}

pub struct ScanEngine {
    client: reqwest::Client,
    seeds: DiscoverySeeds,
    search_api_key: Option<String>,
    search_engine_id: Option<String>,
}

impl ScanEngine {
    pub fn new(
        seeds: DiscoverySeeds,
        search_api_key: Option<String>,
        search_engine_id: Option<String>,
    ) -> Self {
        Self {
            client: http_client(),
            seeds,
            search_api_key,
            search_engine_id,
        }
    }

    /// Run one full scan and persist new candidates.
    pub async fn run(&self, store: &Store) -> Result<ScanSummary> {
        let known: HashSet<String> = store
            .known_source_urls()
            .await?
            .iter()
            .map(|u| registrable_domain(u))
            .collect();

        let mut raw: Vec<RawCandidate> = Vec::new();

        // Producer 1: web search. Custom-search API when configured,
        // cost-free engine otherwise.
        if self.search_api_key.is_some() && self.search_engine_id.is_some() {
            raw.extend(self.search_google_cse().await);
        } else {
            raw.extend(self.search_duckduckgo().await);
        }

        // Producer 2: seed-page crawl.
        raw.extend(self.crawl_seed_pages().await);

        let raw_results = raw.len();

        // Merge: blocklist, then registrable-domain dedup against both the
        // known set and this batch.
        let mut seen: HashSet<String> = HashSet::new();
        let mut saved = 0usize;
        for candidate in raw {
            let domain = registrable_domain(&candidate.url);
            if domain.is_empty() || is_blocked(&domain) {
                continue;
            }
            if known.contains(&domain) || !seen.insert(domain) {
                continue;
            }

            let inserted = store
                .insert_candidate(&NewCandidate {
                    url: candidate.url,
                    name: candidate.name,
                    language: candidate.language,
                    discovered_via: candidate.discovered_via.to_string(),
                    discovery_query: candidate.discovery_query,
                })
                .await?;
            if inserted {
                saved += 1;
            }
            if saved >= MAX_CANDIDATES_PER_RUN {
                break;
            }
        }

        info!(raw_results, saved, "discovery scan complete");
        Ok(ScanSummary { raw_results, saved })
    }

    /// Cost-free search via the DuckDuckGo HTML endpoint.
    async fn search_duckduckgo(&self) -> Vec<RawCandidate> {
        let mut results = Vec::new();

        for (lang, queries) in &self.seeds.search_queries {
            for query in queries.iter().take(QUERIES_PER_LANGUAGE) {
                match self.duckduckgo_query(query).await {
                    Ok(urls) => {
                        for (url, title) in urls {
                            results.push(RawCandidate {
                                url,
                                name: title,
                                language: Some(lang.clone()),
                                discovered_via: "web_search",
                                discovery_query: Some(query.clone()),
                            });
                        }
                    }
                    Err(e) => warn!(query, error = %e, "search query failed"),
                }
            }
        }

        debug!(count = results.len(), "web search produced raw results");
        results
    }

    async fn duckduckgo_query(&self, query: &str) -> Result<Vec<(String, Option<String>)>> {
        let resp = self
            .client
            .get("https://html.duckduckgo.com/html/")
            .query(&[("q", query)])
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| FreightwireError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FreightwireError::Network(format!(
                "search returned HTTP {}",
                resp.status()
            )));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| FreightwireError::Network(e.to_string()))?;

        Ok(parse_duckduckgo_results(&html)
            .into_iter()
            .take(RESULTS_PER_QUERY)
            .collect())
    }

    /// Optional custom-search API producer.
    async fn search_google_cse(&self) -> Vec<RawCandidate> {
        #[derive(Deserialize)]
        struct CseResponse {
            #[serde(default)]
            items: Vec<CseItem>,
        }
        #[derive(Deserialize)]
        struct CseItem {
            link: String,
            #[serde(default)]
            title: Option<String>,
        }

        let (Some(key), Some(cx)) = (&self.search_api_key, &self.search_engine_id) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for (lang, queries) in &self.seeds.search_queries {
            for query in queries.iter().take(QUERIES_PER_LANGUAGE) {
                let resp = self
                    .client
                    .get("https://www.googleapis.com/customsearch/v1")
                    .query(&[
                        ("key", key.as_str()),
                        ("cx", cx.as_str()),
                        ("q", query.as_str()),
                        ("num", "10"),
                    ])
                    .send()
                    .await;

                let parsed: Result<CseResponse> = match resp {
                    Ok(r) if r.status().is_success() => r
                        .json()
                        .await
                        .map_err(|e| FreightwireError::Parse(e.to_string())),
                    Ok(r) => Err(FreightwireError::Network(format!("HTTP {}", r.status()))),
                    Err(e) => Err(FreightwireError::Network(e.to_string())),
                };

                match parsed {
                    Ok(body) => {
                        for item in body.items {
                            if let Some(root) = site_root(&item.link) {
                                results.push(RawCandidate {
                                    url: root,
                                    name: item.title.clone(),
                                    language: Some(lang.clone()),
                                    discovered_via: "custom_search",
                                    discovery_query: Some(query.clone()),
                                });
                            }
                        }
                    }
                    Err(e) => warn!(query, error = %e, "custom search failed"),
                }
            }
        }
        results
    }

    /// Crawl seed industry pages for outbound links to other news sites.
    async fn crawl_seed_pages(&self) -> Vec<RawCandidate> {
        let mut results = Vec::new();

        for seed_url in &self.seeds.seed_urls {
            let html = match self.client.get(seed_url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.text().await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!(seed_url, error = %e, "seed page body read failed");
                        continue;
                    }
                },
                Ok(resp) => {
                    warn!(seed_url, status = %resp.status(), "seed page fetch failed");
                    continue;
                }
                Err(e) => {
                    warn!(seed_url, error = %e, "seed page fetch failed");
                    continue;
                }
            };

            for root in outbound_site_roots(&html, seed_url) {
                results.push(RawCandidate {
                    url: root,
                    name: None,
                    language: None,
                    discovered_via: "seed_crawl",
                    discovery_query: None,
                });
            }
        }

        debug!(count = results.len(), "seed crawl produced raw results");
        results
    }
}

/// Parse the DuckDuckGo HTML results page into (site_root, title) pairs.
/// Result links are wrapped in a redirect carrying the target in `uddg`.
fn parse_duckduckgo_results(html: &str) -> Vec<(String, Option<String>)> {
    let selector = Selector::parse("a.result__a").expect("static selector");
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for el in document.select(&selector) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Some(target) = resolve_ddg_href(href) else {
            continue;
        };
        let Some(root) = site_root(&target) else {
            continue;
        };
        if !seen.insert(root.clone()) {
            continue;
        }
        let title = el.text().collect::<String>().trim().to_string();
        results.push((root, (!title.is_empty()).then_some(title)));
    }

    results
}

fn resolve_ddg_href(href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        let url = Url::parse(href).ok()?;
        if url.host_str().is_some_and(|h| h.contains("duckduckgo.com")) {
            return url
                .query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned());
        }
        return Some(href.to_string());
    }
    // Protocol-relative redirect form: //duckduckgo.com/l/?uddg=…
    let absolute = format!("https:{href}");
    let url = Url::parse(&absolute).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned())
}

/// Site root (scheme + host) for a URL.
fn site_root(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    Some(format!("{}://{}", url.scheme(), url.host_str()?))
}

/// Outbound cross-domain site roots linked from a page.
fn outbound_site_roots(html: &str, page_url: &str) -> Vec<String> {
    let anchor = Selector::parse("a[href]").expect("static selector");
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let own_domain = base
        .host_str()
        .map(registrable_of_host)
        .unwrap_or_default();

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut roots = Vec::new();

    for el in document.select(&anchor) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href.trim()) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let Some(host) = resolved.host_str() else {
            continue;
        };
        if registrable_of_host(host) == own_domain {
            continue;
        }
        let root = format!("{}://{host}", resolved.scheme());
        if seen.insert(root.clone()) {
            roots.push(root);
        }
    }

    roots
}

/// Registrable domain of a URL ("https://www.foo.com/x" → "foo.com").
pub(crate) fn registrable_domain(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(registrable_of_host))
        .unwrap_or_default()
}

fn registrable_of_host(host: &str) -> String {
    let host = host.to_lowercase();
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        host
    }
}

fn is_blocked(domain: &str) -> bool {
    BLOCKED_DOMAINS.iter().any(|b| domain.ends_with(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrable_strips_www_and_path() {
        assert_eq!(registrable_domain("https://www.foo.com/news"), "foo.com");
        assert_eq!(registrable_domain("https://news.foo.co/x"), "foo.co");
        assert_eq!(registrable_domain("not a url"), "");
    }

    #[test]
    fn blocklist_matches_subdomains() {
        assert!(is_blocked("facebook.com"));
        assert!(is_blocked(&registrable_domain("https://m.facebook.com/x")));
        assert!(!is_blocked("freightwaves.com"));
    }

    #[test]
    fn site_root_extracts_scheme_and_host() {
        assert_eq!(
            site_root("https://example.com/news/article?x=1").as_deref(),
            Some("https://example.com")
        );
        assert!(site_root("ftp://example.com").is_none());
    }

    #[test]
    fn ddg_redirect_unwrapped() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Ftheloadstar.com%2Fnews&rut=abc";
        assert_eq!(
            resolve_ddg_href(href).as_deref(),
            Some("https://theloadstar.com/news")
        );
    }

    #[test]
    fn direct_href_passes_through() {
        assert_eq!(
            resolve_ddg_href("https://example.com/a").as_deref(),
            Some("https://example.com/a")
        );
    }

    #[test]
    fn parses_ddg_results_page() {
        let html = r#"
            <div class="result">
              <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Ftheloadstar.com%2F">The Loadstar</a>
            </div>
            <div class="result">
              <a class="result__a" href="https://splash247.com/article">Splash 247</a>
            </div>
        "#;
        let results = parse_duckduckgo_results(html);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "https://theloadstar.com");
        assert_eq!(results[0].1.as_deref(), Some("The Loadstar"));
        assert_eq!(results[1].0, "https://splash247.com");
    }

    #[test]
    fn outbound_roots_exclude_own_domain() {
        let html = r#"
            <a href="/internal/page">Internal</a>
            <a href="https://www.theloadstar.com/story">Loadstar</a>
            <a href="https://sub.example.com/page">Own subdomain</a>
        "#;
        let roots = outbound_site_roots(html, "https://example.com");
        assert_eq!(roots, vec!["https://www.theloadstar.com"]);
    }
}
