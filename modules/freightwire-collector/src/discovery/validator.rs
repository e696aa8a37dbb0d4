//! Candidate validation: reachability, feed detection, trial fetch, quality
//! and relevance scoring, auto-promotion.

use std::time::Duration;

use rand::distr::{Alphanumeric, SampleString};
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{info, warn};

use freightwire_common::error::Result;
use freightwire_common::fingerprint::canonicalize_url;
use freightwire_common::{
    CandidateStatus, FreightwireError, ParserConfig, RawArticle, SampleArticle, SourceCandidate,
    SourceKind, UniversalConfig,
};

use crate::adapters::{FeedAdapter, UniversalAdapter, USER_AGENT};
use crate::store::{NewSource, Store, ValidationResult};

use super::engine::registrable_domain;
use super::seeds::DiscoverySeeds;

/// Reachability timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Sample articles collected per trial fetch.
const TRIAL_ARTICLES: usize = 5;

/// Combined-score weights: 0.4·quality + 0.6·relevance.
const QUALITY_WEIGHT: f64 = 0.4;
const RELEVANCE_WEIGHT: f64 = 0.6;

/// Fetch interval assigned to auto-promoted sources.
const PROMOTED_INTERVAL_MINUTES: i32 = 60;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub reachable: bool,
    pub detected_name: Option<String>,
    pub feed_url: Option<String>,
    pub kind: SourceKind,
    pub articles_fetched: usize,
    pub quality_score: i32,
    pub relevance_score: i32,
    pub combined_score: i32,
    pub samples: Vec<SampleArticle>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidateSummary {
    pub validated: usize,
    pub auto_approved: usize,
}

pub struct Validator {
    client: reqwest::Client,
    feed: FeedAdapter,
    universal: UniversalAdapter,
    seeds: DiscoverySeeds,
    auto_approve_threshold: f64,
}

impl Validator {
    pub fn new(seeds: DiscoverySeeds, auto_approve_threshold: f64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to build validator HTTP client");
        Self {
            client,
            feed: FeedAdapter::new(),
            universal: UniversalAdapter::new(),
            seeds,
            auto_approve_threshold,
        }
    }

    /// Validate a batch of discovered candidates.
    pub async fn validate_batch(&self, store: &Store, limit: i64) -> Result<ValidateSummary> {
        let candidates = store.claim_candidates_for_validation(limit).await?;
        if candidates.is_empty() {
            return Ok(ValidateSummary::default());
        }

        let mut summary = ValidateSummary::default();
        for candidate in candidates {
            match self.validate_one(store, &candidate).await {
                Ok(auto_approved) => {
                    summary.validated += 1;
                    if auto_approved {
                        summary.auto_approved += 1;
                    }
                }
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "validation failed");
                    let failed = ValidationResult {
                        status: CandidateStatus::Validated,
                        name: None,
                        feed_url: None,
                        kind: None,
                        quality_score: 0,
                        relevance_score: 0,
                        combined_score: 0,
                        sample_articles: Vec::new(),
                        validation_details: serde_json::json!({ "error": e.to_string() }),
                        error_message: Some(truncate(&e.to_string(), 500)),
                        auto_approved: false,
                    };
                    store.save_validation(candidate.id, &failed).await?;
                }
            }
        }

        info!(
            validated = summary.validated,
            auto_approved = summary.auto_approved,
            "validation batch complete"
        );
        Ok(summary)
    }

    /// Validate one candidate and persist the outcome. Returns whether the
    /// candidate was auto-approved.
    async fn validate_one(&self, store: &Store, candidate: &SourceCandidate) -> Result<bool> {
        let report = self
            .probe(&candidate.url, candidate.language.as_deref())
            .await;

        let auto_approved =
            report.reachable && f64::from(report.combined_score) >= self.auto_approve_threshold;

        let status = if auto_approved {
            CandidateStatus::Approved
        } else {
            CandidateStatus::Validated
        };

        let result = ValidationResult {
            status,
            name: report.detected_name.clone(),
            feed_url: report.feed_url.clone(),
            kind: Some(report.kind),
            quality_score: report.quality_score,
            relevance_score: report.relevance_score,
            combined_score: report.combined_score,
            sample_articles: report.samples.clone(),
            validation_details: serde_json::json!({
                "reachable": report.reachable,
                "articles_fetched": report.articles_fetched,
            }),
            error_message: report.error.clone(),
            auto_approved,
        };
        store.save_validation(candidate.id, &result).await?;

        if auto_approved {
            self.promote(store, candidate, &report).await?;
        }

        Ok(auto_approved)
    }

    /// Run the validation pipeline without persisting anything. Also exposed
    /// synchronously through the probe endpoint.
    pub async fn probe(&self, url: &str, language: Option<&str>) -> ProbeReport {
        let mut report = ProbeReport {
            url: url.to_string(),
            reachable: false,
            detected_name: None,
            feed_url: None,
            kind: SourceKind::Universal,
            articles_fetched: 0,
            quality_score: 0,
            relevance_score: 0,
            combined_score: 0,
            samples: Vec::new(),
            error: None,
        };

        // Step 1: reachability.
        let html = match self.fetch_page(url).await {
            Ok(html) => html,
            Err(e) => {
                report.error = Some(format!("site unreachable: {e}"));
                return report;
            }
        };
        report.reachable = true;
        report.detected_name = extract_site_name(&html);

        // Step 2: feed detection (universal strategies 1 + 2).
        report.feed_url = self.universal.find_feed_url(url).await;
        report.kind = if report.feed_url.is_some() {
            SourceKind::Feed
        } else {
            SourceKind::Universal
        };

        // Step 3: trial fetch.
        let articles = match &report.feed_url {
            Some(feed_url) => self.feed.fetch_feed(feed_url, TRIAL_ARTICLES, true).await,
            None => self.universal.fetch_url(url, TRIAL_ARTICLES).await,
        };
        let articles = match articles {
            Ok(outcome) => outcome.articles,
            Err(e) => {
                report.error = Some(truncate(&format!("trial fetch failed: {e}"), 500));
                report.quality_score = 0;
                return report;
            }
        };

        report.articles_fetched = articles.len();
        report.samples = articles
            .iter()
            .take(TRIAL_ARTICLES)
            .map(|a| SampleArticle {
                title: truncate(&a.title, 200),
                url: a.url.clone(),
                body_preview: truncate(a.body_text.as_deref().unwrap_or_default(), 300),
                published_at: a.published_at,
            })
            .collect();

        // Steps 4–5: scoring.
        report.quality_score = score_quality(&articles);
        let language = language.unwrap_or("en");
        report.relevance_score = score_relevance(&articles, self.seeds.keywords_for(language));
        report.combined_score = combined_score(report.quality_score, report.relevance_score);

        report
    }

    async fn promote(
        &self,
        store: &Store,
        candidate: &SourceCandidate,
        report: &ProbeReport,
    ) -> Result<String> {
        promote_candidate(
            store,
            candidate,
            report.feed_url.as_deref(),
            report.detected_name.as_deref(),
        )
        .await
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
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

/// Create the Source record for an approved candidate. Shared by
/// auto-promotion and the operator approve action; returns the new (or
/// already existing) source id.
pub async fn promote_candidate(
    store: &Store,
    candidate: &SourceCandidate,
    feed_url: Option<&str>,
    detected_name: Option<&str>,
) -> Result<String> {
    let domain = registrable_domain(&candidate.url);
    let source_id = generate_source_id(&domain);
    let name = detected_name
        .or(candidate.name.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| domain.clone());

    let (kind, url, parser_config) = match feed_url.or(candidate.feed_url.as_deref()) {
        Some(feed_url) => (
            SourceKind::Feed,
            feed_url.to_string(),
            ParserConfig::Feed(Default::default()),
        ),
        None => (
            SourceKind::Universal,
            candidate.url.clone(),
            ParserConfig::Universal(UniversalConfig::default()),
        ),
    };

    let source = NewSource {
        source_id: source_id.clone(),
        name,
        kind,
        url,
        language: candidate.language.clone(),
        fetch_interval_minutes: PROMOTED_INTERVAL_MINUTES,
        priority: 3,
        enabled: true,
        parser_config,
        notes: Some(format!("auto-discovered via {}", candidate.discovered_via)),
    };

    if store.insert_source_if_absent(&source).await? {
        info!(source_id, url = %source.url, "candidate promoted to source");
    } else {
        info!(source_id, "source already exists, promotion skipped");
    }
    Ok(source_id)
}

/// Stable source id: domain slug plus a short random suffix.
fn generate_source_id(domain: &str) -> String {
    let slug: String = domain
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), 6).to_lowercase();
    format!("{slug}_{suffix}")
}

/// Site name from the page's `<title>`, trimmed of taglines.
fn extract_site_name(html: &str) -> Option<String> {
    let selector = Selector::parse("title").expect("static selector");
    let document = Html::parse_document(html);
    let title = document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())?;

    let name = title
        .split(['|', '-', '–', '—'])
        .next()
        .map(str::trim)
        .filter(|n| n.len() > 3)?;
    Some(truncate(name, 200))
}

/// Quality 0–100: fraction-weighted completeness of the trial sample.
/// Weights: titles 25, bodies ≥200 chars 25, at least 3 articles 20,
/// publish dates 15, canonical URLs 15.
fn score_quality(articles: &[RawArticle]) -> i32 {
    if articles.is_empty() {
        return 0;
    }
    let n = articles.len() as f64;

    let with_title = articles.iter().filter(|a| !a.title.trim().is_empty()).count() as f64;
    let with_body = articles
        .iter()
        .filter(|a| a.body_text.as_deref().map_or(0, str::len) >= 200)
        .count() as f64;
    let with_date = articles.iter().filter(|a| a.published_at.is_some()).count() as f64;
    let canonical = articles
        .iter()
        .filter(|a| canonicalize_url(&a.url) == a.url)
        .count() as f64;

    let mut score = 0.0;
    score += 25.0 * with_title / n;
    score += 25.0 * with_body / n;
    if articles.len() >= 3 {
        score += 20.0;
    }
    score += 15.0 * with_date / n;
    score += 15.0 * canonical / n;

    score.round() as i32
}

/// Relevance 0–100: weighted keyword hits (high 3, medium 2, low 1) across
/// titles and bodies, capped at 100.
fn score_relevance(articles: &[RawArticle], keywords: &super::seeds::KeywordTiers) -> i32 {
    let mut total = 0i32;

    for article in articles {
        let text = format!(
            "{} {}",
            article.title,
            article.body_text.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        for kw in &keywords.high {
            if text.contains(&kw.to_lowercase()) {
                total += 3;
            }
        }
        for kw in &keywords.medium {
            if text.contains(&kw.to_lowercase()) {
                total += 2;
            }
        }
        for kw in &keywords.low {
            if text.contains(&kw.to_lowercase()) {
                total += 1;
            }
        }
    }

    total.min(100)
}

fn combined_score(quality: i32, relevance: i32) -> i32 {
    (QUALITY_WEIGHT * f64::from(quality) + RELEVANCE_WEIGHT * f64::from(relevance)).round() as i32
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
