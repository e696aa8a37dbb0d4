use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "source_kind", rename_all = "snake_case")]
pub enum SourceKind {
    Feed,
    Api,
    Scraper,
    Universal,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Feed => write!(f, "feed"),
            SourceKind::Api => write!(f, "api"),
            SourceKind::Scraper => write!(f, "scraper"),
            SourceKind::Universal => write!(f, "universal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "health_status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "processing_status", rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "fetch_status", rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "sentiment", rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Ordered low < medium < high; `urgency_min` filters rely on the ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "urgency", rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "market_impact", rename_all = "snake_case")]
pub enum MarketImpact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Ocean,
    Air,
    Rail,
    Road,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Ocean => "ocean",
            TransportMode::Air => "air",
            TransportMode::Rail => "rail",
            TransportMode::Road => "road",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ocean" => Some(TransportMode::Ocean),
            "air" => Some(TransportMode::Air),
            "rail" => Some(TransportMode::Rail),
            "road" => Some(TransportMode::Road),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "content_type", rename_all = "snake_case")]
pub enum ContentType {
    News,
    Analysis,
    Opinion,
    PressRelease,
    MarketData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "candidate_status", rename_all = "snake_case")]
pub enum CandidateStatus {
    Discovered,
    Validating,
    Validated,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "channel", rename_all = "snake_case")]
pub enum Channel {
    Push,
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "frequency", rename_all = "snake_case")]
pub enum Frequency {
    Realtime,
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "api_role", rename_all = "snake_case")]
pub enum ApiRole {
    Admin,
    Reader,
    Subscriber,
}

// --- Parser configuration ---

/// Typed per-kind parser configuration stored alongside each source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParserConfig {
    Feed(FeedConfig),
    Api(ApiConfig),
    Scraper(ScraperConfig),
    Universal(UniversalConfig),
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig::Universal(UniversalConfig::default())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Maximum feed entries to process per fetch.
    #[serde(default)]
    pub max_items: Option<usize>,
    /// Fetch each entry's page for full-text extraction (default true).
    #[serde(default)]
    pub fetch_full_text: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiAuth {
    #[default]
    None,
    ApiKeyHeader,
    Bearer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiPagination {
    #[default]
    None,
    PageNumber,
    Offset,
    Cursor,
}

/// Dot-separated response paths mapping API payloads onto article fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiFieldMap {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub auth: ApiAuth,
    /// Header name for `api_key_header` auth.
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Secret value, or `$ENV_NAME` to read from the environment.
    #[serde(default)]
    pub auth_value: Option<String>,
    #[serde(default)]
    pub pagination: ApiPagination,
    #[serde(default)]
    pub pagination_param: Option<String>,
    #[serde(default)]
    pub page_size_param: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Dot path to the cursor value in the response for cursor pagination.
    #[serde(default)]
    pub cursor_path: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Dot path to the items array ("" = the response root).
    #[serde(default)]
    pub items_path: String,
    pub fields: ApiFieldMap,
}

fn default_max_pages() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// CSS selector matching article links (or their containers) on the index page.
    pub list_selector: String,
    #[serde(default)]
    pub title_selector: Option<String>,
    #[serde(default)]
    pub body_selector: Option<String>,
    #[serde(default)]
    pub date_selector: Option<String>,
    /// strptime-style format for dates matched by `date_selector`.
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_articles: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniversalConfig {
    #[serde(default)]
    pub max_articles: Option<usize>,
}

// --- Core records ---

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Source {
    pub source_id: String,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub language: Option<String>,
    pub fetch_interval_minutes: i32,
    pub priority: i32,
    pub enabled: bool,
    pub parser_config: Json<ParserConfig>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub health_status: HealthStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw article produced by an adapter, before normalization and dedup.
#[derive(Debug, Clone)]
pub struct RawArticle {
    pub url: String,
    pub title: String,
    pub body_text: Option<String>,
    pub body_markdown: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub metadata: serde_json::Value,
}

impl RawArticle {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            body_text: None,
            body_markdown: None,
            published_at: None,
            author: None,
            metadata: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMetric {
    pub metric: String,
    pub value: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Article {
    pub id: Uuid,
    pub source_id: String,
    pub source_name: Option<String>,
    pub url: String,
    pub title: String,
    pub body_text: Option<String>,
    pub body_markdown: Option<String>,
    pub language: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,

    pub summary_en: Option<String>,
    pub summary_zh: Option<String>,
    pub transport_modes: Vec<String>,
    pub primary_topic: Option<String>,
    pub secondary_topics: Vec<String>,
    pub content_type: Option<ContentType>,
    pub regions: Vec<String>,
    pub entities: Json<Entities>,
    pub sentiment: Option<Sentiment>,
    pub market_impact: Option<MarketImpact>,
    pub urgency: Option<Urgency>,
    pub key_metrics: Json<Vec<KeyMetric>>,

    #[serde(skip)]
    pub title_simhash: Option<i64>,
    #[serde(skip)]
    pub content_minhash: Option<Vec<i64>>,
    #[serde(skip)]
    pub embedding: Option<pgvector::Vector>,

    pub processing_status: ProcessingStatus,
    pub llm_processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FetchLog {
    pub id: i64,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: FetchStatus,
    pub articles_found: i32,
    pub articles_new: i32,
    pub articles_dedup: i32,
    pub error_message: Option<String>,
    pub duration_ms: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleArticle {
    pub title: String,
    pub url: String,
    pub body_preview: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SourceCandidate {
    pub id: Uuid,
    pub url: String,
    pub name: Option<String>,
    pub feed_url: Option<String>,
    pub kind: Option<SourceKind>,
    pub language: Option<String>,
    pub discovered_via: String,
    pub discovery_query: Option<String>,
    pub status: CandidateStatus,
    pub quality_score: i32,
    pub relevance_score: i32,
    pub combined_score: i32,
    pub sample_articles: Json<Vec<SampleArticle>>,
    pub validation_details: serde_json::Value,
    pub error_message: Option<String>,
    pub auto_approved: bool,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub name: String,
    pub source_ids: Vec<String>,
    pub transport_modes: Vec<String>,
    pub topics: Vec<String>,
    pub regions: Vec<String>,
    pub languages: Vec<String>,
    pub urgency_min: Option<Urgency>,
    pub channel: Channel,
    pub channel_config: serde_json::Value,
    pub frequency: Frequency,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn filter(&self) -> SubscriptionFilter {
        SubscriptionFilter {
            source_ids: self.source_ids.clone(),
            transport_modes: self.transport_modes.clone(),
            topics: self.topics.clone(),
            regions: self.regions.clone(),
            languages: self.languages.clone(),
            urgency_min: self.urgency_min,
        }
    }

    /// Decode the webhook channel config. Schema-complete by invariant; a
    /// malformed row yields None and the delivery is skipped with a log.
    pub fn webhook_config(&self) -> Option<WebhookConfig> {
        serde_json::from_value(self.channel_config.clone()).ok()
    }
}

/// Filter predicate shared by persistent subscriptions and live push
/// connections. Each non-empty field is an OR over its values; fields are
/// AND-ed together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub source_ids: Vec<String>,
    #[serde(default)]
    pub transport_modes: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub urgency_min: Option<Urgency>,
}

impl SubscriptionFilter {
    pub fn matches(&self, article: &Article) -> bool {
        if !self.source_ids.is_empty() && !self.source_ids.contains(&article.source_id) {
            return false;
        }
        if !self.transport_modes.is_empty()
            && !self
                .transport_modes
                .iter()
                .any(|m| article.transport_modes.contains(m))
        {
            return false;
        }
        if !self.topics.is_empty() {
            match &article.primary_topic {
                Some(topic) if self.topics.contains(topic) => {}
                _ => return false,
            }
        }
        if !self.regions.is_empty()
            && !self.regions.iter().any(|r| article.regions.contains(r))
        {
            return false;
        }
        if !self.languages.is_empty() {
            match &article.language {
                Some(lang) if self.languages.contains(lang) => {}
                _ => return false,
            }
        }
        if let Some(min) = self.urgency_min {
            match article.urgency {
                Some(u) if u >= min => {}
                _ => return false,
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookDeliveryLog {
    pub id: i64,
    pub subscription_id: Uuid,
    pub article_id: Uuid,
    pub url: String,
    pub status_code: Option<i32>,
    pub success: bool,
    pub attempt: i32,
    pub latency_ms: Option<i32>,
    pub error_message: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    #[serde(skip)]
    pub key_hash: String,
    pub role: ApiRole,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Article {
        Article {
            id: Uuid::new_v4(),
            source_id: "loadstar".to_string(),
            source_name: Some("The Loadstar".to_string()),
            url: "https://theloadstar.com/a".to_string(),
            title: "Rates surge".to_string(),
            body_text: Some("body".to_string()),
            body_markdown: None,
            language: Some("en".to_string()),
            published_at: None,
            fetched_at: Utc::now(),
            summary_en: None,
            summary_zh: None,
            transport_modes: vec!["ocean".to_string()],
            primary_topic: Some("freight_rates".to_string()),
            secondary_topics: vec![],
            content_type: None,
            regions: vec!["Asia".to_string()],
            entities: Json(Entities::default()),
            sentiment: None,
            market_impact: None,
            urgency: Some(Urgency::Medium),
            key_metrics: Json(vec![]),
            title_simhash: None,
            content_minhash: None,
            embedding: None,
            processing_status: ProcessingStatus::Completed,
            llm_processed: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(SubscriptionFilter::default().matches(&article()));
    }

    #[test]
    fn transport_mode_or_semantics() {
        let filter = SubscriptionFilter {
            transport_modes: vec!["air".to_string(), "ocean".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&article()));
    }

    #[test]
    fn transport_mode_mismatch_rejects() {
        let filter = SubscriptionFilter {
            transport_modes: vec!["rail".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&article()));
    }

    #[test]
    fn fields_are_anded() {
        let filter = SubscriptionFilter {
            transport_modes: vec!["ocean".to_string()],
            topics: vec!["port_operations".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&article()), "topic mismatch must reject despite mode match");
    }

    #[test]
    fn urgency_min_matches_equal_or_higher() {
        let filter = SubscriptionFilter {
            urgency_min: Some(Urgency::Medium),
            ..Default::default()
        };
        assert!(filter.matches(&article()));

        let mut high = article();
        high.urgency = Some(Urgency::High);
        assert!(filter.matches(&high));

        let mut low = article();
        low.urgency = Some(Urgency::Low);
        assert!(!filter.matches(&low));
    }

    #[test]
    fn urgency_min_rejects_unset_urgency() {
        let filter = SubscriptionFilter {
            urgency_min: Some(Urgency::Low),
            ..Default::default()
        };
        let mut a = article();
        a.urgency = None;
        assert!(!filter.matches(&a));
    }

    #[test]
    fn language_filter() {
        let filter = SubscriptionFilter {
            languages: vec!["zh".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&article()));
    }

    #[test]
    fn urgency_ordering() {
        assert!(Urgency::Low < Urgency::Medium);
        assert!(Urgency::Medium < Urgency::High);
    }

    #[test]
    fn parser_config_round_trips_tagged() {
        let cfg = ParserConfig::Scraper(ScraperConfig {
            list_selector: ".headline a".to_string(),
            title_selector: None,
            body_selector: Some("article .content".to_string()),
            date_selector: None,
            date_format: None,
            base_url: None,
            max_articles: Some(10),
        });
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["kind"], "scraper");
        let back: ParserConfig = serde_json::from_value(json).unwrap();
        match back {
            ParserConfig::Scraper(s) => assert_eq!(s.list_selector, ".headline a"),
            _ => panic!("wrong variant"),
        }
    }
}
