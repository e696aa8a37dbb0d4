//! REST surface under `/api/v1`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Duration, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use freightwire_collector::discovery::{promote_candidate, PROBE_TIMEOUT};
use freightwire_collector::scheduler::evaluate_health;
use freightwire_collector::store::{ArticleQuery, NewSubscription};
use freightwire_common::{
    ApiRole, CandidateStatus, Channel, FetchStatus, Frequency, Sentiment, Urgency,
};

use crate::auth::{generate_api_key, hash_api_key, AuthContext};
use crate::error::ApiError;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/articles", get(list_articles))
        .route("/articles/search/semantic", get(semantic_search))
        .route("/articles/{id}", get(get_article))
        .route("/articles/{id}/related", get(related_articles))
        .route("/articles/{id}/retry", post(retry_article))
        .route("/export/articles", get(export_articles))
        .route("/sources", get(list_sources))
        .route("/sources/{id}", get(get_source))
        .route("/fetch-logs", get(list_fetch_logs))
        .route("/webhook-logs", get(list_webhook_logs))
        .route("/process", post(trigger_processing))
        .route("/discovery/start", post(discovery_start))
        .route("/discovery/stop", post(discovery_stop))
        .route("/discovery/status", get(discovery_status))
        .route("/discovery/scan", post(discovery_scan))
        .route("/discovery/validate", post(discovery_validate))
        .route("/discovery/candidates", get(list_candidates))
        .route("/discovery/candidates/{id}/approve", post(approve_candidate))
        .route("/discovery/candidates/{id}/reject", post(reject_candidate))
        .route("/discovery/probe", post(probe_url))
        .route("/subscriptions", post(create_subscription).get(list_subscriptions))
        .route(
            "/subscriptions/{id}",
            get(get_subscription).put(update_subscription).delete(delete_subscription),
        )
        .route("/analytics/trending", get(trending))
        .route("/analytics/sentiment", get(sentiment_trend))
        .route("/analytics/entities", get(top_entities))
        .route("/admin/api-keys", post(create_api_key).get(list_api_keys))
        .route("/admin/api-keys/{id}", axum::routing::delete(delete_api_key))
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ArticleListParams {
    source_id: Option<String>,
    transport_mode: Option<String>,
    topic: Option<String>,
    language: Option<String>,
    sentiment: Option<Sentiment>,
    urgency: Option<Urgency>,
    from_date: Option<DateTime<Utc>>,
    to_date: Option<DateTime<Utc>>,
    search: Option<String>,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArticleListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let query = ArticleQuery {
        source_id: params.source_id,
        transport_mode: params.transport_mode.map(|m| m.to_lowercase()),
        topic: params.topic.map(|t| t.to_lowercase()),
        language: params.language,
        sentiment: params.sentiment,
        urgency: params.urgency,
        from_date: params.from_date,
        to_date: params.to_date,
        search: params.search,
        page: params.page,
        page_size: params.page_size,
    };
    let articles = state.store.list_articles(&query).await?;
    Ok(Json(serde_json::json!({
        "page": params.page,
        "page_size": params.page_size,
        "articles": articles,
    })))
}

async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<freightwire_common::Article>> {
    state
        .store
        .get_article(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("article not found"))
}

#[derive(Debug, Deserialize)]
struct SemanticParams {
    q: String,
    transport_mode: Option<String>,
    topic: Option<String>,
    language: Option<String>,
    #[serde(default = "default_semantic_limit")]
    limit: i64,
}

fn default_semantic_limit() -> i64 {
    10
}

#[derive(Serialize)]
struct ScoredArticleBody {
    article: freightwire_common::Article,
    similarity: f64,
}

async fn semantic_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SemanticParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(embedder) = &state.embedder else {
        return Err(ApiError::unavailable("LLM provider not configured"));
    };

    let embedding = embedder
        .embed(&params.q)
        .await
        .map_err(|e| ApiError::internal(format!("query embedding failed: {e}")))?;

    let results = state
        .store
        .semantic_search(
            embedding,
            params.transport_mode.as_deref(),
            params.topic.as_deref(),
            params.language.as_deref(),
            params.limit,
        )
        .await?;

    let results: Vec<ScoredArticleBody> = results
        .into_iter()
        .map(|r| ScoredArticleBody {
            article: r.article,
            similarity: r.similarity,
        })
        .collect();

    Ok(Json(serde_json::json!({ "query": params.q, "results": results })))
}

#[derive(Debug, Deserialize)]
struct RelatedParams {
    #[serde(default = "default_related_limit")]
    limit: i64,
    #[serde(default)]
    exclude_same_source: bool,
}

fn default_related_limit() -> i64 {
    5
}

async fn related_articles(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<RelatedParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let article = state
        .store
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::not_found("article not found"))?;

    if article.embedding.is_none() {
        return Err(ApiError::bad_request("article has no embedding yet"));
    }

    let related = state
        .store
        .related_articles(id, params.limit, params.exclude_same_source)
        .await?;

    let related: Vec<ScoredArticleBody> = related
        .into_iter()
        .map(|r| ScoredArticleBody {
            article: r.article,
            similarity: r.similarity,
        })
        .collect();

    Ok(Json(serde_json::json!({ "article_id": id, "related": related })))
}

/// Operator retry for a failed enrichment: reset to pending and re-enqueue.
/// Never triggered automatically.
async fn retry_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if state.store.get_article(id).await?.is_none() {
        return Err(ApiError::not_found("article not found"));
    }

    if !state.store.reset_to_pending(id).await? {
        return Err(ApiError::conflict(
            "article is not in a retryable state (failed or stuck processing)",
        ));
    }

    if state.enrich_tx.send(id).await.is_err() {
        return Err(ApiError::unavailable("enrichment pipeline not running"));
    }

    Ok(Json(serde_json::json!({ "article_id": id, "status": "pending" })))
}

/// Stream the completed corpus as NDJSON. The store scan is lazy; the
/// handler drives it to completion one row at a time.
async fn export_articles(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let mut stream = state.store.stream_completed_articles();
    let mut body = String::new();
    while let Some(article) = stream.next().await {
        let article = article?;
        let line = serde_json::to_string(&article)
            .map_err(|e| ApiError::internal(format!("serialization failed: {e}")))?;
        body.push_str(&line);
        body.push('\n');
    }

    Ok((
        [(axum::http::header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    ))
}

// ---------------------------------------------------------------------------
// Sources & health
// ---------------------------------------------------------------------------

async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<freightwire_common::Source>>> {
    Ok(Json(state.store.list_sources().await?))
}

async fn get_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<freightwire_common::Source>> {
    state
        .store
        .get_source(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("source not found"))
}

/// Per-source health report over the 24 h fetch-log window.
pub async fn source_health(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let sources = state.store.list_sources().await?;
    let window_start = Utc::now() - Duration::hours(24);

    let mut reports = Vec::with_capacity(sources.len());
    for source in sources {
        let logs = state
            .store
            .fetch_logs_since(&source.source_id, window_start)
            .await?;
        let health = evaluate_health(&logs, source.fetch_interval_minutes, Utc::now());
        let successes = logs.iter().filter(|l| l.status == FetchStatus::Success).count();
        let articles_new: i32 = logs.iter().map(|l| l.articles_new).sum();
        reports.push(serde_json::json!({
            "source_id": source.source_id,
            "name": source.name,
            "enabled": source.enabled,
            "last_fetched_at": source.last_fetched_at,
            "health_status": health,
            "fetch_count_24h": logs.len(),
            "success_rate_24h": if logs.is_empty() { 0.0 } else { successes as f64 / logs.len() as f64 },
            "articles_new_24h": articles_new,
        }));
    }

    Ok(Json(serde_json::json!({ "sources": reports })))
}

#[derive(Debug, Deserialize)]
struct FetchLogParams {
    source_id: Option<String>,
    #[serde(default = "default_log_limit")]
    limit: i64,
}

fn default_log_limit() -> i64 {
    100
}

async fn list_fetch_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FetchLogParams>,
) -> ApiResult<Json<Vec<freightwire_common::FetchLog>>> {
    Ok(Json(
        state
            .store
            .list_fetch_logs(params.source_id.as_deref(), params.limit)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct WebhookLogParams {
    subscription_id: Option<Uuid>,
    #[serde(default = "default_log_limit")]
    limit: i64,
}

async fn list_webhook_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WebhookLogParams>,
) -> ApiResult<Json<Vec<freightwire_common::WebhookDeliveryLog>>> {
    Ok(Json(
        state
            .store
            .list_webhook_logs(params.subscription_id, params.limit)
            .await?,
    ))
}

// ---------------------------------------------------------------------------
// Enrichment trigger
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProcessParams {
    #[serde(default = "default_process_batch")]
    limit: i64,
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self {
            limit: default_process_batch(),
        }
    }
}

fn default_process_batch() -> i64 {
    50
}

/// Manually enqueue pending articles for enrichment.
async fn trigger_processing(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProcessParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let ids = state.store.pending_article_ids(params.limit).await?;
    let count = ids.len();
    for id in ids {
        if state.enrich_tx.send(id).await.is_err() {
            return Err(ApiError::unavailable("enrichment pipeline not running"));
        }
    }
    Ok(Json(serde_json::json!({ "enqueued": count })))
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

async fn discovery_start(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    state.discovery.start();
    Ok(Json(serde_json::json!({ "running": true })))
}

async fn discovery_stop(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    state.discovery.stop();
    Ok(Json(serde_json::json!({ "running": false })))
}

async fn discovery_status(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<freightwire_collector::discovery::DiscoveryStatus>> {
    Ok(Json(state.discovery.status().await))
}

async fn discovery_scan(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let summary = state.discovery.run_scan().await?;
    Ok(Json(serde_json::json!({
        "raw_results": summary.raw_results,
        "saved": summary.saved,
    })))
}

async fn discovery_validate(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let summary = state.discovery.run_validate().await?;
    Ok(Json(serde_json::json!({
        "validated": summary.validated,
        "auto_approved": summary.auto_approved,
    })))
}

#[derive(Debug, Deserialize)]
struct CandidateListParams {
    status: Option<CandidateStatus>,
    #[serde(default = "default_log_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

async fn list_candidates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CandidateListParams>,
) -> ApiResult<Json<Vec<freightwire_common::SourceCandidate>>> {
    Ok(Json(
        state
            .store
            .list_candidates(params.status, params.limit, params.offset)
            .await?,
    ))
}

async fn approve_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let candidate = state
        .store
        .get_candidate(id)
        .await?
        .ok_or_else(|| ApiError::not_found("candidate not found"))?;

    if candidate.status == CandidateStatus::Approved {
        return Err(ApiError::conflict("candidate already approved"));
    }

    let source_id = promote_candidate(&state.store, &candidate, None, None).await?;
    state
        .store
        .set_candidate_status(id, CandidateStatus::Approved)
        .await?;

    Ok(Json(serde_json::json!({ "source_id": source_id, "status": "approved" })))
}

async fn reject_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let candidate = state
        .store
        .get_candidate(id)
        .await?
        .ok_or_else(|| ApiError::not_found("candidate not found"))?;

    state
        .store
        .set_candidate_status(candidate.id, CandidateStatus::Rejected)
        .await?;

    Ok(Json(serde_json::json!({ "status": "rejected" })))
}

#[derive(Debug, Deserialize)]
struct ProbeParams {
    url: String,
    language: Option<String>,
}

/// Run the validator synchronously against one URL, without persistence.
async fn probe_url(
    State(state): State<Arc<AppState>>,
    Json(params): Json<ProbeParams>,
) -> ApiResult<Json<freightwire_collector::discovery::ProbeReport>> {
    let validator = state.discovery.validator();
    let report = tokio::time::timeout(
        PROBE_TIMEOUT,
        validator.probe(&params.url, params.language.as_deref()),
    )
    .await
    .map_err(|_| ApiError::bad_request("probe timed out"))?;

    Ok(Json(report))
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SubscriptionBody {
    name: String,
    #[serde(default)]
    source_ids: Vec<String>,
    #[serde(default)]
    transport_modes: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    regions: Vec<String>,
    #[serde(default)]
    languages: Vec<String>,
    #[serde(default)]
    urgency_min: Option<Urgency>,
    channel: Channel,
    #[serde(default)]
    channel_config: serde_json::Value,
    #[serde(default = "default_frequency")]
    frequency: Frequency,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_frequency() -> Frequency {
    Frequency::Realtime
}

fn default_enabled() -> bool {
    true
}

impl SubscriptionBody {
    fn into_record(self) -> Result<NewSubscription, ApiError> {
        // A webhook subscription's channel config must be schema-complete.
        if self.channel == Channel::Webhook {
            let config: Result<freightwire_common::WebhookConfig, _> =
                serde_json::from_value(self.channel_config.clone());
            if config.is_err() {
                return Err(ApiError::bad_request(
                    "webhook channel_config requires url and secret",
                ));
            }
        }

        Ok(NewSubscription {
            name: self.name,
            source_ids: self.source_ids,
            transport_modes: lowered(self.transport_modes),
            topics: lowered(self.topics),
            regions: lowered(self.regions),
            languages: self.languages,
            urgency_min: self.urgency_min,
            channel: self.channel,
            channel_config: self.channel_config,
            frequency: self.frequency,
            enabled: self.enabled,
        })
    }
}

fn lowered(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|v| v.to_lowercase()).collect()
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscriptionBody>,
) -> ApiResult<(StatusCode, Json<freightwire_common::Subscription>)> {
    let record = body.into_record()?;
    let sub = state.store.create_subscription(&record).await?;
    Ok((StatusCode::CREATED, Json(sub)))
}

async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<freightwire_common::Subscription>>> {
    Ok(Json(state.store.list_subscriptions().await?))
}

async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<freightwire_common::Subscription>> {
    state
        .store
        .get_subscription(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("subscription not found"))
}

async fn update_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubscriptionBody>,
) -> ApiResult<Json<freightwire_common::Subscription>> {
    let record = body.into_record()?;
    state
        .store
        .update_subscription(id, &record)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("subscription not found"))
}

async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.store.delete_subscription(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("subscription not found"))
    }
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TrendingParams {
    #[serde(default = "default_days")]
    days: i64,
    #[serde(default = "default_trending_limit")]
    limit: i64,
}

fn default_days() -> i64 {
    7
}

fn default_trending_limit() -> i64 {
    10
}

async fn trending(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendingParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let since = Utc::now() - Duration::days(params.days.clamp(1, 90));
    let topics = state.store.trending_topics(since, params.limit).await?;
    Ok(Json(serde_json::json!({ "days": params.days, "topics": topics })))
}

#[derive(Debug, Deserialize)]
struct SentimentParams {
    #[serde(default = "default_days")]
    days: i64,
}

async fn sentiment_trend(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SentimentParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let since = Utc::now() - Duration::days(params.days.clamp(1, 90));
    let trend = state.store.sentiment_trend(since).await?;
    Ok(Json(serde_json::json!({ "days": params.days, "trend": trend })))
}

#[derive(Debug, Deserialize)]
struct EntitiesParams {
    #[serde(default = "default_entity_category")]
    category: String,
    #[serde(default = "default_days")]
    days: i64,
    #[serde(default = "default_trending_limit")]
    limit: i64,
}

fn default_entity_category() -> String {
    "companies".to_string()
}

async fn top_entities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EntitiesParams>,
) -> ApiResult<Json<serde_json::Value>> {
    const CATEGORIES: &[&str] = &["companies", "ports", "people", "organizations"];
    if !CATEGORIES.contains(&params.category.as_str()) {
        return Err(ApiError::bad_request(format!(
            "category must be one of {CATEGORIES:?}"
        )));
    }

    let since = Utc::now() - Duration::days(params.days.clamp(1, 90));
    let entities = state
        .store
        .top_entities(&params.category, since, params.limit)
        .await?;
    Ok(Json(serde_json::json!({
        "category": params.category,
        "entities": entities,
    })))
}

// ---------------------------------------------------------------------------
// API keys (admin)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateKeyBody {
    name: String,
    #[serde(default = "default_role")]
    role: ApiRole,
}

fn default_role() -> ApiRole {
    ApiRole::Reader
}

async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateKeyBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    auth.require_admin()?;

    let cleartext = generate_api_key();
    let key = state
        .store
        .create_api_key(&body.name, &hash_api_key(&cleartext), body.role)
        .await?;

    // The cleartext is returned exactly once; only the hash is stored.
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "key": cleartext, "record": key })),
    ))
}

async fn list_api_keys(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<freightwire_common::ApiKey>>> {
    auth.require_admin()?;
    Ok(Json(state.store.list_api_keys().await?))
}

async fn delete_api_key(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    auth.require_admin()?;
    if state.store.delete_api_key(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("API key not found"))
    }
}
