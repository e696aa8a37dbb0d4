//! Postgres round-trip tests for the store. Every enum-bearing record is
//! written and read back through a real database so an encode/decode
//! mismatch between the Rust types and the schema cannot hide.
//!
//! Each test runs against its own database provisioned from DATABASE_URL,
//! with migrations applied.

use chrono::{Duration, Utc};
use futures_util::StreamExt;
use sqlx::PgPool;
use uuid::Uuid;

use freightwire_collector::store::{
    EnrichmentUpdate, NewArticle, NewCandidate, NewSource, NewSubscription, Store,
};
use freightwire_common::{
    ApiRole, CandidateStatus, Channel, ContentType, Entities, FetchStatus, Frequency,
    HealthStatus, KeyMetric, MarketImpact, ParserConfig, ProcessingStatus, ScraperConfig,
    Sentiment, SourceKind, Urgency,
};

fn scraper_source(source_id: &str) -> NewSource {
    NewSource {
        source_id: source_id.to_string(),
        name: "Sofreight".to_string(),
        kind: SourceKind::Scraper,
        url: "https://www.sofreight.com/news".to_string(),
        language: Some("zh".to_string()),
        fetch_interval_minutes: 30,
        priority: 5,
        enabled: true,
        parser_config: ParserConfig::Scraper(ScraperConfig {
            list_selector: ".news-list a".to_string(),
            title_selector: None,
            body_selector: Some(".article-content".to_string()),
            date_selector: None,
            date_format: None,
            base_url: None,
            max_articles: Some(10),
        }),
        notes: None,
    }
}

fn new_article(url: &str) -> NewArticle {
    NewArticle {
        source_id: "loadstar".to_string(),
        source_name: Some("The Loadstar".to_string()),
        url: url.to_string(),
        title: "Global shipping rates surge amid port congestion".to_string(),
        body_text: Some("Spot rates rose sharply this week.".to_string()),
        body_markdown: None,
        language: Some("en".to_string()),
        published_at: Some(Utc::now()),
        title_simhash: Some(0x1234_5678_9abc_def0u64 as i64),
        content_minhash: Some((0..128).collect()),
    }
}

fn enrichment(embedding_value: f32) -> EnrichmentUpdate {
    EnrichmentUpdate {
        summary_en: "Rates surged.".to_string(),
        summary_zh: "运价上涨。".to_string(),
        transport_modes: vec!["ocean".to_string()],
        primary_topic: Some("freight_rates".to_string()),
        secondary_topics: vec!["port_operations".to_string()],
        content_type: Some(ContentType::News),
        regions: vec!["asia".to_string()],
        entities: Entities {
            companies: vec!["Maersk".to_string()],
            ..Default::default()
        },
        sentiment: Sentiment::Negative,
        market_impact: Some(MarketImpact::High),
        urgency: Urgency::High,
        key_metrics: vec![KeyMetric {
            metric: "spot_rate_change".to_string(),
            value: "12".to_string(),
            unit: "percent".to_string(),
            context: "week over week".to_string(),
        }],
        embedding: vec![embedding_value; 1024],
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn source_round_trips_enum_columns(pool: PgPool) {
    let store = Store::new(pool);

    store.upsert_source(&scraper_source("sofreight")).await.unwrap();

    let source = store.get_source("sofreight").await.unwrap().unwrap();
    assert_eq!(source.kind, SourceKind::Scraper);
    assert_eq!(source.health_status, HealthStatus::Healthy);
    assert!(matches!(source.parser_config.0, ParserConfig::Scraper(_)));

    store
        .update_source_after_fetch("sofreight", Utc::now(), HealthStatus::Degraded)
        .await
        .unwrap();
    let source = store.get_source("sofreight").await.unwrap().unwrap();
    assert_eq!(source.health_status, HealthStatus::Degraded);
    assert!(source.last_fetched_at.is_some());

    let enabled = store.list_enabled_sources().await.unwrap();
    assert_eq!(enabled.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn upsert_is_idempotent_and_insert_if_absent_refuses(pool: PgPool) {
    let store = Store::new(pool);

    store.upsert_source(&scraper_source("sofreight")).await.unwrap();
    store.upsert_source(&scraper_source("sofreight")).await.unwrap();
    assert_eq!(store.list_sources().await.unwrap().len(), 1);

    assert!(!store
        .insert_source_if_absent(&scraper_source("sofreight"))
        .await
        .unwrap());
    assert!(store
        .insert_source_if_absent(&scraper_source("other"))
        .await
        .unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn article_enrichment_round_trips(pool: PgPool) {
    let store = Store::new(pool);

    let id = store
        .insert_article(&new_article("https://theloadstar.com/a"))
        .await
        .unwrap()
        .expect("first insert returns an id");

    // CAS: the first claim wins, the second sees no pending row.
    assert!(store.claim_for_processing(id).await.unwrap());
    assert!(!store.claim_for_processing(id).await.unwrap());

    store.complete_enrichment(id, &enrichment(0.5)).await.unwrap();

    let article = store.get_article(id).await.unwrap().unwrap();
    assert_eq!(article.processing_status, ProcessingStatus::Completed);
    assert!(article.llm_processed);
    assert_eq!(article.sentiment, Some(Sentiment::Negative));
    assert_eq!(article.urgency, Some(Urgency::High));
    assert_eq!(article.market_impact, Some(MarketImpact::High));
    assert_eq!(article.content_type, Some(ContentType::News));
    assert_eq!(article.transport_modes, vec!["ocean"]);
    assert_eq!(article.entities.0.companies, vec!["Maersk"]);
    assert_eq!(article.key_metrics.0.len(), 1);
    assert!(article.embedding.is_some());

    assert_eq!(
        store.count_by_status(ProcessingStatus::Completed).await.unwrap(),
        1
    );
    assert_eq!(
        store.count_by_status(ProcessingStatus::Pending).await.unwrap(),
        0
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn list_articles_filters_on_enum_columns(pool: PgPool) {
    let store = Store::new(pool);

    let id = store
        .insert_article(&new_article("https://theloadstar.com/a"))
        .await
        .unwrap()
        .unwrap();
    assert!(store.claim_for_processing(id).await.unwrap());
    store.complete_enrichment(id, &enrichment(0.5)).await.unwrap();

    let mut query = freightwire_collector::store::ArticleQuery {
        sentiment: Some(Sentiment::Negative),
        urgency: Some(Urgency::High),
        transport_mode: Some("ocean".to_string()),
        page: 1,
        page_size: 10,
        ..Default::default()
    };
    assert_eq!(store.list_articles(&query).await.unwrap().len(), 1);

    query.sentiment = Some(Sentiment::Positive);
    assert!(store.list_articles(&query).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_article_can_be_reset_and_reclaimed(pool: PgPool) {
    let store = Store::new(pool);

    let id = store
        .insert_article(&new_article("https://theloadstar.com/a"))
        .await
        .unwrap()
        .unwrap();

    assert!(store.claim_for_processing(id).await.unwrap());
    store.mark_enrichment_failed(id, "LLM returned prose").await.unwrap();
    assert_eq!(
        store.count_by_status(ProcessingStatus::Failed).await.unwrap(),
        1
    );

    assert!(store.reset_to_pending(id).await.unwrap());
    assert!(store.claim_for_processing(id).await.unwrap());

    // A completed article is not retryable.
    store.complete_enrichment(id, &enrichment(0.5)).await.unwrap();
    assert!(!store.reset_to_pending(id).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_url_insert_is_rejected(pool: PgPool) {
    let store = Store::new(pool);

    let first = store
        .insert_article(&new_article("https://theloadstar.com/a"))
        .await
        .unwrap();
    assert!(first.is_some());

    let second = store
        .insert_article(&new_article("https://theloadstar.com/a"))
        .await
        .unwrap();
    assert!(second.is_none(), "second insert with the same URL must conflict");

    assert_eq!(store.url_exists("https://theloadstar.com/a").await.unwrap(), first);
}

#[sqlx::test(migrations = "./migrations")]
async fn fingerprints_read_back_for_warmup(pool: PgPool) {
    let store = Store::new(pool);

    let id = store
        .insert_article(&new_article("https://theloadstar.com/a"))
        .await
        .unwrap()
        .unwrap();

    let simhashes = store.title_simhashes().await.unwrap();
    assert_eq!(simhashes, vec![(id, 0x1234_5678_9abc_def0u64 as i64)]);

    let minhashes = store.content_minhashes().await.unwrap();
    assert_eq!(minhashes.len(), 1);
    assert_eq!(minhashes[0].1.len(), 128);
}

#[sqlx::test(migrations = "./migrations")]
async fn semantic_search_and_related_use_the_vector_index(pool: PgPool) {
    let store = Store::new(pool);

    let a = store
        .insert_article(&new_article("https://theloadstar.com/a"))
        .await
        .unwrap()
        .unwrap();
    let b = store
        .insert_article(&new_article("https://splash247.com/b"))
        .await
        .unwrap()
        .unwrap();
    for id in [a, b] {
        assert!(store.claim_for_processing(id).await.unwrap());
    }
    store.complete_enrichment(a, &enrichment(0.5)).await.unwrap();
    store.complete_enrichment(b, &enrichment(-0.5)).await.unwrap();

    let results = store
        .semantic_search(vec![0.5; 1024], Some("ocean"), None, None, 5)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].article.id, a, "exact match ranks first");
    assert!(results[0].similarity > 0.99);

    let related = store.related_articles(a, 5, false).await.unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].article.id, b);
}

#[sqlx::test(migrations = "./migrations")]
async fn subscription_round_trips_enum_columns(pool: PgPool) {
    let store = Store::new(pool);

    let record = NewSubscription {
        name: "ocean desk".to_string(),
        source_ids: vec![],
        transport_modes: vec!["ocean".to_string()],
        topics: vec![],
        regions: vec![],
        languages: vec![],
        urgency_min: Some(Urgency::Medium),
        channel: Channel::Webhook,
        channel_config: serde_json::json!({
            "url": "https://hooks.example.com/in",
            "secret": "shared-secret"
        }),
        frequency: Frequency::Realtime,
        enabled: true,
    };

    let created = store.create_subscription(&record).await.unwrap();
    assert_eq!(created.channel, Channel::Webhook);
    assert_eq!(created.frequency, Frequency::Realtime);
    assert_eq!(created.urgency_min, Some(Urgency::Medium));
    assert!(created.webhook_config().is_some());

    let realtime = store.realtime_webhook_subscriptions().await.unwrap();
    assert_eq!(realtime.len(), 1);
    assert_eq!(realtime[0].id, created.id);

    let mut update = record.clone();
    update.urgency_min = None;
    update.enabled = false;
    let updated = store
        .update_subscription(created.id, &update)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.urgency_min, None);
    assert!(store.realtime_webhook_subscriptions().await.unwrap().is_empty());

    assert!(store.delete_subscription(created.id).await.unwrap());
    assert!(store.get_subscription(created.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn candidate_validation_round_trips(pool: PgPool) {
    let store = Store::new(pool);

    assert!(store
        .insert_candidate(&NewCandidate {
            url: "https://shippingwatch.example".to_string(),
            name: Some("ShippingWatch".to_string()),
            language: Some("en".to_string()),
            discovered_via: "web_search".to_string(),
            discovery_query: Some("shipping industry news".to_string()),
        })
        .await
        .unwrap());

    let claimed = store.claim_candidates_for_validation(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    let candidate = &claimed[0];
    assert_eq!(
        store.get_candidate(candidate.id).await.unwrap().unwrap().status,
        CandidateStatus::Validating
    );

    // Claiming again finds nothing left in `discovered`.
    assert!(store.claim_candidates_for_validation(10).await.unwrap().is_empty());

    store
        .save_validation(
            candidate.id,
            &freightwire_collector::store::ValidationResult {
                status: CandidateStatus::Approved,
                name: Some("ShippingWatch".to_string()),
                feed_url: Some("https://shippingwatch.example/feed".to_string()),
                kind: Some(SourceKind::Feed),
                quality_score: 82,
                relevance_score: 78,
                combined_score: 80,
                sample_articles: vec![],
                validation_details: serde_json::json!({ "reachable": true }),
                error_message: None,
                auto_approved: true,
            },
        )
        .await
        .unwrap();

    let validated = store.get_candidate(candidate.id).await.unwrap().unwrap();
    assert_eq!(validated.status, CandidateStatus::Approved);
    assert_eq!(validated.kind, Some(SourceKind::Feed));
    assert!(validated.auto_approved);
    assert!(validated.validated_at.is_some());

    let approved = store
        .list_candidates(Some(CandidateStatus::Approved), 10, 0)
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
    assert!(store
        .list_candidates(Some(CandidateStatus::Rejected), 10, 0)
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn fetch_log_round_trips_enum_status(pool: PgPool) {
    let store = Store::new(pool);
    store.upsert_source(&scraper_source("sofreight")).await.unwrap();

    let started_at = Utc::now();
    let log_id = store
        .insert_fetch_started("sofreight", started_at)
        .await
        .unwrap();
    store
        .complete_fetch_log(log_id, FetchStatus::Partial, 5, 3, 1, Some("one entry bad"), 1200)
        .await
        .unwrap();

    let logs = store
        .fetch_logs_since("sofreight", started_at - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, FetchStatus::Partial);
    assert_eq!(logs[0].articles_found, 5);
    assert!(logs[0].articles_found >= logs[0].articles_new + logs[0].articles_dedup);

    let all = store.list_fetch_logs(Some("sofreight"), 10).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn api_key_round_trips_role(pool: PgPool) {
    let store = Store::new(pool);

    assert!(!store.any_api_keys().await.unwrap());

    let key = store
        .create_api_key("ops", "a".repeat(64).as_str(), ApiRole::Admin)
        .await
        .unwrap();
    assert!(store.any_api_keys().await.unwrap());

    let found = store
        .find_api_key_by_hash(&"a".repeat(64))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.role, ApiRole::Admin);
    assert!(found.last_used_at.is_none());

    store.touch_api_key(key.id).await.unwrap();
    let touched = store.find_api_key_by_hash(&"a".repeat(64)).await.unwrap().unwrap();
    assert!(touched.last_used_at.is_some());

    assert!(store.delete_api_key(key.id).await.unwrap());
    assert!(!store.delete_api_key(Uuid::new_v4()).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn completed_stream_yields_enriched_articles(pool: PgPool) {
    let store = Store::new(pool);

    let done = store
        .insert_article(&new_article("https://theloadstar.com/a"))
        .await
        .unwrap()
        .unwrap();
    assert!(store.claim_for_processing(done).await.unwrap());
    store.complete_enrichment(done, &enrichment(0.5)).await.unwrap();

    // A pending article must not appear in the export scan.
    store
        .insert_article(&new_article("https://splash247.com/b"))
        .await
        .unwrap()
        .unwrap();

    let mut stream = store.stream_completed_articles();
    let mut seen = Vec::new();
    while let Some(article) = stream.next().await {
        seen.push(article.unwrap().id);
    }
    assert_eq!(seen, vec![done]);
}
