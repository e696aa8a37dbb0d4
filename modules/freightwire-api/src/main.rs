//! freightwire: multi-source news aggregation and enrichment pipeline.
//!
//! Composition root. Wires config, store, dedup, adapters, scheduler,
//! enrichment, dispatch, and discovery, then serves the HTTP/WebSocket API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::{EmbedModel, OpenAi};
use freightwire_collector::adapters::AdapterPlane;
use freightwire_collector::dedup::Deduplicator;
use freightwire_collector::discovery::{DiscoveryLoop, DiscoverySeeds, ScanEngine, Validator};
use freightwire_collector::dispatch::{Dispatcher, PushRegistry, WebhookSender};
use freightwire_collector::enrich::EnrichmentPipeline;
use freightwire_collector::ingest::Ingestor;
use freightwire_collector::scheduler::Scheduler;
use freightwire_collector::seed::seed_sources;
use freightwire_collector::Store;
use freightwire_common::config::LogFormat;
use freightwire_common::Config;

mod auth;
mod error;
mod ratelimit;
mod routes;
mod ws;

use ratelimit::RateLimiter;

/// Queue capacities for the enrichment and webhook pipelines.
const ENRICH_QUEUE: usize = 1024;
const WEBHOOK_QUEUE: usize = 1024;

/// Shutdown drain budgets.
const FETCH_DRAIN: Duration = Duration::from_secs(30);
const WEBHOOK_DRAIN: Duration = Duration::from_secs(15);

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub registry: Arc<PushRegistry>,
    pub discovery: Arc<DiscoveryLoop>,
    pub enrich_tx: mpsc::Sender<uuid::Uuid>,
    pub embedder: Option<Arc<dyn EmbedModel>>,
    pub rate_limiter: RateLimiter,
    pub shutdown: watch::Receiver<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(&config);
    config.log_redacted();

    let store = Store::connect(&config.database_url, config.db_pool_size).await?;
    store.migrate().await?;
    info!("migrations applied");

    if let Some(path) = &config.sources_config_path {
        seed_sources(&store, path).await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (enrich_tx, enrich_rx) = mpsc::channel(ENRICH_QUEUE);
    let (webhook_tx, webhook_rx) = mpsc::channel(WEBHOOK_QUEUE);

    // Dedup cascade with warm LSH index.
    let dedup = Arc::new(Deduplicator::new(
        store.clone(),
        config.simhash_hamming_threshold,
        config.minhash_jaccard_threshold,
    ));
    let warmed = dedup.warm_lsh().await?;
    info!(signatures = warmed, "LSH index warmed from store");

    // Push + webhook dispatch.
    let registry = Arc::new(PushRegistry::new(config.max_push_connections));
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        Arc::clone(&registry),
        webhook_tx,
    ));
    let webhook_sender = Arc::new(WebhookSender::new(store.clone()));
    let webhook_handles = Arc::clone(&webhook_sender).spawn_workers(
        webhook_rx,
        config.webhook_workers,
        shutdown_rx.clone(),
    );

    // Enrichment pipeline (idle when no LLM key is configured).
    let mut embedder: Option<Arc<dyn EmbedModel>> = None;
    let mut enrich_handles = Vec::new();
    if config.llm_enabled() {
        let model = Arc::new(
            OpenAi::new(&config.llm_api_key, &config.llm_model)
                .with_base_url(&config.llm_base_url)
                .with_embedding_model(&config.embedding_model)
                .with_embedding_dimensions(config.embedding_dimensions)
                .with_temperature(0.2),
        );
        embedder = Some(model.clone() as Arc<dyn EmbedModel>);
        let pipeline = Arc::new(EnrichmentPipeline::new(
            store.clone(),
            model.clone(),
            model,
            Arc::clone(&dispatcher),
            config.embedding_dimensions,
        ));
        enrich_handles =
            pipeline.spawn_workers(enrich_rx, config.enrich_workers, shutdown_rx.clone());
    } else {
        warn!("LLM_API_KEY not set; enrichment disabled");
    }

    // Collection scheduler + enrichment backstop.
    let plane = Arc::new(AdapterPlane::new());
    let ingestor = Arc::new(Ingestor::new(store.clone(), Arc::clone(&dedup)));
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        Arc::clone(&plane),
        ingestor,
        enrich_tx.clone(),
        config.fetch_concurrency,
    ));
    let scheduler_handle = Arc::clone(&scheduler).spawn(shutdown_rx.clone());
    let backstop_handle =
        Scheduler::spawn_backstop(store.clone(), enrich_tx.clone(), shutdown_rx.clone());

    // Discovery loop.
    let seeds = DiscoverySeeds::load(config.discovery_seeds_path.as_deref())?;
    let engine = ScanEngine::new(
        seeds.clone(),
        config.search_api_key.clone(),
        config.search_engine_id.clone(),
    );
    let validator = Arc::new(Validator::new(seeds, config.auto_approve_threshold));
    let discovery = Arc::new(DiscoveryLoop::new(
        store.clone(),
        engine,
        validator,
        config.discovery_enabled,
        config.discovery_scan_interval_hours,
        config.discovery_validate_interval_hours,
        config.discovery_validate_batch,
    ));
    let discovery_handles = discovery.spawn(shutdown_rx.clone());

    // HTTP surface.
    let state = Arc::new(AppState {
        rate_limiter: RateLimiter::new(config.rate_limit_rpm),
        config: config.clone(),
        store: store.clone(),
        registry,
        discovery,
        enrich_tx,
        embedder,
        shutdown: shutdown_rx.clone(),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/health/sources", get(routes::source_health))
        .route("/ws/articles", get(ws::upgrade))
        .nest("/api/v1", routes::router())
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "listening");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    server.await?;

    // Shutdown: stop accepting ticks, drain in-flight work, then exit.
    info!("shutting down");
    shutdown_tx.send(true).ok();

    let drain_fetches = async {
        scheduler_handle.await.ok();
        scheduler.drain().await;
        backstop_handle.await.ok();
        for handle in discovery_handles {
            handle.await.ok();
        }
        for handle in enrich_handles {
            handle.await.ok();
        }
    };
    if tokio::time::timeout(FETCH_DRAIN, drain_fetches).await.is_err() {
        warn!("fetch drain budget exceeded, aborting remaining tasks");
    }

    let drain_webhooks = async {
        for handle in webhook_handles {
            handle.await.ok();
        }
    };
    if tokio::time::timeout(WEBHOOK_DRAIN, drain_webhooks).await.is_err() {
        warn!("webhook drain budget exceeded");
    }

    info!("shutdown complete");
    Ok(())
}

async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> axum::Json<serde_json::Value> {
    use freightwire_common::ProcessingStatus;

    // Best-effort counters; the health check stays green even when the
    // store is briefly unreachable.
    let mut articles = serde_json::Map::new();
    for status in [
        ProcessingStatus::Pending,
        ProcessingStatus::Processing,
        ProcessingStatus::Completed,
        ProcessingStatus::Failed,
    ] {
        if let Ok(count) = state.store.count_by_status(status).await {
            let key = match status {
                ProcessingStatus::Pending => "pending",
                ProcessingStatus::Processing => "processing",
                ProcessingStatus::Completed => "completed",
                ProcessingStatus::Failed => "failed",
            };
            articles.insert(key.to_string(), serde_json::json!(count));
        }
    }

    axum::Json(serde_json::json!({
        "status": "ok",
        "push_connections": state.registry.connection_count(),
        "llm_enabled": state.config.llm_enabled(),
        "articles": articles,
    }))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,freightwire=info,sqlx=warn"));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
