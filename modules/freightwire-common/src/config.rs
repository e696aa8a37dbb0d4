use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,
    pub db_pool_size: u32,

    // LLM provider (OpenAI-compatible). Enrichment is disabled when the API
    // key is empty.
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,

    // Discovery search (optional custom-search API)
    pub search_api_key: Option<String>,
    pub search_engine_id: Option<String>,

    // HTTP server
    pub listen_addr: String,
    pub rate_limit_rpm: usize,
    pub max_push_connections: usize,

    // Worker pools
    pub fetch_concurrency: usize,
    pub enrich_workers: usize,
    pub webhook_workers: usize,

    // Deduplication tuning
    pub simhash_hamming_threshold: u32,
    pub minhash_jaccard_threshold: f64,

    // Discovery tuning
    pub auto_approve_threshold: f64,
    pub discovery_scan_interval_hours: u64,
    pub discovery_validate_interval_hours: u64,
    pub discovery_validate_batch: usize,
    pub discovery_enabled: bool,

    // Seed files
    pub sources_config_path: Option<PathBuf>,
    pub discovery_seeds_path: Option<PathBuf>,

    // Logging
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            db_pool_size: parsed_env("DB_POOL_SIZE", 20),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "bge-m3".to_string()),
            embedding_dimensions: parsed_env("EMBEDDING_DIMENSIONS", 1024),
            search_api_key: env::var("DISCOVERY_SEARCH_API_KEY").ok().filter(|v| !v.is_empty()),
            search_engine_id: env::var("DISCOVERY_SEARCH_ENGINE_ID")
                .ok()
                .filter(|v| !v.is_empty()),
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            rate_limit_rpm: parsed_env("RATE_LIMIT_RPM", 120),
            max_push_connections: parsed_env("MAX_PUSH_CONNECTIONS", 100),
            fetch_concurrency: parsed_env("FETCH_CONCURRENCY", 8),
            enrich_workers: parsed_env("ENRICH_WORKERS", 4),
            webhook_workers: parsed_env("WEBHOOK_WORKERS", 4),
            simhash_hamming_threshold: parsed_env("SIMHASH_HAMMING_THRESHOLD", 3),
            minhash_jaccard_threshold: parsed_env("MINHASH_JACCARD_THRESHOLD", 0.85),
            auto_approve_threshold: parsed_env("DISCOVERY_AUTO_APPROVE_THRESHOLD", 75.0),
            discovery_scan_interval_hours: parsed_env("DISCOVERY_SCAN_INTERVAL_HOURS", 24),
            discovery_validate_interval_hours: parsed_env("DISCOVERY_VALIDATE_INTERVAL_HOURS", 2),
            discovery_validate_batch: parsed_env("DISCOVERY_VALIDATE_BATCH", 10),
            discovery_enabled: parsed_env("DISCOVERY_ENABLED", true),
            sources_config_path: env::var("SOURCES_CONFIG_PATH").ok().map(PathBuf::from),
            discovery_seeds_path: env::var("DISCOVERY_SEEDS_PATH").ok().map(PathBuf::from),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }

    /// Log the presence of sensitive values without revealing them.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("LLM_API_KEY", &self.llm_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }

    pub fn llm_enabled(&self) -> bool {
        !self.llm_api_key.is_empty()
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
