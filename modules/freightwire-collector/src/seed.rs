//! Startup seeding of configured sources from a JSON file.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use freightwire_common::error::Result;
use freightwire_common::{FreightwireError, ParserConfig, SourceKind};

use crate::store::{NewSource, Store};

#[derive(Debug, Deserialize)]
struct SeedFile {
    sources: Vec<SeedSource>,
}

#[derive(Debug, Deserialize)]
struct SeedSource {
    source_id: String,
    name: String,
    kind: SourceKind,
    url: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default = "default_interval")]
    fetch_interval_minutes: i32,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    parser_config: Option<ParserConfig>,
    #[serde(default)]
    notes: Option<String>,
}

fn default_interval() -> i32 {
    30
}

fn default_priority() -> i32 {
    5
}

fn default_enabled() -> bool {
    true
}

/// Upsert every source in the seed file. Idempotent; run at startup.
pub async fn seed_sources(store: &Store, path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        FreightwireError::Config(format!("cannot read sources file {}: {e}", path.display()))
    })?;

    let seed_file: SeedFile = serde_json::from_str(&raw).map_err(|e| {
        FreightwireError::Config(format!("invalid sources file {}: {e}", path.display()))
    })?;

    let count = seed_file.sources.len();
    for seed in seed_file.sources {
        let parser_config = seed.parser_config.unwrap_or_else(|| default_config(seed.kind));
        store
            .upsert_source(&NewSource {
                source_id: seed.source_id,
                name: seed.name,
                kind: seed.kind,
                url: seed.url,
                language: seed.language,
                fetch_interval_minutes: seed.fetch_interval_minutes,
                priority: seed.priority,
                enabled: seed.enabled,
                parser_config,
                notes: seed.notes,
            })
            .await?;
    }

    info!(count, path = %path.display(), "sources seeded");
    Ok(count)
}

fn default_config(kind: SourceKind) -> ParserConfig {
    match kind {
        SourceKind::Feed => ParserConfig::Feed(Default::default()),
        _ => ParserConfig::Universal(Default::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_file_parses() {
        let raw = r#"{
            "sources": [
                {
                    "source_id": "loadstar",
                    "name": "The Loadstar",
                    "kind": "feed",
                    "url": "https://theloadstar.com/feed",
                    "language": "en",
                    "fetch_interval_minutes": 30
                },
                {
                    "source_id": "sofreight",
                    "name": "Sofreight",
                    "kind": "scraper",
                    "url": "https://www.sofreight.com/news",
                    "language": "zh",
                    "parser_config": {
                        "kind": "scraper",
                        "list_selector": ".news-list a",
                        "body_selector": ".article-content"
                    }
                }
            ]
        }"#;
        let parsed: SeedFile = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.sources.len(), 2);
        assert_eq!(parsed.sources[0].kind, SourceKind::Feed);
        assert!(parsed.sources[0].enabled);
        assert_eq!(parsed.sources[1].priority, 5);
        assert!(matches!(
            parsed.sources[1].parser_config,
            Some(ParserConfig::Scraper(_))
        ));
    }

    #[test]
    fn default_config_by_kind() {
        assert!(matches!(
            default_config(SourceKind::Feed),
            ParserConfig::Feed(_)
        ));
        assert!(matches!(
            default_config(SourceKind::Api),
            ParserConfig::Universal(_)
        ));
    }
}
