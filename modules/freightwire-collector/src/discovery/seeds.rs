//! Discovery seed data: search queries, seed crawl pages, and the bilingual
//! relevance lexicon. Loaded from `DISCOVERY_SEEDS_PATH` when set, with
//! built-in defaults otherwise.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use freightwire_common::error::Result;
use freightwire_common::FreightwireError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordTiers {
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySeeds {
    /// Search queries per language code.
    #[serde(default)]
    pub search_queries: HashMap<String, Vec<String>>,
    /// Industry landing pages crawled for outbound links.
    #[serde(default)]
    pub seed_urls: Vec<String>,
    /// Relevance keywords per language code.
    #[serde(default)]
    pub relevance_keywords: HashMap<String, KeywordTiers>,
}

impl DiscoverySeeds {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    FreightwireError::Config(format!(
                        "cannot read discovery seeds {}: {e}",
                        path.display()
                    ))
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    FreightwireError::Config(format!(
                        "invalid discovery seeds {}: {e}",
                        path.display()
                    ))
                })
            }
            None => Ok(Self::default()),
        }
    }

    pub fn keywords_for(&self, language: &str) -> &KeywordTiers {
        static EMPTY: std::sync::LazyLock<KeywordTiers> =
            std::sync::LazyLock::new(KeywordTiers::default);
        let key = if language.starts_with("zh") { "zh" } else { "en" };
        self.relevance_keywords.get(key).unwrap_or(&EMPTY)
    }
}

impl Default for DiscoverySeeds {
    fn default() -> Self {
        let en_queries = [
            "logistics news site",
            "freight news",
            "shipping industry news",
            "supply chain news site",
            "container shipping news",
            "air cargo news",
            "rail freight news",
            "trucking industry news",
            "port operations news",
            "maritime trade news",
            "freight forwarding news",
            "warehouse logistics news",
            "customs trade compliance news",
        ];
        let zh_queries = [
            "物流新闻网站",
            "航运新闻",
            "货运新闻",
            "供应链新闻",
            "集装箱运输新闻",
            "空运新闻",
            "港口新闻",
            "国际物流资讯",
            "跨境电商物流新闻",
            "铁路货运新闻",
            "快递物流新闻",
            "海运费率新闻",
        ];
        let seed_urls = [
            "https://theloadstar.com",
            "https://www.freightwaves.com",
            "https://www.joc.com",
            "https://splash247.com",
            "https://gcaptain.com",
            "https://www.supplychaindive.com",
            "https://aircargonews.net",
            "https://www.railfreight.com",
            "https://www.ttnews.com",
            "https://www.porttechnology.org",
            "https://www.sofreight.com",
            "https://www.chineseshipping.com.cn",
        ];

        let en_keywords = KeywordTiers {
            high: [
                "freight",
                "shipping",
                "logistics",
                "supply chain",
                "cargo",
                "container",
                "port",
                "carrier",
            ]
            .map(String::from)
            .to_vec(),
            medium: [
                "vessel",
                "terminal",
                "warehouse",
                "customs",
                "tariff",
                "rates",
                "teu",
                "forwarder",
                "charter",
            ]
            .map(String::from)
            .to_vec(),
            low: ["trade", "import", "export", "transport", "delivery", "fleet"]
                .map(String::from)
                .to_vec(),
        };
        let zh_keywords = KeywordTiers {
            high: ["物流", "航运", "货运", "供应链", "集装箱", "港口", "船公司"]
                .map(String::from)
                .to_vec(),
            medium: ["船舶", "码头", "仓储", "海关", "关税", "运价", "货代"]
                .map(String::from)
                .to_vec(),
            low: ["贸易", "进口", "出口", "运输", "配送"].map(String::from).to_vec(),
        };

        Self {
            search_queries: HashMap::from([
                ("en".to_string(), en_queries.map(String::from).to_vec()),
                ("zh".to_string(), zh_queries.map(String::from).to_vec()),
            ]),
            seed_urls: seed_urls.map(String::from).to_vec(),
            relevance_keywords: HashMap::from([
                ("en".to_string(), en_keywords),
                ("zh".to_string(), zh_keywords),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_populated() {
        let seeds = DiscoverySeeds::default();
        assert!(seeds.search_queries["en"].len() >= 10);
        assert!(seeds.search_queries["zh"].len() >= 10);
        assert!(seeds.seed_urls.len() >= 10);
        assert!(!seeds.keywords_for("en").high.is_empty());
    }

    #[test]
    fn zh_variants_map_to_zh_lexicon() {
        let seeds = DiscoverySeeds::default();
        assert_eq!(
            seeds.keywords_for("zh-CN").high,
            seeds.keywords_for("zh").high
        );
    }

    #[test]
    fn unknown_language_falls_back_to_en() {
        let seeds = DiscoverySeeds::default();
        assert_eq!(seeds.keywords_for("de").high, seeds.keywords_for("en").high);
    }

    #[test]
    fn missing_path_yields_defaults() {
        assert!(DiscoverySeeds::load(None).is_ok());
    }
}
