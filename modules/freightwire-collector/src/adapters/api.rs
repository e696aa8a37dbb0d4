//! Generic JSON API adapter driven by a typed parser configuration.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use freightwire_common::error::Result;
use freightwire_common::{
    ApiAuth, ApiConfig, ApiPagination, FreightwireError, ParserConfig, RawArticle, Source,
};

use super::{http_client, parse_date_flexible, FetchOutcome, SourceAdapter};

pub struct ApiAdapter {
    client: reqwest::Client,
}

impl Default for ApiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }

    async fn fetch_pages(&self, base_url: &str, cfg: &ApiConfig) -> Result<FetchOutcome> {
        let mut outcome = FetchOutcome::default();
        let mut cursor: Option<String> = None;
        let mut offset: u64 = 0;

        for page in 1..=cfg.max_pages {
            let mut request = self.client.get(base_url);
            request = apply_auth(request, cfg)?;

            let mut params: Vec<(String, String)> = Vec::new();
            if let (Some(param), Some(size)) = (&cfg.page_size_param, cfg.page_size) {
                params.push((param.clone(), size.to_string()));
            }
            match cfg.pagination {
                ApiPagination::None => {}
                ApiPagination::PageNumber => {
                    let param = cfg.pagination_param.as_deref().unwrap_or("page");
                    params.push((param.to_string(), page.to_string()));
                }
                ApiPagination::Offset => {
                    let param = cfg.pagination_param.as_deref().unwrap_or("offset");
                    params.push((param.to_string(), offset.to_string()));
                }
                ApiPagination::Cursor => {
                    if let Some(c) = &cursor {
                        let param = cfg.pagination_param.as_deref().unwrap_or("cursor");
                        params.push((param.to_string(), c.clone()));
                    }
                }
            }
            if !params.is_empty() {
                request = request.query(&params);
            }

            let resp = request
                .send()
                .await
                .map_err(|e| FreightwireError::Network(format!("API fetch failed: {e}")))?;

            if !resp.status().is_success() {
                return Err(FreightwireError::Network(format!(
                    "API fetch failed: HTTP {} from {base_url}",
                    resp.status()
                )));
            }

            let body: Value = resp
                .json()
                .await
                .map_err(|e| FreightwireError::Parse(format!("API response not JSON: {e}")))?;

            let items = match items_at_path(&body, &cfg.items_path) {
                Some(items) => items,
                None => {
                    return Err(FreightwireError::Parse(format!(
                        "items_path '{}' did not resolve to an array",
                        cfg.items_path
                    )))
                }
            };

            if items.is_empty() {
                break;
            }

            let page_count = items.len() as u64;
            for item in items {
                match map_item(item, cfg) {
                    Ok(article) => outcome.articles.push(article),
                    Err(e) => outcome.errors.push(e.to_string()),
                }
            }

            offset += page_count;

            if cfg.pagination == ApiPagination::Cursor {
                cursor = cfg
                    .cursor_path
                    .as_deref()
                    .and_then(|p| value_at_path(&body, p))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if cursor.is_none() {
                    break;
                }
            }
            if cfg.pagination == ApiPagination::None {
                break;
            }
        }

        info!(
            url = base_url,
            items = outcome.articles.len(),
            errors = outcome.errors.len(),
            "api: fetched"
        );

        Ok(outcome)
    }
}

#[async_trait]
impl SourceAdapter for ApiAdapter {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        let cfg = match &source.parser_config.0 {
            ParserConfig::Api(cfg) => cfg,
            _ => {
                return Err(FreightwireError::Config(format!(
                    "source {} has no API parser config",
                    source.source_id
                )))
            }
        };
        self.fetch_pages(&source.url, cfg).await
    }
}

fn apply_auth(
    request: reqwest::RequestBuilder,
    cfg: &ApiConfig,
) -> Result<reqwest::RequestBuilder> {
    match cfg.auth {
        ApiAuth::None => Ok(request),
        ApiAuth::ApiKeyHeader => {
            let header = cfg.auth_header.as_deref().ok_or_else(|| {
                FreightwireError::Config("api_key_header auth requires auth_header".to_string())
            })?;
            Ok(request.header(header, resolve_secret(cfg)?))
        }
        ApiAuth::Bearer => Ok(request.bearer_auth(resolve_secret(cfg)?)),
    }
}

/// Resolve the auth secret; a `$NAME` value reads the environment so raw
/// credentials never live in source configuration.
fn resolve_secret(cfg: &ApiConfig) -> Result<String> {
    let value = cfg
        .auth_value
        .as_deref()
        .ok_or_else(|| FreightwireError::Config("auth_value is required".to_string()))?;

    if let Some(env_name) = value.strip_prefix('$') {
        std::env::var(env_name).map_err(|_| {
            FreightwireError::Config(format!("environment variable {env_name} is not set"))
        })
    } else {
        Ok(value.to_string())
    }
}

/// Walk a dot-separated path of object keys. An empty path returns the root.
fn value_at_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn items_at_path<'a>(root: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    value_at_path(root, path)?.as_array()
}

fn string_at_path(item: &Value, path: &str) -> Option<String> {
    let value = value_at_path(item, path)?;
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn map_item(item: &Value, cfg: &ApiConfig) -> Result<RawArticle> {
    let title = string_at_path(item, &cfg.fields.title)
        .ok_or_else(|| FreightwireError::Parse(format!("item missing title at '{}'", cfg.fields.title)))?;
    let url = string_at_path(item, &cfg.fields.url)
        .ok_or_else(|| FreightwireError::Parse(format!("item missing url at '{}'", cfg.fields.url)))?;

    let mut article = RawArticle::new(url, title);
    if let Some(path) = &cfg.fields.body {
        article.body_text = string_at_path(item, path);
        article.body_markdown = article.body_text.clone();
    }
    if let Some(path) = &cfg.fields.published_at {
        article.published_at = string_at_path(item, path)
            .as_deref()
            .and_then(parse_date_flexible);
    }
    if let Some(path) = &cfg.fields.author {
        article.author = string_at_path(item, path);
    }
    article.metadata = serde_json::json!({ "adapter": "api" });

    Ok(article)
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightwire_common::ApiFieldMap;

    fn cfg(items_path: &str) -> ApiConfig {
        ApiConfig {
            auth: ApiAuth::None,
            auth_header: None,
            auth_value: None,
            pagination: ApiPagination::None,
            pagination_param: None,
            page_size_param: None,
            page_size: None,
            cursor_path: None,
            max_pages: 10,
            items_path: items_path.to_string(),
            fields: ApiFieldMap {
                title: "headline".to_string(),
                url: "link".to_string(),
                body: Some("content.text".to_string()),
                published_at: Some("published".to_string()),
                author: Some("byline".to_string()),
            },
        }
    }

    #[test]
    fn walks_nested_paths() {
        let data = serde_json::json!({"data": {"articles": [1, 2]}});
        assert_eq!(items_at_path(&data, "data.articles").unwrap().len(), 2);
    }

    #[test]
    fn empty_path_is_root() {
        let data = serde_json::json!([1, 2, 3]);
        assert_eq!(items_at_path(&data, "").unwrap().len(), 3);
    }

    #[test]
    fn missing_path_is_none() {
        let data = serde_json::json!({"data": {}});
        assert!(items_at_path(&data, "data.articles").is_none());
        assert!(value_at_path(&data, "data.x.y").is_none());
    }

    #[test]
    fn maps_item_fields() {
        let item = serde_json::json!({
            "headline": "Rates surge",
            "link": "https://example.com/a",
            "content": {"text": "Body text"},
            "published": "2026-03-01T10:00:00Z",
            "byline": "A. Writer"
        });
        let article = map_item(&item, &cfg("")).unwrap();
        assert_eq!(article.title, "Rates surge");
        assert_eq!(article.url, "https://example.com/a");
        assert_eq!(article.body_text.as_deref(), Some("Body text"));
        assert!(article.published_at.is_some());
        assert_eq!(article.author.as_deref(), Some("A. Writer"));
    }

    #[test]
    fn item_without_title_is_error() {
        let item = serde_json::json!({"link": "https://example.com/a"});
        assert!(map_item(&item, &cfg("")).is_err());
    }

    #[test]
    fn numeric_field_coerced_to_string() {
        let item = serde_json::json!({"headline": "t", "link": "https://e.com/1", "byline": 7});
        let article = map_item(&item, &cfg("")).unwrap();
        assert_eq!(article.author.as_deref(), Some("7"));
    }
}
