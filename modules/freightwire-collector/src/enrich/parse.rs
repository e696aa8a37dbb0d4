//! Tolerant parsing and strict validation of the LLM's JSON response.
//!
//! Tolerance is a narrow allow-list: surrounding whitespace and one optional
//! ``` / ```json fence pair. Any other prose is a validation failure, not
//! something to salvage.

use serde_json::Value;

use freightwire_common::error::Result;
use freightwire_common::{
    ContentType, Entities, FreightwireError, KeyMetric, MarketImpact, Sentiment, TransportMode,
    Urgency,
};

/// Validated enrichment payload ready for a single article update.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub summary_en: String,
    pub summary_zh: String,
    pub transport_modes: Vec<String>,
    pub primary_topic: Option<String>,
    pub secondary_topics: Vec<String>,
    pub content_type: Option<ContentType>,
    pub regions: Vec<String>,
    pub entities: Entities,
    pub sentiment: Sentiment,
    pub market_impact: Option<MarketImpact>,
    pub urgency: Urgency,
    pub key_metrics: Vec<KeyMetric>,
}

/// Parse the raw model output into JSON. Accepts exactly: optional
/// whitespace, an optional single fenced code block, the JSON object.
pub fn parse_llm_json(raw: &str) -> Result<Value> {
    let mut text = raw.trim();

    if text.starts_with("```") {
        let after_fence = match text.find('\n') {
            Some(idx) => &text[idx + 1..],
            None => {
                return Err(FreightwireError::Validation(
                    "response is a bare code fence".to_string(),
                ))
            }
        };
        text = after_fence
            .strip_suffix("```")
            .unwrap_or(after_fence)
            .trim();
    }

    if !text.starts_with('{') {
        return Err(FreightwireError::Validation(
            "response is not a JSON object".to_string(),
        ));
    }

    serde_json::from_str(text)
        .map_err(|e| FreightwireError::Validation(format!("invalid JSON from LLM: {e}")))
}

/// Validate field presence and enum membership, and normalize set values to
/// lowercased, de-duplicated form. Missing sentiment, urgency, or either
/// summary rejects the whole response.
pub fn validate_extraction(data: &Value) -> Result<Extraction> {
    let summary_en = required_string(data, "summary_en")?;
    let summary_zh = required_string(data, "summary_zh")?;

    let sentiment: Sentiment = required_enum(data, "sentiment")?;
    let urgency: Urgency = required_enum(data, "urgency")?;
    let market_impact: Option<MarketImpact> = optional_enum(data, "market_impact")?;
    let content_type: Option<ContentType> = optional_enum(data, "content_type")?;

    let transport_modes = normalized_set(data, "transport_modes")
        .into_iter()
        .filter(|m| TransportMode::parse(m).is_some())
        .collect();

    let primary_topic = data
        .get("primary_topic")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let secondary_topics = normalized_set(data, "secondary_topics");
    let regions = normalized_set(data, "regions");

    let entities = data
        .get("entities")
        .map(parse_entities)
        .unwrap_or_default();

    let key_metrics = data
        .get("key_metrics")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|m| {
                    let metric = m.get("metric")?.as_str()?.to_string();
                    let value = m.get("value")?;
                    let value = match value {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        _ => return None,
                    };
                    Some(KeyMetric {
                        metric,
                        value,
                        unit: m
                            .get("unit")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        context: m
                            .get("context")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Extraction {
        summary_en,
        summary_zh,
        transport_modes,
        primary_topic,
        secondary_topics,
        content_type,
        regions,
        entities,
        sentiment,
        market_impact,
        urgency,
        key_metrics,
    })
}

fn required_string(data: &Value, field: &str) -> Result<String> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FreightwireError::Validation(format!("missing required field '{field}'")))
}

fn required_enum<T: serde::de::DeserializeOwned>(data: &Value, field: &str) -> Result<T> {
    let raw = data.get(field).and_then(Value::as_str).ok_or_else(|| {
        FreightwireError::Validation(format!("missing required field '{field}'"))
    })?;
    serde_json::from_value(Value::String(raw.trim().to_lowercase())).map_err(|_| {
        FreightwireError::Validation(format!("'{raw}' is not a valid value for '{field}'"))
    })
}

fn optional_enum<T: serde::de::DeserializeOwned>(data: &Value, field: &str) -> Result<Option<T>> {
    match data.get(field).and_then(Value::as_str) {
        Some(raw) => {
            let parsed = serde_json::from_value(Value::String(raw.trim().to_lowercase()))
                .map_err(|_| {
                    FreightwireError::Validation(format!(
                        "'{raw}' is not a valid value for '{field}'"
                    ))
                })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Lowercased, de-duplicated string set preserving first-seen order.
fn normalized_set(data: &Value, field: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    data.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .filter(|s| seen.insert(s.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_entities(value: &Value) -> Entities {
    let list = |key: &str| -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .filter(|s| seen.insert(s.clone()))
                    .collect()
            })
            .unwrap_or_default()
    };

    Entities {
        companies: list("companies"),
        ports: list("ports"),
        people: list("people"),
        organizations: list("organizations"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_payload() -> Value {
        serde_json::json!({
            "summary_en": "Rates rose.",
            "summary_zh": "运价上涨。",
            "transport_modes": ["Ocean", "ocean", "teleport"],
            "primary_topic": "Freight_Rates",
            "secondary_topics": ["Capacity", "capacity"],
            "content_type": "news",
            "regions": ["Asia", "ASIA", "China"],
            "entities": {"companies": ["Maersk", "Maersk"], "ports": [], "people": [], "organizations": []},
            "sentiment": "negative",
            "market_impact": "high",
            "urgency": "high",
            "key_metrics": [
                {"metric": "spot_rate", "value": "2350", "unit": "USD/FEU", "context": "SHA-LAX"},
                {"metric": "volume_change", "value": -12, "unit": "percent", "context": "YoY"}
            ]
        })
    }

    #[test]
    fn parses_bare_json() {
        assert!(parse_llm_json(r#"{"a": 1}"#).is_ok());
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(parse_llm_json(raw).unwrap()["a"], 1);
    }

    #[test]
    fn parses_plain_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert!(parse_llm_json(raw).is_ok());
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert!(parse_llm_json("  \n {\"a\": 1} \n ").is_ok());
    }

    #[test]
    fn rejects_prose_around_json() {
        assert!(parse_llm_json("Here is the JSON: {\"a\": 1}").is_err());
    }

    #[test]
    fn rejects_non_object() {
        assert!(parse_llm_json("[1, 2]").is_err());
        assert!(parse_llm_json("").is_err());
    }

    #[test]
    fn valid_payload_extracts() {
        let e = validate_extraction(&valid_payload()).unwrap();
        assert_eq!(e.sentiment, Sentiment::Negative);
        assert_eq!(e.urgency, Urgency::High);
        assert_eq!(e.market_impact, Some(MarketImpact::High));
        assert_eq!(e.summary_en, "Rates rose.");
        assert_eq!(e.primary_topic.as_deref(), Some("freight_rates"));
    }

    #[test]
    fn sets_lowercased_and_deduped() {
        let e = validate_extraction(&valid_payload()).unwrap();
        assert_eq!(e.transport_modes, vec!["ocean"]);
        assert_eq!(e.secondary_topics, vec!["capacity"]);
        assert_eq!(e.regions, vec!["asia", "china"]);
        assert_eq!(e.entities.companies, vec!["Maersk"]);
    }

    #[test]
    fn unknown_transport_modes_dropped() {
        let e = validate_extraction(&valid_payload()).unwrap();
        assert!(!e.transport_modes.contains(&"teleport".to_string()));
    }

    #[test]
    fn invalid_sentiment_rejected() {
        let mut payload = valid_payload();
        payload["sentiment"] = Value::String("maybe".to_string());
        assert!(validate_extraction(&payload).is_err());
    }

    #[test]
    fn missing_summary_rejected() {
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("summary_zh");
        assert!(validate_extraction(&payload).is_err());
    }

    #[test]
    fn missing_urgency_rejected() {
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("urgency");
        assert!(validate_extraction(&payload).is_err());
    }

    #[test]
    fn invalid_market_impact_rejected() {
        let mut payload = valid_payload();
        payload["market_impact"] = Value::String("none".to_string());
        assert!(validate_extraction(&payload).is_err());
    }

    #[test]
    fn numeric_metric_value_coerced() {
        let e = validate_extraction(&valid_payload()).unwrap();
        assert_eq!(e.key_metrics[1].value, "-12");
    }

    #[test]
    fn enum_values_case_folded() {
        let mut payload = valid_payload();
        payload["sentiment"] = Value::String("Negative".to_string());
        let e = validate_extraction(&payload).unwrap();
        assert_eq!(e.sentiment, Sentiment::Negative);
    }
}
