//! Versioned prompt template for article analysis.

/// Bump when the template or field vocabulary changes.
pub const PROMPT_VERSION: &str = "v2";

/// Body text is truncated to this many characters before prompting.
pub const BODY_TRUNCATE_CHARS: usize = 8000;

pub const SYSTEM_PROMPT: &str = "\
You are a logistics and supply chain news analyst. Your task is to analyze news \
articles and extract structured metadata. You handle articles in any language, \
including English and Chinese.

You MUST respond with a single valid JSON object and nothing else — no markdown \
fences, no commentary, no extra text. The JSON must conform exactly to the schema \
described in the user message.";

pub fn build_user_prompt(title: &str, body_text: &str) -> String {
    let body: String = body_text.chars().take(BODY_TRUNCATE_CHARS).collect();

    format!(
        r#"Analyze the following logistics/shipping news article and return a JSON object with the extracted fields.

=== ARTICLE ===
Title: {title}

Body:
{body}
=== END ARTICLE ===

Return a JSON object with these fields:

1. "summary_en" (string): A concise 2-3 sentence summary in English. Translate if the article is in another language.

2. "summary_zh" (string): A concise 2-3 sentence summary in Chinese. Translate if the article is in another language.

3. "transport_modes" (array of strings): Which transport modes are discussed. Choose from: "ocean", "air", "rail", "road". Return an empty array if none apply.
   Example: ["ocean", "rail"]

4. "primary_topic" (string): The single most relevant topic. Choose from: "freight_rates", "port_operations", "supply_chain_disruption", "trade_policy", "carrier_news", "technology", "sustainability", "labor", "mergers_acquisitions", "capacity", "regulation", "infrastructure", "ecommerce_logistics", "last_mile", "warehousing", "cold_chain", "dangerous_goods", "customs", "market_outlook", "other".

5. "secondary_topics" (array of strings): Additional relevant topics from the same list. Return an empty array if only one topic applies.

6. "content_type" (string): Choose from: "news", "analysis", "opinion", "press_release", "market_data".

7. "regions" (array of strings): Geographic regions mentioned or relevant, e.g. "Asia", "Europe", "North America", "Southeast Asia", "Mediterranean", plus specific country names when prominently featured. Return an empty array if no specific region is discussed.

8. "entities" (object): Named entities with keys "companies", "ports", "people", "organizations", each an array of strings. Return empty arrays for categories with no entities.
   Example: {{"companies": ["Maersk", "MSC"], "ports": ["Shanghai", "Rotterdam"], "people": ["Vincent Clerc"], "organizations": ["IMO", "FMC"]}}

9. "sentiment" (string): Overall sentiment. Choose from: "positive", "negative", "neutral".

10. "market_impact" (string): Expected impact on the logistics market. Choose from: "high", "medium", "low".

11. "urgency" (string): How time-sensitive this news is. Choose from: "high", "medium", "low".

12. "key_metrics" (array of objects): Numerical data points mentioned in the article. Each object has "metric", "value" (string, preserving formatting), "unit", and "context". Return an empty array if no metrics are found.
    Example: [{{"metric": "freight_rate", "value": "2350", "unit": "USD/FEU", "context": "Shanghai-Los Angeles spot rate"}}]

Respond ONLY with the JSON object. No extra text."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_title_and_body() {
        let prompt = build_user_prompt("Rates surge", "Spot rates rose sharply.");
        assert!(prompt.contains("Title: Rates surge"));
        assert!(prompt.contains("Spot rates rose sharply."));
    }

    #[test]
    fn body_truncated() {
        let body = "x".repeat(BODY_TRUNCATE_CHARS + 500);
        let prompt = build_user_prompt("t", &body);
        assert!(!prompt.contains(&"x".repeat(BODY_TRUNCATE_CHARS + 1)));
    }

    #[test]
    fn escaped_braces_render() {
        let prompt = build_user_prompt("t", "b");
        assert!(prompt.contains(r#"{"companies": ["Maersk", "MSC"]"#));
    }
}
