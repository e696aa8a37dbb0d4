//! Full-text extraction: HTML → markdown via Readability, markdown → plain
//! text for search indexing and fingerprinting.

use std::sync::LazyLock;

use regex::Regex;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

use freightwire_common::text::clean_text;

/// Convert raw HTML bytes into clean markdown using Readability extraction.
pub fn html_to_markdown(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}

static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static MD_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
static MD_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[#>\-\*\+]+\s*|^\d+\.\s+").expect("valid regex"));
static MD_EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*_`|]+").expect("valid regex"));

/// Strip markdown syntax down to plain text and run it through the
/// normalizer.
pub fn markdown_to_text(markdown: &str) -> Option<String> {
    let text = MD_IMAGE_RE.replace_all(markdown, "");
    let text = MD_LINK_RE.replace_all(&text, "$1");
    let text = MD_MARKER_RE.replace_all(&text, "");
    let text = MD_EMPHASIS_RE.replace_all(&text, "");
    clean_text(&text)
}

/// Extract (markdown, plain text) from a fetched article page. Returns
/// (None, None) when Readability finds no usable content.
pub fn extract_page(html: &str, url: &str) -> (Option<String>, Option<String>) {
    let markdown = html_to_markdown(html.as_bytes(), Some(url));
    let markdown = markdown.trim();
    if markdown.is_empty() {
        return (None, None);
    }
    let text = markdown_to_text(markdown);
    (Some(markdown.to_string()), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_links_reduced_to_anchor_text() {
        let text = markdown_to_text("Rates [surged](https://example.com/a) this week").unwrap();
        assert_eq!(text, "Rates surged this week");
    }

    #[test]
    fn markdown_images_removed() {
        let text = markdown_to_text("![chart](https://example.com/c.png)\n\nVolumes fell").unwrap();
        assert_eq!(text, "Volumes fell");
    }

    #[test]
    fn markdown_headers_and_emphasis_stripped() {
        let text = markdown_to_text("# Headline\n\n**Bold** and *italic* text").unwrap();
        assert_eq!(text, "Headline\n\nBold and italic text");
    }

    #[test]
    fn empty_markdown_is_none() {
        assert!(markdown_to_text("").is_none());
        assert!(markdown_to_text("## \n\n* ").is_none());
    }
}
