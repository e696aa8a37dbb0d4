//! Text normalization for ingested content.
//!
//! Deterministic pipeline: HTML unescape, tag strip (paragraph breaks
//! preserved), whitespace collapse, Unicode NFKC, full-width punctuation
//! folding for CJK content, and title desuffixing.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static BLOCK_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|div|h[1-6]|li|blockquote|section|article)>|<br\s*/?>")
        .expect("valid regex")
});
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static NEWLINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static SPACE_AROUND_NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\n *").expect("valid regex"));

/// Clean and normalize free text. Returns None when nothing survives.
pub fn clean_text(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }

    // Convert block-level boundaries into newlines before stripping tags so
    // paragraph structure survives.
    let text = BLOCK_CLOSE_RE.replace_all(text, "\n");
    let text = TAG_RE.replace_all(&text, "");

    let text = unescape_html(&text);

    // NFKC folds full-width ASCII and compatibility forms.
    let text: String = text.nfkc().collect();
    let text = fold_cjk_punctuation(&text);

    let text = SPACES_RE.replace_all(&text, " ");
    let text = SPACE_AROUND_NEWLINE_RE.replace_all(&text, "\n");
    let text = NEWLINES_RE.replace_all(&text, "\n\n");
    let text = text.trim();

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Clean an article title: normalize like body text, then strip a trailing
/// "| Source Name" / "- Source Name" suffix when it names the source.
pub fn clean_title(title: &str, source_name: Option<&str>) -> Option<String> {
    let title = clean_text(title)?;
    let title = title.replace('\n', " ");

    let desuffixed = match source_name {
        Some(name) if !name.is_empty() => strip_source_suffix(&title, name),
        _ => title.clone(),
    };

    let out = desuffixed.trim();
    if out.is_empty() {
        None
    } else {
        Some(out.to_string())
    }
}

fn strip_source_suffix(title: &str, source_name: &str) -> String {
    for sep in [" | ", " - ", " – ", " — "] {
        if let Some(idx) = title.rfind(sep) {
            let suffix = title[idx + sep.len()..].trim();
            if suffix.eq_ignore_ascii_case(source_name.trim()) {
                return title[..idx].to_string();
            }
        }
    }
    title.to_string()
}

/// Decode the HTML entities that survive feed and scrape payloads.
fn unescape_html(text: &str) -> String {
    let mut out = text
        .replace("&amp;", "\u{0}AMP\u{0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&ndash;", "–")
        .replace("&mdash;", "—")
        .replace("&hellip;", "…");

    // Numeric character references.
    static NUMERIC_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"&#(x?[0-9a-fA-F]+);").expect("valid regex"));
    out = NUMERIC_RE
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            let code = &caps[1];
            let parsed = if let Some(hex) = code.strip_prefix('x').or(code.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                code.parse::<u32>().ok()
            };
            parsed
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    out.replace("\u{0}AMP\u{0}", "&")
}

/// Fold full-width CJK punctuation to its ASCII counterpart. NFKC already
/// handles full-width letters and digits; these marks normalize to themselves.
fn fold_cjk_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '，' => ',',
            '。' => '.',
            '！' => '!',
            '？' => '?',
            '：' => ':',
            '；' => ';',
            '（' => '(',
            '）' => ')',
            '【' => '[',
            '】' => ']',
            '「' | '」' | '『' | '』' => '"',
            '、' => ',',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_entities() {
        let cleaned = clean_text("<p>Rates &amp; surcharges rose</p>").unwrap();
        assert_eq!(cleaned, "Rates & surcharges rose");
    }

    #[test]
    fn preserves_paragraph_breaks() {
        let cleaned = clean_text("<p>First.</p><p>Second.</p>").unwrap();
        assert_eq!(cleaned, "First.\nSecond.");
    }

    #[test]
    fn collapses_whitespace() {
        let cleaned = clean_text("too   many\t\tspaces").unwrap();
        assert_eq!(cleaned, "too many spaces");
    }

    #[test]
    fn caps_blank_lines() {
        let cleaned = clean_text("a\n\n\n\n\nb").unwrap();
        assert_eq!(cleaned, "a\n\nb");
    }

    #[test]
    fn numeric_entities() {
        assert_eq!(clean_text("&#8217;tis &#x4e2d;").unwrap(), "’tis 中");
    }

    #[test]
    fn nfkc_folds_fullwidth_ascii() {
        assert_eq!(clean_text("ＡＢＣ１２３").unwrap(), "ABC123");
    }

    #[test]
    fn folds_cjk_punctuation() {
        assert_eq!(clean_text("运价上涨，港口拥堵。").unwrap(), "运价上涨,港口拥堵.");
    }

    #[test]
    fn empty_input_is_none() {
        assert!(clean_text("").is_none());
        assert!(clean_text("  <p>  </p> ").is_none());
    }

    #[test]
    fn determinism() {
        let input = "<p>Ｓｈｉｐｐｉｎｇ  rates，rose</p>";
        assert_eq!(clean_text(input), clean_text(input));
    }

    #[test]
    fn title_desuffix_pipe() {
        let title = clean_title("Rates surge | The Loadstar", Some("The Loadstar")).unwrap();
        assert_eq!(title, "Rates surge");
    }

    #[test]
    fn title_desuffix_dash() {
        let title = clean_title("Rates surge - FreightWaves", Some("FreightWaves")).unwrap();
        assert_eq!(title, "Rates surge");
    }

    #[test]
    fn title_suffix_kept_when_not_source_name() {
        let title = clean_title("Rates surge - again", Some("The Loadstar")).unwrap();
        assert_eq!(title, "Rates surge - again");
    }

    #[test]
    fn title_without_source_name_untouched() {
        let title = clean_title("Rates surge | The Loadstar", None).unwrap();
        assert_eq!(title, "Rates surge | The Loadstar");
    }
}
