//! Body-based language detection for the bilingual (en/zh) corpus.

/// Minimum text length to attempt detection; shorter inputs default to "en".
const MIN_TEXT_LENGTH: usize = 20;

/// Fraction of CJK ideographs above which text is classified as Chinese.
const CJK_RATIO_THRESHOLD: f64 = 0.15;

pub fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}')
}

/// Detect the dominant language of article text. Returns "zh" when a
/// meaningful share of the alphabetic content is CJK ideographs, "en"
/// otherwise. Chinese text carries far fewer characters per word than
/// English, so a low ratio threshold is sufficient.
pub fn detect_language(text: &str) -> &'static str {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_TEXT_LENGTH {
        return "en";
    }

    let mut cjk = 0usize;
    let mut total = 0usize;
    for c in trimmed.chars() {
        if c.is_whitespace() || c.is_ascii_punctuation() || c.is_ascii_digit() {
            continue;
        }
        total += 1;
        if is_cjk(c) {
            cjk += 1;
        }
    }

    if total == 0 {
        return "en";
    }

    if cjk as f64 / total as f64 >= CJK_RATIO_THRESHOLD {
        "zh"
    } else {
        "en"
    }
}
