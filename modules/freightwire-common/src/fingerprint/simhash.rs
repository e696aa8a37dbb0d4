//! 64-bit SimHash over article titles (dedup level 2).
//!
//! Near-duplicate titles land within a small Hamming distance of each other,
//! so cross-source rewrites of the same headline collapse to one article.

use md5::{Digest, Md5};

use crate::lang::is_cjk;

/// Tokenize a title: one token per CJK ideograph, plus lowercased Latin word
/// runs of two or more letters.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for c in text.chars() {
        if is_cjk(c) {
            if word.chars().count() >= 2 {
                tokens.push(word.to_lowercase());
            }
            word.clear();
            tokens.push(c.to_string());
        } else if c.is_ascii_alphabetic() {
            word.push(c);
        } else {
            if word.chars().count() >= 2 {
                tokens.push(word.to_lowercase());
            }
            word.clear();
        }
    }
    if word.chars().count() >= 2 {
        tokens.push(word.to_lowercase());
    }

    tokens
}

/// Hash a token to 64 bits: leading 8 bytes of its MD5, little-endian.
fn hash_token(token: &str) -> u64 {
    let digest = Md5::digest(token.as_bytes());
    u64::from_le_bytes(digest[..8].try_into().expect("md5 digest is 16 bytes"))
}

/// Compute the 64-bit SimHash of a title. Returns None for text with no
/// tokens (empty or punctuation-only).
pub fn simhash64(text: &str) -> Option<u64> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return None;
    }

    let mut acc = [0i32; 64];
    for token in &tokens {
        let h = hash_token(token);
        for (i, slot) in acc.iter_mut().enumerate() {
            if h & (1 << i) != 0 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }

    let mut fingerprint = 0u64;
    for (i, slot) in acc.iter().enumerate() {
        if *slot > 0 {
            fingerprint |= 1 << i;
        }
    }
    Some(fingerprint)
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let title = "Global shipping rates surge amid port congestion";
        assert_eq!(simhash64(title), simhash64(title));
    }

    #[test]
    fn empty_is_none() {
        assert!(simhash64("").is_none());
        assert!(simhash64("... !!! 1 2 3").is_none());
    }

    #[test]
    fn identical_titles_are_distance_zero() {
        let a = simhash64("Port of LA volumes fall").unwrap();
        let b = simhash64("Port of LA volumes fall").unwrap();
        assert_eq!(hamming_distance(a, b), 0);
    }

    #[test]
    fn near_duplicate_titles_are_close() {
        let a = simhash64("Global shipping rates surge amid port congestion").unwrap();
        let b = simhash64("Global shipping rates soar amid port congestion").unwrap();
        assert!(
            hamming_distance(a, b) <= 12,
            "one-word swap should stay close, got {}",
            hamming_distance(a, b)
        );
    }

    #[test]
    fn unrelated_titles_are_far() {
        let a = simhash64("Global shipping rates surge amid port congestion").unwrap();
        let b = simhash64("New warehouse automation startup raises funding").unwrap();
        assert!(
            hamming_distance(a, b) > 10,
            "unrelated titles should differ, got {}",
            hamming_distance(a, b)
        );
    }

    #[test]
    fn case_insensitive_latin() {
        assert_eq!(
            simhash64("Shipping Rates Surge"),
            simhash64("shipping rates surge")
        );
    }

    #[test]
    fn cjk_tokenized_per_ideograph() {
        let tokens = tokenize("上海港拥堵 shipping rates");
        assert_eq!(tokens, vec!["上", "海", "港", "拥", "堵", "shipping", "rates"]);
    }

    #[test]
    fn single_letter_words_ignored() {
        let tokens = tokenize("a big ship");
        assert_eq!(tokens, vec!["big", "ship"]);
    }
}
