//! MinHash signatures over body text (dedup level 3).
//!
//! Body text is shingled into overlapping 5-character windows; 128 universal
//! hash functions each keep the minimum shingle hash. The fraction of equal
//! signature positions estimates Jaccard similarity of the shingle sets.

use std::collections::HashSet;
use std::sync::LazyLock;

use sha1::{Digest, Sha1};

/// Signature length (number of hash permutations).
pub const MINHASH_PERMS: usize = 128;

/// Character n-gram size for shingling.
const SHINGLE_SIZE: usize = 5;

const MAX_HASH: u64 = (1 << 32) - 1;
const MERSENNE_PRIME: u64 = (1 << 61) - 1;

/// Deterministic (a, b) coefficients for the universal hash family
/// `(a·x + b) mod p`, generated once from a fixed seed so every process
/// produces comparable signatures.
static HASH_PARAMS: LazyLock<[(u64, u64); MINHASH_PERMS]> = LazyLock::new(|| {
    let mut state = 42u64;
    let mut next = move || {
        // SplitMix64
        state = state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    };
    std::array::from_fn(|_| {
        let a = next() % (MERSENNE_PRIME - 1) + 1;
        let b = next() % MERSENNE_PRIME;
        (a, b)
    })
});

/// Shingle text into 5-character windows, lowercased with whitespace
/// collapsed. Text shorter than one window yields a single shingle.
fn shingle(text: &str) -> HashSet<String> {
    let normalized: String = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.is_empty() {
        return HashSet::new();
    }

    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() < SHINGLE_SIZE {
        return HashSet::from([normalized]);
    }

    (0..=chars.len() - SHINGLE_SIZE)
        .map(|i| chars[i..i + SHINGLE_SIZE].iter().collect())
        .collect()
}

/// Hash a shingle to 32 bits: leading 4 bytes of its SHA-1, little-endian.
fn hash_shingle(shingle: &str) -> u64 {
    let digest = Sha1::digest(shingle.as_bytes());
    u32::from_le_bytes(digest[..4].try_into().expect("sha1 digest is 20 bytes")) as u64
}

/// Compute the 128-value MinHash signature of body text. Returns None for
/// empty text.
pub fn minhash128(text: &str) -> Option<[u64; MINHASH_PERMS]> {
    let shingles = shingle(text);
    if shingles.is_empty() {
        return None;
    }

    let hashed: Vec<u64> = shingles.iter().map(|s| hash_shingle(s)).collect();

    let mut signature = [MAX_HASH; MINHASH_PERMS];
    for (slot, &(a, b)) in signature.iter_mut().zip(HASH_PARAMS.iter()) {
        for &h in &hashed {
            let val = (a.wrapping_mul(h).wrapping_add(b) % MERSENNE_PRIME) & MAX_HASH;
            if val < *slot {
                *slot = val;
            }
        }
    }

    Some(signature)
}

/// Estimate Jaccard similarity from two signatures: equal positions / 128.
pub fn jaccard_estimate(a: &[u64], b: &[u64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matches as f64 / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let text = "Spot rates on the transpacific rose 12% this week.";
        assert_eq!(minhash128(text), minhash128(text));
    }

    #[test]
    fn empty_is_none() {
        assert!(minhash128("").is_none());
        assert!(minhash128("   \n\t ").is_none());
    }

    #[test]
    fn identical_text_estimates_one() {
        let sig = minhash128("Container volumes at the Port of Shanghai grew again.").unwrap();
        assert_eq!(jaccard_estimate(&sig, &sig), 1.0);
    }

    #[test]
    fn symmetry() {
        let a = minhash128("Ocean freight rates climbed sharply on Asia-Europe lanes.").unwrap();
        let b = minhash128("Air cargo demand softened in the second quarter.").unwrap();
        assert_eq!(jaccard_estimate(&a, &b), jaccard_estimate(&b, &a));
    }

    #[test]
    fn near_duplicate_scores_high() {
        let base = "Global container shipping rates surged this week as port congestion \
                    worsened across major Asian hubs, with carriers warning of further \
                    increases ahead of peak season.";
        let tweaked = "Global container shipping rates surged this week as port congestion \
                       worsened across major Asian hubs, with carriers warning of further \
                       increases before peak season.";
        let a = minhash128(base).unwrap();
        let b = minhash128(tweaked).unwrap();
        assert!(
            jaccard_estimate(&a, &b) >= 0.85,
            "one-word edit should estimate above threshold, got {}",
            jaccard_estimate(&a, &b)
        );
    }

    #[test]
    fn unrelated_text_scores_low() {
        let a = minhash128("Ocean freight rates climbed sharply on Asia-Europe lanes this week.")
            .unwrap();
        let b = minhash128("The warehouse robotics firm announced a new funding round today.")
            .unwrap();
        assert!(jaccard_estimate(&a, &b) < 0.3);
    }

    #[test]
    fn whitespace_and_case_insensitive() {
        let a = minhash128("Rates   Surge  At Ports").unwrap();
        let b = minhash128("rates surge at ports").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn short_text_single_shingle() {
        assert!(minhash128("abc").is_some());
    }
}
