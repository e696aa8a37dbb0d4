//! Banded LSH index over MinHash signatures.
//!
//! 16 bands × 8 rows: two signatures become candidates when any band is
//! bit-identical. The index is in-process and transient; it is rebuilt from
//! persisted signatures on startup. Candidates must still pass the full
//! Jaccard estimate; banding only prunes the comparison set.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use uuid::Uuid;

use super::minhash::{jaccard_estimate, MINHASH_PERMS};

const NUM_BANDS: usize = 16;
const ROWS_PER_BAND: usize = 8;

pub struct LshIndex {
    /// One bucket map per band: band hash → article ids.
    buckets: Vec<HashMap<u64, HashSet<Uuid>>>,
    /// Full signatures for candidate verification.
    signatures: HashMap<Uuid, Vec<u64>>,
}

impl Default for LshIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LshIndex {
    pub fn new() -> Self {
        debug_assert!(NUM_BANDS * ROWS_PER_BAND <= MINHASH_PERMS);
        Self {
            buckets: (0..NUM_BANDS).map(|_| HashMap::new()).collect(),
            signatures: HashMap::new(),
        }
    }

    fn band_hash(signature: &[u64], band: usize) -> u64 {
        let start = band * ROWS_PER_BAND;
        let mut hasher = DefaultHasher::new();
        signature[start..start + ROWS_PER_BAND].hash(&mut hasher);
        hasher.finish()
    }

    pub fn insert(&mut self, id: Uuid, signature: Vec<u64>) {
        if signature.len() < NUM_BANDS * ROWS_PER_BAND {
            return;
        }
        for band in 0..NUM_BANDS {
            let key = Self::band_hash(&signature, band);
            self.buckets[band].entry(key).or_default().insert(id);
        }
        self.signatures.insert(id, signature);
    }

    /// Find near-duplicate candidates for a signature: collect ids sharing
    /// any identical band, verify with the full estimator, return matches at
    /// or above `threshold` sorted by similarity descending.
    pub fn query(&self, signature: &[u64], threshold: f64) -> Vec<(Uuid, f64)> {
        if signature.len() < NUM_BANDS * ROWS_PER_BAND {
            return Vec::new();
        }

        let mut candidates: HashSet<Uuid> = HashSet::new();
        for band in 0..NUM_BANDS {
            let key = Self::band_hash(signature, band);
            if let Some(ids) = self.buckets[band].get(&key) {
                candidates.extend(ids.iter().copied());
            }
        }

        let mut results: Vec<(Uuid, f64)> = candidates
            .into_iter()
            .filter_map(|id| {
                let sim = jaccard_estimate(signature, &self.signatures[&id]);
                (sim >= threshold).then_some((id, sim))
            })
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.signatures.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::minhash::minhash128;

    fn sig(text: &str) -> Vec<u64> {
        minhash128(text).unwrap().to_vec()
    }

    const LONG_A: &str = "Global container shipping rates surged this week as port congestion \
                          worsened across major Asian hubs, with carriers warning of further \
                          increases ahead of peak season.";
    const LONG_A2: &str = "Global container shipping rates surged this week as port congestion \
                           worsened across major Asian hubs, with carriers warning of further \
                           increases before peak season.";
    const LONG_B: &str = "The autonomous trucking startup closed a large funding round and \
                          plans to expand its driverless freight network across the southwest \
                          next year.";

    #[test]
    fn identical_signature_found() {
        let mut index = LshIndex::new();
        let id = Uuid::new_v4();
        index.insert(id, sig(LONG_A));

        let hits = index.query(&sig(LONG_A), 0.85);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, id);
        assert_eq!(hits[0].1, 1.0);
    }

    #[test]
    fn near_duplicate_found() {
        let mut index = LshIndex::new();
        let id = Uuid::new_v4();
        index.insert(id, sig(LONG_A));

        let hits = index.query(&sig(LONG_A2), 0.85);
        assert_eq!(hits.len(), 1, "near-duplicate should band-collide and verify");
    }

    #[test]
    fn unrelated_not_found() {
        let mut index = LshIndex::new();
        index.insert(Uuid::new_v4(), sig(LONG_A));

        assert!(index.query(&sig(LONG_B), 0.85).is_empty());
    }

    #[test]
    fn threshold_filters_candidates() {
        let mut index = LshIndex::new();
        index.insert(Uuid::new_v4(), sig(LONG_A));

        // With threshold 1.0 the near-duplicate band-collides but fails
        // verification.
        assert!(index.query(&sig(LONG_A2), 1.0).is_empty());
    }

    #[test]
    fn empty_index() {
        let index = LshIndex::new();
        assert!(index.is_empty());
        assert!(index.query(&sig(LONG_A), 0.5).is_empty());
    }

    #[test]
    fn short_signature_ignored() {
        let mut index = LshIndex::new();
        index.insert(Uuid::new_v4(), vec![1, 2, 3]);
        assert!(index.is_empty());
    }

    #[test]
    fn results_sorted_by_similarity() {
        let mut index = LshIndex::new();
        let exact = Uuid::new_v4();
        let near = Uuid::new_v4();
        index.insert(near, sig(LONG_A2));
        index.insert(exact, sig(LONG_A));

        let hits = index.query(&sig(LONG_A), 0.5);
        assert!(hits.len() >= 2);
        assert_eq!(hits[0].0, exact, "exact match should sort first");
    }
}
