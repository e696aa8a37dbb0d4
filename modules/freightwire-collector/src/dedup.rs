//! Three-level deduplication cascade: exact canonical URL, title SimHash,
//! content MinHash via the in-process LSH index.
//!
//! A duplicate is a normal outcome, not an error; the scheduler counts it in
//! the fetch log and drops the article.

use std::sync::{Arc, RwLock};

use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::fingerprint::{hamming_distance, LshIndex};

use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub enum DedupOutcome {
    Unique,
    Duplicate {
        existing_id: Uuid,
        reason: DuplicateReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateReason {
    UrlExact,
    TitleSimhash { distance: u32 },
    ContentMinhash { similarity: f64 },
}

impl std::fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateReason::UrlExact => write!(f, "url_exact"),
            DuplicateReason::TitleSimhash { distance } => {
                write!(f, "title_simhash (hamming={distance})")
            }
            DuplicateReason::ContentMinhash { similarity } => {
                write!(f, "content_minhash (jaccard={similarity:.3})")
            }
        }
    }
}

pub struct Deduplicator {
    store: Store,
    lsh: Arc<RwLock<LshIndex>>,
    simhash_threshold: u32,
    jaccard_threshold: f64,
}

impl Deduplicator {
    pub fn new(store: Store, simhash_threshold: u32, jaccard_threshold: f64) -> Self {
        Self {
            store,
            lsh: Arc::new(RwLock::new(LshIndex::new())),
            simhash_threshold,
            jaccard_threshold,
        }
    }

    /// Rebuild the transient LSH index from persisted signatures. Called once
    /// on startup before the scheduler runs.
    pub async fn warm_lsh(&self) -> Result<usize> {
        let signatures = self.store.content_minhashes().await?;
        let mut index = self.lsh.write().expect("lsh lock poisoned");
        for (id, signature) in signatures {
            index.insert(id, signature.into_iter().map(|v| v as u64).collect());
        }
        Ok(index.len())
    }

    /// Run the cascade. Queries stop at the first hit.
    pub async fn check(
        &self,
        canonical_url: &str,
        title_simhash: Option<u64>,
        content_minhash: Option<&[u64]>,
    ) -> Result<DedupOutcome> {
        // Level 1: exact canonical URL.
        if let Some(existing_id) = self.store.url_exists(canonical_url).await? {
            return Ok(DedupOutcome::Duplicate {
                existing_id,
                reason: DuplicateReason::UrlExact,
            });
        }

        // Level 2: title SimHash within the Hamming threshold.
        if let Some(candidate_hash) = title_simhash {
            let persisted = self.store.title_simhashes().await?;
            if let Some((existing_id, distance)) =
                nearest_simhash(candidate_hash, &persisted, self.simhash_threshold)
            {
                return Ok(DedupOutcome::Duplicate {
                    existing_id,
                    reason: DuplicateReason::TitleSimhash { distance },
                });
            }
        }

        // Level 3: content MinHash via the LSH band index.
        if let Some(signature) = content_minhash {
            let hits = {
                let index = self.lsh.read().expect("lsh lock poisoned");
                index.query(signature, self.jaccard_threshold)
            };
            if let Some((existing_id, similarity)) = hits.into_iter().next() {
                return Ok(DedupOutcome::Duplicate {
                    existing_id,
                    reason: DuplicateReason::ContentMinhash { similarity },
                });
            }
        }

        Ok(DedupOutcome::Unique)
    }

    /// Register a newly persisted article's signature so later fetches in
    /// this process see it without a restart.
    pub fn index_signature(&self, id: Uuid, signature: &[u64]) {
        let mut index = self.lsh.write().expect("lsh lock poisoned");
        index.insert(id, signature.to_vec());
    }

    pub fn lsh_len(&self) -> usize {
        self.lsh.read().expect("lsh lock poisoned").len()
    }
}

/// Closest persisted SimHash within the threshold, if any. Linear scan;
/// acceptable into the low millions of rows.
fn nearest_simhash(
    candidate: u64,
    persisted: &[(Uuid, i64)],
    threshold: u32,
) -> Option<(Uuid, u32)> {
    let mut best: Option<(Uuid, u32)> = None;
    for (id, stored) in persisted {
        let distance = hamming_distance(candidate, *stored as u64);
        if distance <= threshold && best.map_or(true, |(_, d)| distance < d) {
            best = Some((*id, distance));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightwire_common::fingerprint::simhash64;

    fn id(n: u8) -> Uuid {
        Uuid::from_bytes([n; 16])
    }

    #[test]
    fn nearest_simhash_exact_match() {
        let h = simhash64("Global shipping rates surge amid port congestion").unwrap();
        let persisted = vec![(id(1), h as i64)];
        assert_eq!(nearest_simhash(h, &persisted, 3), Some((id(1), 0)));
    }

    #[test]
    fn nearest_simhash_respects_threshold() {
        let h = 0b1111u64;
        let persisted = vec![(id(1), 0i64)]; // distance 4
        assert_eq!(nearest_simhash(h, &persisted, 3), None);
        assert_eq!(nearest_simhash(h, &persisted, 4), Some((id(1), 4)));
    }

    #[test]
    fn nearest_simhash_prefers_closest() {
        let h = 0b1100u64;
        let persisted = vec![
            (id(1), 0b0000i64), // distance 2
            (id(2), 0b1101i64), // distance 1
        ];
        assert_eq!(nearest_simhash(h, &persisted, 3), Some((id(2), 1)));
    }

    #[test]
    fn nearest_simhash_empty() {
        assert_eq!(nearest_simhash(42, &[], 3), None);
    }

    #[test]
    fn duplicate_reason_display() {
        assert_eq!(DuplicateReason::UrlExact.to_string(), "url_exact");
        assert_eq!(
            DuplicateReason::TitleSimhash { distance: 2 }.to_string(),
            "title_simhash (hamming=2)"
        );
        assert_eq!(
            DuplicateReason::ContentMinhash { similarity: 0.9 }.to_string(),
            "content_minhash (jaccard=0.900)"
        );
    }
}
