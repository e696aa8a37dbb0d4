//! Article fingerprinting: canonical URLs, title SimHash, content MinHash,
//! and the in-process LSH band index used by the deduplication cascade.

pub mod lsh;
pub mod minhash;
pub mod simhash;
pub mod url;

pub use lsh::LshIndex;
pub use minhash::{jaccard_estimate, minhash128, MINHASH_PERMS};
pub use simhash::{hamming_distance, simhash64};
pub use url::canonicalize_url;
