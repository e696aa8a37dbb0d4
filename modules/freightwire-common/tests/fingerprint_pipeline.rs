//! End-to-end fingerprinting flows: normalize → canonicalize → hash → index.

use freightwire_common::fingerprint::{
    canonicalize_url, hamming_distance, jaccard_estimate, minhash128, simhash64, LshIndex,
};
use freightwire_common::text::{clean_text, clean_title};
use uuid::Uuid;

#[test]
fn tracking_params_collapse_to_one_identity() {
    let shared = canonicalize_url("https://theloadstar.com/a");
    assert_eq!(
        canonicalize_url("https://theloadstar.com/a?utm_source=twitter"),
        shared
    );
    assert_eq!(
        canonicalize_url("https://theloadstar.com/a?utm_campaign=x&fbclid=123"),
        shared
    );
    assert_eq!(
        canonicalize_url("HTTPS://THELOADSTAR.COM/a#top"),
        shared
    );
}

#[test]
fn canonicalization_is_idempotent_over_messy_inputs() {
    let inputs = [
        "https://example.com/News/Story/?b=2&a=1&utm_medium=rss#frag",
        "http://Example.com:80/path/",
        "https://example.com/?gclid=xyz",
    ];
    for input in inputs {
        let once = canonicalize_url(input);
        assert_eq!(canonicalize_url(&once), once, "not idempotent for {input}");
    }
}

#[test]
fn normalized_title_variants_share_a_simhash() {
    // Cross-source republications differ in case, punctuation, and feed
    // suffixes; after normalization they fingerprint identically.
    let a = clean_title("Global shipping rates surge amid port congestion", None).unwrap();
    let b = clean_title(
        "Global Shipping Rates Surge amid Port Congestion! | FreightWaves",
        Some("FreightWaves"),
    )
    .unwrap();

    let ha = simhash64(&a).unwrap();
    let hb = simhash64(&b).unwrap();
    assert!(
        hamming_distance(ha, hb) <= 3,
        "normalized variants should be near-duplicates, got distance {}",
        hamming_distance(ha, hb)
    );
}

#[test]
fn token_reordering_is_distance_zero() {
    let a = simhash64("Port congestion drives global shipping rates surge").unwrap();
    let b = simhash64("Global shipping rates surge drives port congestion").unwrap();
    assert_eq!(hamming_distance(a, b), 0);
}

#[test]
fn unrelated_titles_stay_apart() {
    let a = simhash64("Global shipping rates surge amid port congestion").unwrap();
    let b = simhash64("New warehouse automation startup raises funding").unwrap();
    assert!(hamming_distance(a, b) > 3);
}

#[test]
fn cleaned_body_minhash_survives_html_noise() {
    let original = "Spot rates on the transpacific rose 12% this week as congestion \
                    worsened at major gateways, carriers said on Monday.";
    let html = "<p>Spot rates on the transpacific rose 12% this week as congestion \
                worsened at major   gateways, carriers said on Monday.</p>";

    let a = minhash128(original).unwrap();
    let b = minhash128(&clean_text(html).unwrap()).unwrap();
    assert!(jaccard_estimate(&a, &b) >= 0.85);
}

#[test]
fn lsh_round_trip_through_persisted_form() {
    // Signatures persist as i64 and come back as u64 at warmup; the index
    // must behave identically across that round trip.
    let body = "Global container shipping rates surged this week as port congestion \
                worsened across major Asian hubs, with carriers warning of further \
                increases ahead of peak season.";
    let signature = minhash128(body).unwrap();

    let persisted: Vec<i64> = signature.iter().map(|&v| v as i64).collect();
    let restored: Vec<u64> = persisted.into_iter().map(|v| v as u64).collect();

    let mut index = LshIndex::new();
    let id = Uuid::new_v4();
    index.insert(id, restored);

    let hits = index.query(&signature, 0.85);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0], (id, 1.0));
}

#[test]
fn minhash_estimator_is_symmetric() {
    let a = minhash128("Ocean freight rates climbed sharply on Asia-Europe lanes.").unwrap();
    let b = minhash128("Air cargo demand softened in the second quarter of the year.").unwrap();
    assert_eq!(jaccard_estimate(&a, &b), jaccard_estimate(&b, &a));
}
