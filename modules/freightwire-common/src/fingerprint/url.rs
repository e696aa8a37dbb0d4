//! URL canonicalization. The canonical form is the article's external
//! identity and the unique key in the store.

use url::Url;

/// Query parameters that only carry click tracking.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "igshid",
    "ref",
    "spm",
];

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name)
}

/// Canonicalize a URL: lowercase scheme and host, strip default ports,
/// fragments and tracking parameters, sort the remaining query parameters,
/// and trim the trailing slash on non-empty paths. Idempotent; returns the
/// input unchanged when it does not parse as an absolute URL.
pub fn canonicalize_url(raw: &str) -> String {
    let mut url = match Url::parse(raw.trim()) {
        Ok(u) => u,
        Err(_) => return raw.trim().to_string(),
    };

    // Url already lowercases scheme and host and drops default ports on
    // serialization; fragments and queries are ours to handle.
    url.set_fragment(None);

    // Trim the trailing slash on non-root paths ("/a/" → "/a", "/" stays).
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if params.is_empty() {
        url.set_query(None);
    } else {
        params.sort();
        let query = params
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    url.to_string()
}
