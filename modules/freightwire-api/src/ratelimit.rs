//! In-memory sliding-window rate limiter, keyed by API key or client IP.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    requests_per_minute: usize,
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: usize) -> Self {
        Self {
            requests_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `client_id`; false when the window is full.
    pub fn check(&self, client_id: &str) -> bool {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&self, client_id: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().expect("rate limiter poisoned");
        let timestamps = windows.entry(client_id.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < WINDOW);

        if timestamps.len() >= self.requests_per_minute {
            return false;
        }
        timestamps.push(now);
        true
    }
}

/// Identity for limiting: the API key when present, the client IP otherwise.
pub fn client_id(api_key: Option<&str>, forwarded_for: Option<&str>, peer_ip: &str) -> String {
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        let prefix: String = key.chars().take(16).collect();
        return format!("key:{prefix}");
    }
    if let Some(forwarded) = forwarded_for {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return format!("ip:{first}");
            }
        }
    }
    format!("ip:{peer_ip}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("a"));
        assert!(limiter.check("b"));
        assert!(!limiter.check("a"));
    }

    #[test]
    fn window_expires() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.check_at("a", start));
        assert!(!limiter.check_at("a", start + Duration::from_secs(30)));
        assert!(limiter.check_at("a", start + Duration::from_secs(61)));
    }

    #[test]
    fn key_identity_preferred_over_ip() {
        assert_eq!(client_id(Some("abcd"), None, "1.2.3.4"), "key:abcd");
        assert_eq!(
            client_id(None, Some("9.8.7.6, 5.4.3.2"), "1.2.3.4"),
            "ip:9.8.7.6"
        );
        assert_eq!(client_id(None, None, "1.2.3.4"), "ip:1.2.3.4");
    }
}
