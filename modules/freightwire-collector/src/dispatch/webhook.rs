//! Webhook delivery workers: HMAC signing, bounded retry, per-attempt logs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use freightwire_common::WebhookConfig;

use crate::store::Store;

type HmacSha256 = Hmac<Sha256>;

/// Per-delivery HTTP timeout.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Total attempts per delivery.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff before attempts 2 and 3.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_secs(2), Duration::from_secs(4)];

#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub subscription_id: Uuid,
    pub article_id: Uuid,
    pub config: WebhookConfig,
    pub body: String,
}

/// Hex-encoded HMAC-SHA256 of the payload under the subscription secret.
pub fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub struct WebhookSender {
    store: Store,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(store: Store) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .expect("Failed to build webhook HTTP client");
        Self { store, client }
    }

    /// Spawn `workers` delivery tasks over the job queue.
    pub fn spawn_workers(
        self: Arc<Self>,
        rx: mpsc::Receiver<WebhookJob>,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let rx = Arc::new(Mutex::new(rx));

        (0..workers)
            .map(|worker| {
                let sender = Arc::clone(&self);
                let rx = Arc::clone(&rx);
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    info!(worker, "webhook worker started");
                    loop {
                        let next = {
                            let mut guard = rx.lock().await;
                            tokio::select! {
                                job = guard.recv() => job,
                                _ = shutdown.changed() => None,
                            }
                        };
                        let Some(job) = next else {
                            info!(worker, "webhook worker stopping");
                            return;
                        };
                        sender.deliver(job).await;
                    }
                })
            })
            .collect()
    }

    /// Deliver one job: sign, POST, retry with backoff, log every attempt.
    /// At-least-once with idempotency left to the receiver; after the final
    /// failure the job is dropped.
    pub async fn deliver(&self, job: WebhookJob) -> bool {
        let signature = sign_payload(job.body.as_bytes(), &job.config.secret);

        for attempt in 1..=MAX_ATTEMPTS {
            let start = Instant::now();
            let result = self
                .client
                .post(&job.config.url)
                .header("Content-Type", "application/json")
                .header("X-Webhook-Event", "article.new")
                .header("X-Webhook-Signature", &signature)
                .body(job.body.clone())
                .send()
                .await;

            let latency_ms = start.elapsed().as_millis() as i32;
            let (status_code, success, error) = match &result {
                Ok(resp) => {
                    let status = resp.status();
                    (Some(status.as_u16() as i32), status.is_success(), None)
                }
                Err(e) => (None, false, Some(e.to_string())),
            };

            self.store
                .insert_webhook_log(
                    job.subscription_id,
                    job.article_id,
                    &job.config.url,
                    status_code,
                    success,
                    attempt as i32,
                    Some(latency_ms),
                    error.as_deref(),
                )
                .await;

            if success {
                info!(
                    subscription_id = %job.subscription_id,
                    article_id = %job.article_id,
                    attempt,
                    "webhook delivered"
                );
                return true;
            }

            // A 4xx means the receiver rejected the payload; more attempts
            // won't change its mind.
            if let Some(code) = status_code {
                if (400..500).contains(&code) {
                    warn!(
                        subscription_id = %job.subscription_id,
                        code,
                        "webhook rejected by receiver, not retrying"
                    );
                    return false;
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(RETRY_DELAYS[(attempt - 1) as usize]).await;
            }
        }

        warn!(
            subscription_id = %job.subscription_id,
            article_id = %job.article_id,
            attempts = MAX_ATTEMPTS,
            "webhook delivery failed"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hex_hmac_sha256() {
        // Known vector: HMAC-SHA256("secret", "payload")
        let sig = sign_payload(b"payload", "secret");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sig, sign_payload(b"payload", "secret"));
    }

    #[test]
    fn signature_varies_with_secret_and_body() {
        assert_ne!(sign_payload(b"payload", "a"), sign_payload(b"payload", "b"));
        assert_ne!(sign_payload(b"x", "secret"), sign_payload(b"y", "secret"));
    }

    #[test]
    fn known_test_vector() {
        // printf 'hello' | openssl dgst -sha256 -hmac 'key'
        assert_eq!(
            sign_payload(b"hello", "key"),
            "9307b3b915efb5171ff14d8cb55fbcc798c6c0ef1456d66ded1a6aa723a58b7b"
        );
    }
}
