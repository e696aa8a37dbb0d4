//! Routes completed articles to live push subscribers and the webhook queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use freightwire_common::Article;

use crate::store::Store;

use super::push::{PushFrame, PushRegistry};
use super::webhook::WebhookJob;

pub struct Dispatcher {
    store: Store,
    registry: Arc<PushRegistry>,
    webhook_tx: mpsc::Sender<WebhookJob>,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        registry: Arc<PushRegistry>,
        webhook_tx: mpsc::Sender<WebhookJob>,
    ) -> Self {
        Self {
            store,
            registry,
            webhook_tx,
        }
    }

    pub fn registry(&self) -> &Arc<PushRegistry> {
        &self.registry
    }

    /// Fan a completed article out. Push writes are non-blocking; webhook
    /// deliveries are enqueued one per matching realtime subscription.
    pub async fn publish(&self, article: &Article) {
        let payload = match serde_json::to_string(&PushFrame::NewArticle { data: article }) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(article_id = %article.id, error = %e, "failed to serialize push frame");
                return;
            }
        };

        let delivered = self.registry.broadcast(article, &payload);
        debug!(article_id = %article.id, delivered, "pushed to live connections");

        let subscriptions = match self.store.realtime_webhook_subscriptions().await {
            Ok(subs) => subs,
            Err(e) => {
                warn!(error = %e, "failed to load webhook subscriptions");
                return;
            }
        };

        let body = match serde_json::to_string(article) {
            Ok(body) => body,
            Err(e) => {
                warn!(article_id = %article.id, error = %e, "failed to serialize article");
                return;
            }
        };

        for subscription in subscriptions {
            if !subscription.filter().matches(article) {
                continue;
            }
            let job = WebhookJob {
                subscription_id: subscription.id,
                article_id: article.id,
                config: match subscription.webhook_config() {
                    Some(config) => config,
                    None => {
                        warn!(
                            subscription_id = %subscription.id,
                            "webhook subscription has malformed channel_config, skipping"
                        );
                        continue;
                    }
                },
                body: body.clone(),
            };
            if self.webhook_tx.send(job).await.is_err() {
                warn!("webhook queue closed, dropping remaining deliveries");
                return;
            }
        }
    }
}
