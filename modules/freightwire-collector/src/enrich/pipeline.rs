//! Enrichment worker pool.
//!
//! Workers pull article ids from a shared queue, claim each with a status
//! compare-and-set, run the LLM extraction and embedding, write the article
//! update, and hand the completed article to the dispatcher. A failure marks
//! the article failed and the worker moves on; nothing here is fatal to the
//! pool.

use std::sync::Arc;
use std::time::Duration;

use ai_client::traits::Message;
use ai_client::{ChatModel, EmbedModel};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::FreightwireError;

use crate::dispatch::Dispatcher;
use crate::store::{EnrichmentUpdate, Store};

use super::parse::{parse_llm_json, validate_extraction};
use super::prompts::{build_user_prompt, PROMPT_VERSION, SYSTEM_PROMPT};

/// Deadline for one LLM chat call.
const LLM_TIMEOUT: Duration = Duration::from_secs(90);

/// Deadline for one embedding call.
const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Backoff before the single retry on a transient LLM failure.
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

pub struct EnrichmentPipeline {
    store: Store,
    chat: Arc<dyn ChatModel>,
    embed: Arc<dyn EmbedModel>,
    dispatcher: Arc<Dispatcher>,
    embedding_dimensions: usize,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Store,
        chat: Arc<dyn ChatModel>,
        embed: Arc<dyn EmbedModel>,
        dispatcher: Arc<Dispatcher>,
        embedding_dimensions: usize,
    ) -> Self {
        Self {
            store,
            chat,
            embed,
            dispatcher,
            embedding_dimensions,
        }
    }

    /// Spawn `workers` tasks draining the id queue until shutdown.
    pub fn spawn_workers(
        self: Arc<Self>,
        rx: mpsc::Receiver<Uuid>,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let rx = Arc::new(Mutex::new(rx));

        (0..workers)
            .map(|worker| {
                let pipeline = Arc::clone(&self);
                let rx = Arc::clone(&rx);
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    info!(worker, prompt_version = PROMPT_VERSION, "enrichment worker started");
                    loop {
                        let next = {
                            let mut guard = rx.lock().await;
                            tokio::select! {
                                id = guard.recv() => id,
                                _ = shutdown.changed() => None,
                            }
                        };
                        let Some(id) = next else {
                            info!(worker, "enrichment worker stopping");
                            return;
                        };

                        if let Err(e) = pipeline.process_one(id).await {
                            warn!(article_id = %id, error = %e, "enrichment failed");
                        }
                    }
                })
            })
            .collect()
    }

    /// Enrich a single article end to end.
    pub async fn process_one(&self, id: Uuid) -> Result<()> {
        // CAS pending → processing; skip quietly if another worker owns it.
        if !self.store.claim_for_processing(id).await? {
            return Ok(());
        }

        let (title, body_text) = match self.store.article_content(id).await? {
            Some(content) => content,
            None => return Ok(()),
        };

        let Some(body_text) = body_text.filter(|b| !b.is_empty()) else {
            self.store
                .mark_enrichment_failed(id, "no body_text available")
                .await?;
            return Ok(());
        };

        let enrichment = match self.extract_and_embed(&title, &body_text).await {
            Ok(update) => update,
            Err(e) => {
                self.store.mark_enrichment_failed(id, &e.to_string()).await?;
                return Err(e);
            }
        };

        self.store.complete_enrichment(id, &enrichment).await?;

        info!(
            article_id = %id,
            topic = enrichment.primary_topic.as_deref().unwrap_or("-"),
            sentiment = ?enrichment.sentiment,
            "article enriched"
        );

        // Publish to live subscribers and webhook queue.
        if let Some(article) = self.store.get_article(id).await? {
            self.dispatcher.publish(&article).await;
        }

        Ok(())
    }

    async fn extract_and_embed(&self, title: &str, body_text: &str) -> Result<EnrichmentUpdate> {
        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(build_user_prompt(title, body_text)),
        ];

        let raw = self.chat_with_retry(messages).await?;
        let parsed = parse_llm_json(&raw)?;
        let extraction = validate_extraction(&parsed)?;

        // Embed on title + English summary; the summary is the densest
        // representation of the article we have.
        let embed_input = format!("{title}\n{}", extraction.summary_en);
        let embedding = tokio::time::timeout(EMBED_TIMEOUT, self.embed.embed(&embed_input))
            .await
            .map_err(|_| FreightwireError::Network("embedding call timed out".to_string()))?
            .map_err(|e| FreightwireError::Network(format!("embedding call failed: {e}")))?;

        if embedding.len() != self.embedding_dimensions {
            return Err(FreightwireError::Validation(format!(
                "embedding dimension mismatch: got {}, expected {}",
                embedding.len(),
                self.embedding_dimensions
            )));
        }

        Ok(EnrichmentUpdate {
            summary_en: extraction.summary_en,
            summary_zh: extraction.summary_zh,
            transport_modes: extraction.transport_modes,
            primary_topic: extraction.primary_topic,
            secondary_topics: extraction.secondary_topics,
            content_type: extraction.content_type,
            regions: extraction.regions,
            entities: extraction.entities,
            sentiment: extraction.sentiment,
            market_impact: extraction.market_impact,
            urgency: extraction.urgency,
            key_metrics: extraction.key_metrics,
            embedding,
        })
    }

    /// One LLM call with a deadline, retried once on transient failures
    /// after a short backoff.
    async fn chat_with_retry(&self, messages: Vec<Message>) -> Result<String> {
        match self.chat_once(messages.clone()).await {
            Ok(raw) => Ok(raw),
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "transient LLM failure, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.chat_once(messages).await
            }
            Err(e) => Err(e),
        }
    }

    async fn chat_once(&self, messages: Vec<Message>) -> Result<String> {
        tokio::time::timeout(LLM_TIMEOUT, self.chat.chat(messages))
            .await
            .map_err(|_| FreightwireError::Network("LLM call timed out".to_string()))?
            .map_err(|e| FreightwireError::Network(format!("LLM call failed: {e}")))
    }
}

/// Network-level and throttling failures are worth one retry; validation
/// failures are not.
fn is_transient(e: &FreightwireError) -> bool {
    match e {
        FreightwireError::Network(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("timed out")
                || msg.contains("timeout")
                || msg.contains("connect")
                || msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("504")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_detection() {
        assert!(is_transient(&FreightwireError::Network(
            "LLM call failed: HTTP 429 Too Many Requests".to_string()
        )));
        assert!(is_transient(&FreightwireError::Network(
            "LLM call timed out".to_string()
        )));
        assert!(is_transient(&FreightwireError::Network(
            "LLM API error (503): overloaded".to_string()
        )));
        assert!(!is_transient(&FreightwireError::Network(
            "LLM API error (401): bad key".to_string()
        )));
        assert!(!is_transient(&FreightwireError::Validation(
            "missing field".to_string()
        )));
    }
}
