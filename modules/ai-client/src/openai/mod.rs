mod client;
pub(crate) mod types;

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::traits::{ChatModel, EmbedModel, Message, MessageRole};
use client::OpenAiClient;
use types::{ChatMessage, ChatRequest};

// =============================================================================
// OpenAi-compatible provider
// =============================================================================

/// Client for any OpenAI-compatible endpoint (chat completions + embeddings).
pub struct OpenAi {
    api_key: String,
    model: String,
    embedding_model: String,
    embedding_dimensions: Option<usize>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: None,
            base_url: None,
            timeout: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = Some(dimensions);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key, self.timeout);
        match &self.base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAi {
    async fn chat(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .map(|m| ChatMessage {
                    role: match m.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                        MessageRole::Assistant => "assistant",
                    },
                    content: m.content,
                })
                .collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        self.client().chat(&request).await
    }
}

#[async_trait]
impl EmbedModel for OpenAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self
            .client()
            .embed(
                &self.embedding_model,
                serde_json::Value::String(text.to_string()),
                self.embedding_dimensions,
            )
            .await?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding in response"))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.client()
            .embed(
                &self.embedding_model,
                serde_json::Value::Array(
                    texts.into_iter().map(serde_json::Value::String).collect(),
                ),
                self.embedding_dimensions,
            )
            .await
    }
}
