use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Message Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// ChatModel Trait
// =============================================================================

/// A chat-completions provider. The pipeline depends on this seam so tests
/// can substitute a scripted model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a message list and return the assistant message content.
    async fn chat(&self, messages: Vec<Message>) -> Result<String>;
}

// =============================================================================
// EmbedModel Trait
// =============================================================================

#[async_trait]
pub trait EmbedModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}
