//! Language Model Interfaces
//!
//! Traits for the two external model capabilities the pipeline needs, chat
//! completion and text embedding, plus their implementations.

pub mod hashing;
pub mod ollama;
pub mod retry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hashing::{HashingEmbedder, DEFAULT_HASHING_DIM};
pub use ollama::OllamaClient;
pub use retry::{with_retry, RetryPolicy};

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Model server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Transport failures, server errors and rate limiting are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            LlmError::InvalidResponse(_) => false,
        }
    }
}

impl Serialize for LlmError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => LlmError::Status { status: status.as_u16(), body: e.to_string() },
            None if e.is_decode() => LlmError::InvalidResponse(e.to_string()),
            None => LlmError::Transport(e.to_string()),
        }
    }
}

/// Embedding vector
pub type Embedding = Vec<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Chat-completion model.
pub trait ChatModel {
    /// Send the conversation and return the reply text.
    fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Text-embedding model. Every vector from one embedder has the same dimension.
pub trait Embedder {
    fn embed(&self, text: &str) -> Result<Embedding, LlmError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, LlmError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Transport("reset".into()).is_retryable());
        assert!(LlmError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 404, body: String::new() }.is_retryable());
        assert!(!LlmError::InvalidResponse("bad".into()).is_retryable());
    }

    #[test]
    fn test_chat_message_wire_shape() {
        let value = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(value, serde_json::json!({ "role": "user", "content": "hi" }));
    }

    #[test]
    fn test_default_embed_batch_uses_embed() {
        struct Lengths;
        impl Embedder for Lengths {
            fn embed(&self, text: &str) -> Result<Embedding, LlmError> {
                Ok(vec![text.len() as f32])
            }
        }

        let out = Lengths.embed_batch(&["a".to_string(), "abc".to_string()]).unwrap();
        assert_eq!(out, vec![vec![1.0], vec![3.0]]);
    }
}
