//! Ollama HTTP Client
//!
//! Blocking client for a local Ollama server. Serves both the chat model
//! (`/api/chat`) and the embedding model (`/api/embed`).

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

use super::retry::{with_retry, RetryPolicy};
use super::{ChatMessage, ChatModel, Embedder, Embedding, LlmError};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

/// Ollama HTTP client
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    chat_model: String,
    embed_model: String,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(base_url: &str, chat_model: &str, embed_model: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model: chat_model.to_string(),
            embed_model: embed_model.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, LlmError> {
        let url = format!("{}{}", self.base_url, path);
        with_retry(&self.retry, path, || {
            debug!(url = %url, "POST");
            let resp = self.http.post(&url).json(body).send()?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().unwrap_or_default();
                error!(url = %url, status = %status, "Ollama request failed");
                return Err(LlmError::Status { status: status.as_u16(), body: text });
            }

            let text = resp.text()?;
            serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse(e.to_string()))
        })
    }
}

/// Request body for `/api/chat` with streaming disabled.
pub fn chat_request_body(model: &str, messages: &[ChatMessage]) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "stream": false,
    })
}

pub fn embed_request_body(model: &str, input: &[String]) -> Value {
    json!({
        "model": model,
        "input": input,
    })
}

impl ChatModel for OllamaClient {
    fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = chat_request_body(&self.chat_model, messages);
        let resp: ChatResponse = self.post_json("/api/chat", &body)?;
        Ok(resp.message.content)
    }
}

impl Embedder for OllamaClient {
    fn embed(&self, text: &str) -> Result<Embedding, LlmError> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| LlmError::InvalidResponse("empty embeddings array".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = embed_request_body(&self.embed_model, texts);
        let resp: EmbedResponse = self.post_json("/api/embed", &body)?;
        check_embeddings(resp.embeddings, texts.len())
    }
}

/// One vector per input, all of the same non-zero dimension.
fn check_embeddings(embeddings: Vec<Embedding>, expected: usize) -> Result<Vec<Embedding>, LlmError> {
    if embeddings.len() != expected {
        return Err(LlmError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            embeddings.len()
        )));
    }
    let dim = embeddings.first().map(Vec::len).unwrap_or(0);
    if dim == 0 || embeddings.iter().any(|e| e.len() != dim) {
        return Err(LlmError::InvalidResponse("inconsistent embedding dimensions".to_string()));
    }
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_body() {
        let body = chat_request_body("llama3", &[ChatMessage::user("Hello")]);
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_parse_chat_response() {
        let raw = r#"{"model":"llama3","message":{"role":"assistant","content":"Hi there"},"done":true}"#;
        let resp: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.message.content, "Hi there");
    }

    #[test]
    fn test_parse_embed_response() {
        let raw = r#"{"model":"nomic-embed-text","embeddings":[[0.1,0.2],[0.3,0.4]]}"#;
        let resp: EmbedResponse = serde_json::from_str(raw).unwrap();
        let checked = check_embeddings(resp.embeddings, 2).unwrap();
        assert_eq!(checked[1], vec![0.3, 0.4]);
    }

    #[test]
    fn test_check_embeddings_rejects_mismatch() {
        assert!(check_embeddings(vec![vec![1.0]], 2).is_err());
        assert!(check_embeddings(vec![vec![1.0], vec![1.0, 2.0]], 2).is_err());
        assert!(check_embeddings(vec![vec![]], 1).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3", "nomic", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_empty_batch_makes_no_request() {
        let client = OllamaClient::new("http://127.0.0.1:9", "llama3", "nomic", Duration::from_secs(1))
            .with_retry(RetryPolicy::none());
        assert!(client.embed_batch(&[]).unwrap().is_empty());
    }
}
