// docrag Library
// Exports core modules for use by the CLI binary

pub mod config;
pub mod context;
pub mod documents;
pub mod index;
pub mod llm;
pub mod pipeline;
pub mod retrieval;

// Re-export commonly used types for CLI
pub use config::{CliOverrides, ConfigError, EmbeddingBackend, RagConfig};
pub use context::{count_tokens, ChatHistory, Cl100kCounter, TokenCounter};
pub use index::{IndexError, VectorStore};
pub use llm::{ChatModel, Embedder, HashingEmbedder, LlmError, OllamaClient};
pub use pipeline::{run_processing, BatchPolicy, PipelineError, ProcessReport};
pub use retrieval::{Answer, RagError, RagSession, NO_INFORMATION_MESSAGE};
