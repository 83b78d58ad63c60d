//! Configuration
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! `DOCRAG_*` environment variables, then command-line overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::context::DEFAULT_HISTORY_TURNS;
use crate::documents::DEFAULT_MAX_TOKENS;
use crate::llm::ollama::DEFAULT_OLLAMA_URL;
use crate::llm::{RetryPolicy, DEFAULT_HASHING_DIM};
use crate::pipeline::BatchPolicy;
use crate::retrieval::expander::DEFAULT_EXPANSIONS;

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "docrag.toml";

pub const ENV_OLLAMA_URL: &str = "DOCRAG_OLLAMA_URL";
pub const ENV_CHAT_MODEL: &str = "DOCRAG_CHAT_MODEL";
pub const ENV_EMBED_MODEL: &str = "DOCRAG_EMBED_MODEL";
pub const ENV_DATA_DIR: &str = "DOCRAG_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub raw: PathBuf,
    pub processed: PathBuf,
    pub chunked: PathBuf,
    pub vectors: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            raw: PathBuf::from("raw"),
            processed: PathBuf::from("processed"),
            chunked: PathBuf::from("chunked"),
            vectors: PathBuf::from("vectors"),
        }
    }
}

impl PathsConfig {
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join(&self.raw)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join(&self.processed)
    }

    pub fn chunked_dir(&self) -> PathBuf {
        self.data_dir.join(&self.chunked)
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join(&self.vectors)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: DEFAULT_MAX_TOKENS }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub expansions: usize,
    pub history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            expansions: DEFAULT_EXPANSIONS,
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub chat_model: String,
    pub embed_model: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            chat_model: "llama3".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Ollama,
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub hashing_dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            hashing_dim: DEFAULT_HASHING_DIM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay_ms,
            max_delay_ms: policy.max_delay_ms,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_delay_ms, self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub on_error: BatchPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub ollama: OllamaConfig,
    pub embedding: EmbeddingConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
}

/// Values given on the command line. `None` leaves the setting alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub max_tokens: Option<usize>,
    pub top_k: Option<usize>,
    pub skip_errors: bool,
}

impl RagConfig {
    /// Parse a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the file layer: `explicit` if given (it must exist), else
    /// `./docrag.toml`, else the user config directory, else defaults.
    pub fn load_file_layer(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG_FILE))
            .chain(dirs::config_dir().map(|dir| dir.join("docrag").join("config.toml")));
        for candidate in candidates {
            if candidate.is_file() {
                debug!(path = %candidate.display(), "Loading config file");
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Apply `DOCRAG_*` variables as returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(ENV_OLLAMA_URL) {
            self.ollama.base_url = url;
        }
        if let Some(model) = lookup(ENV_CHAT_MODEL) {
            self.ollama.chat_model = model;
        }
        if let Some(model) = lookup(ENV_EMBED_MODEL) {
            self.ollama.embed_model = model;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.paths.data_dir = PathBuf::from(dir);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(max_tokens) = overrides.max_tokens {
            self.chunking.max_tokens = max_tokens;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        if overrides.skip_errors {
            self.batch.on_error = BatchPolicy::Skip;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("chunking.max_tokens", self.chunking.max_tokens),
            ("retrieval.top_k", self.retrieval.top_k),
            ("retrieval.expansions", self.retrieval.expansions),
            ("retrieval.history_turns", self.retrieval.history_turns),
            ("embedding.hashing_dim", self.embedding.hashing_dim),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
        }
        if self.ollama.timeout_secs == 0 {
            return Err(ConfigError::Invalid("ollama.timeout_secs must be greater than zero".to_string()));
        }
        if self.ollama.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("ollama.base_url is empty".to_string()));
        }
        Ok(())
    }

    /// All layers, validated.
    pub fn load(explicit: Option<&Path>, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::load_file_layer(explicit)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }
}
