//! Vector Index Module
//!
//! Exact nearest-neighbor search over chunk embeddings, the position →
//! chunk metadata mapping, and the index build step.

pub mod builder;
pub mod flat;
pub mod store;

use thiserror::Error;

use crate::documents::StoreError;
use crate::llm::LlmError;

pub use builder::{build_index, load_chunks, BuildReport};
pub use flat::FlatL2Index;
pub use store::{IndexedChunk, VectorStore, INDEX_FILE, METADATA_FILE};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Chunk store error: {0}")]
    Store(#[from] StoreError),
    #[error("Embedding failed: {0}")]
    Embedding(#[from] LlmError),
    #[error("Dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Invalid index file: {0}")]
    InvalidFormat(String),
    #[error("Index holds {vectors} vectors but metadata has {records} records")]
    Corrupted { vectors: usize, records: usize },
}

/// A search hit: position in the index and squared Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// k-nearest-neighbor search over fixed-dimension vectors.
pub trait NearestNeighbors {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    /// Up to `k` neighbors of `query`, nearest first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError>;
}
