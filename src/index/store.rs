//! Vector Store
//!
//! Pairs the flat index with the metadata record for each indexed position.
//! Both files live in one directory and are always written and read together.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use super::flat::FlatL2Index;
use super::{IndexError, NearestNeighbors};

pub const INDEX_FILE: &str = "index.bin";
pub const METADATA_FILE: &str = "metadata.json";

/// Metadata for the vector at the same position in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub title: String,
    /// Chunk file the text came from.
    pub filename: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct VectorStore {
    index: FlatL2Index,
    records: Vec<IndexedChunk>,
}

impl VectorStore {
    /// Fails with `Corrupted` unless there is exactly one record per vector.
    pub fn new(index: FlatL2Index, records: Vec<IndexedChunk>) -> Result<Self, IndexError> {
        if index.len() != records.len() {
            return Err(IndexError::Corrupted { vectors: index.len(), records: records.len() });
        }
        Ok(Self { index, records })
    }

    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    pub fn records(&self) -> &[IndexedChunk] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir)?;
        self.index.save(&dir.join(INDEX_FILE))?;
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(dir.join(METADATA_FILE), json)?;
        info!(dir = %dir.display(), vectors = self.len(), "Vector store saved");
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let index = FlatL2Index::load(&dir.join(INDEX_FILE))?;
        let records: Vec<IndexedChunk> =
            serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILE))?)?;
        let store = Self::new(index, records)?;
        info!(
            dir = %dir.display(),
            vectors = store.len(),
            dimension = store.index.dimension(),
            "Vector store loaded"
        );
        Ok(store)
    }
}
