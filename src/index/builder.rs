//! Index build: chunk files → embeddings → flat index + metadata.

use std::path::Path;
use tracing::{debug, info, warn};

use super::flat::FlatL2Index;
use super::store::{IndexedChunk, VectorStore};
use super::{IndexError, NearestNeighbors};
use crate::documents::store::{list_files, load_chunked};
use crate::llm::Embedder;

/// Texts per embedding request.
const EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BuildReport {
    pub vectors: usize,
    pub dimension: usize,
}

/// Read every chunk file in `dir` (sorted by name) into index records.
/// Chunks with blank text are left out.
pub fn load_chunks(dir: &Path) -> Result<Vec<IndexedChunk>, IndexError> {
    let mut records = Vec::new();
    for path in list_files(dir, &["json"])? {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let doc = load_chunked(&path)?;
        let before = records.len();
        records.extend(
            doc.chunks
                .into_iter()
                .filter(|c| !c.text.trim().is_empty())
                .map(|c| IndexedChunk { title: c.title, filename: filename.clone(), text: c.text }),
        );
        debug!(file = %filename, chunks = records.len() - before, "Loaded chunk file");
    }
    Ok(records)
}

/// Embed `records` and pair the vectors with them. Returns `None` without
/// calling the embedder when there is nothing to index.
pub fn build_store(
    embedder: &dyn Embedder,
    records: Vec<IndexedChunk>,
) -> Result<Option<VectorStore>, IndexError> {
    if records.is_empty() {
        warn!("No text chunks found, skipping index build");
        return Ok(None);
    }

    let mut index: Option<FlatL2Index> = None;
    for batch in records.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != texts.len() {
            return Err(IndexError::Corrupted { vectors: vectors.len(), records: texts.len() });
        }
        for vector in vectors {
            let index = index.get_or_insert_with(|| FlatL2Index::new(vector.len()));
            index.add(&vector)?;
        }
        debug!(embedded = batch.len(), "Embedded batch");
    }

    match index {
        Some(index) => VectorStore::new(index, records).map(Some),
        None => Ok(None),
    }
}

/// Rebuild the vector store in `vector_dir` from the chunk files in `chunk_dir`.
pub fn build_index(
    embedder: &dyn Embedder,
    chunk_dir: &Path,
    vector_dir: &Path,
) -> Result<Option<BuildReport>, IndexError> {
    let records = load_chunks(chunk_dir)?;
    info!(chunks = records.len(), dir = %chunk_dir.display(), "Building vector index");

    let Some(store) = build_store(embedder, records)? else {
        return Ok(None);
    };
    store.save(vector_dir)?;

    Ok(Some(BuildReport {
        vectors: store.len(),
        dimension: store.index().dimension(),
    }))
}
