//! Multi-Query Retrieval
//!
//! Searches the index once per query expansion and merges the hits. The
//! user's query itself is only used to generate the expansions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use super::expander::expand_query;
use super::RagError;
use crate::index::{IndexedChunk, NearestNeighbors};
use crate::llm::{ChatModel, Embedder};

/// A retrieved chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub title: String,
    pub content: String,
}

/// Expansions used for a query and the deduplicated hits they produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieval {
    pub expansions: Vec<String>,
    pub results: Vec<RetrievalResult>,
}

/// Keep the first occurrence of each distinct content string, in order.
pub fn dedup_by_content(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.content.clone()))
        .collect()
}

pub struct Retriever<'a> {
    pub chat: &'a dyn ChatModel,
    pub embedder: &'a dyn Embedder,
    pub index: &'a dyn NearestNeighbors,
    /// Metadata for each index position.
    pub records: &'a [IndexedChunk],
}

impl<'a> Retriever<'a> {
    /// Expand `query` into `expansions` variants and search each for `top_k` hits.
    pub fn retrieve(&self, query: &str, top_k: usize, expansions: usize) -> Result<Retrieval, RagError> {
        let expansions = expand_query(self.chat, query, expansions).map_err(RagError::RetrievalUnavailable)?;
        let results = self.search(&expansions, top_k)?;
        info!(hits = results.len(), "Retrieved chunks");
        Ok(Retrieval { expansions, results })
    }

    /// k-NN search per expansion. Positions with no metadata record are skipped.
    pub fn search(&self, expansions: &[String], top_k: usize) -> Result<Vec<RetrievalResult>, RagError> {
        if expansions.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .embedder
            .embed_batch(expansions)
            .map_err(RagError::RetrievalUnavailable)?;

        let mut hits = Vec::new();
        for (expansion, vector) in expansions.iter().zip(&vectors) {
            for neighbor in self.index.search(vector, top_k)? {
                match self.records.get(neighbor.position) {
                    Some(record) => hits.push(RetrievalResult {
                        title: record.title.clone(),
                        content: record.text.clone(),
                    }),
                    None => debug!(
                        position = neighbor.position,
                        records = self.records.len(),
                        expansion = %expansion,
                        "Skipping neighbor without metadata"
                    ),
                }
            }
        }

        Ok(dedup_by_content(hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexError, Neighbor};
    use crate::llm::{Embedding, LlmError};
    use crate::retrieval::test_support::ScriptedChat;

    /// Embeds a text as its length.
    struct LengthEmbedder;

    impl Embedder for LengthEmbedder {
        fn embed(&self, text: &str) -> Result<Embedding, LlmError> {
            Ok(vec![text.len() as f32])
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Embedding, LlmError> {
            Err(LlmError::Transport("connection refused".into()))
        }
    }

    /// Returns fixed positions for every query, keyed by the query's first component.
    struct FixedNeighbors {
        positions: fn(f32) -> Vec<usize>,
    }

    impl NearestNeighbors for FixedNeighbors {
        fn len(&self) -> usize {
            usize::MAX
        }

        fn dimension(&self) -> usize {
            1
        }

        fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
            Ok((self.positions)(query[0])
                .into_iter()
                .take(k)
                .map(|position| Neighbor { position, distance: 0.0 })
                .collect())
        }
    }

    fn records(n: usize) -> Vec<IndexedChunk> {
        (0..n)
            .map(|i| IndexedChunk {
                title: format!("T{}", i),
                filename: "doc.json".to_string(),
                text: format!("chunk {}", i),
            })
            .collect()
    }

    #[test]
    fn test_out_of_range_neighbor_skipped() {
        let chat = ScriptedChat::new(&[]);
        let records = records(10);
        let index = FixedNeighbors { positions: |_| vec![15, 2] };
        let retriever = Retriever { chat: &chat, embedder: &LengthEmbedder, index: &index, records: &records };

        let results = retriever.search(&["q".to_string()], 3).unwrap();
        assert_eq!(results, vec![RetrievalResult { title: "T2".into(), content: "chunk 2".into() }]);
    }

    #[test]
    fn test_five_expansions_deduplicated() {
        let chat = ScriptedChat::new(&["1. a\n2. bb\n3. ccc\n4. dddd\n5. eeeee"]);
        let records = records(10);
        // Overlapping windows: expansion of length n hits n, n+1, n+2
        let index = FixedNeighbors { positions: |x| vec![x as usize, x as usize + 1, x as usize + 2] };
        let retriever = Retriever { chat: &chat, embedder: &LengthEmbedder, index: &index, records: &records };

        let retrieval = retriever.retrieve("leave", 3, 5).unwrap();
        assert_eq!(retrieval.expansions.len(), 5);
        let contents: Vec<&str> = retrieval.results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["chunk 1", "chunk 2", "chunk 3", "chunk 4", "chunk 5", "chunk 6", "chunk 7"]
        );
        assert!(retrieval.results.len() <= 15);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let results = vec![
            RetrievalResult { title: "first".into(), content: "same".into() },
            RetrievalResult { title: "other".into(), content: "different".into() },
            RetrievalResult { title: "second".into(), content: "same".into() },
        ];
        let deduped = dedup_by_content(results);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "first");
        assert_eq!(deduped[1].content, "different");
    }

    #[test]
    fn test_no_expansions_no_search() {
        let chat = ScriptedChat::new(&["   "]);
        let records = records(3);
        let index = FixedNeighbors { positions: |_| vec![0] };
        let retriever = Retriever { chat: &chat, embedder: &FailingEmbedder, index: &index, records: &records };

        let retrieval = retriever.retrieve("q", 3, 5).unwrap();
        assert!(retrieval.expansions.is_empty());
        assert!(retrieval.results.is_empty());
    }

    #[test]
    fn test_embedding_failure_is_retrieval_unavailable() {
        let chat = ScriptedChat::new(&["1. a"]);
        let records = records(3);
        let index = FixedNeighbors { positions: |_| vec![0] };
        let retriever = Retriever { chat: &chat, embedder: &FailingEmbedder, index: &index, records: &records };

        let err = retriever.retrieve("q", 3, 5).unwrap_err();
        assert!(matches!(err, RagError::RetrievalUnavailable(_)));
    }

    #[test]
    fn test_expansion_failure_is_retrieval_unavailable() {
        let chat = ScriptedChat::failing();
        let records = records(3);
        let index = FixedNeighbors { positions: |_| vec![0] };
        let retriever = Retriever { chat: &chat, embedder: &LengthEmbedder, index: &index, records: &records };

        assert!(matches!(retriever.retrieve("q", 3, 5), Err(RagError::RetrievalUnavailable(_))));
    }
}
