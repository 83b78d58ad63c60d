//! Local Embeddings using Feature Hashing
//!
//! Offline embedder for running the pipeline without a model server.
//! Uses the hashing trick to produce fixed-size vectors without maintaining
//! a vocabulary map. The same text always produces the same vector.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{Embedder, Embedding, LlmError};

pub const DEFAULT_HASHING_DIM: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIM)
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dim
    }
}

impl Embedder for HashingEmbedder {
    /// Term-frequency vector over hashed lower-cased tokens, L2-normalized.
    /// Text without alphanumeric tokens maps to the zero vector.
    fn embed(&self, text: &str) -> Result<Embedding, LlmError> {
        let mut tf = vec![0.0f32; self.dim];

        let tokens = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| !t.is_empty());
        for token in tokens {
            tf[self.bucket(&token.to_lowercase())] += 1.0;
        }

        let norm: f32 = tf.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut tf {
                *x /= norm;
            }
        }

        Ok(tf)
    }
}
