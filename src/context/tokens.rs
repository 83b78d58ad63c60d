//! Token counting using tiktoken-rs.
//!
//! Chunk budgets are measured with the cl100k_base encoding. Counts are
//! memoized by content hash because the chunker re-counts the same
//! paragraphs and sentences while packing.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

/// Maximum number of memoized counts before the cache is halved.
const TOKEN_CACHE_CAPACITY: usize = 10_000;

lazy_static! {
    static ref CL100K: Option<CoreBPE> = match cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            warn!(error = %e, "cl100k_base unavailable, falling back to length estimate");
            None
        }
    };
}

/// Global token cache to avoid recounting identical content
static TOKEN_CACHE: RwLock<Option<TokenCache>> = RwLock::new(None);

/// Something that can measure text in tokens.
pub trait TokenCounter {
    fn count(&self, text: &str) -> usize;
}

/// Counter backed by the cl100k_base BPE.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cl100kCounter;

impl TokenCounter for Cl100kCounter {
    fn count(&self, text: &str) -> usize {
        count_tokens(text)
    }
}

/// Cache for token counts, keyed by content hash
struct TokenCache {
    counts: HashMap<u64, usize>,
    max_size: usize,
}

impl TokenCache {
    fn new(max_size: usize) -> Self {
        Self {
            counts: HashMap::with_capacity(max_size),
            max_size,
        }
    }

    fn get(&self, hash: u64) -> Option<usize> {
        self.counts.get(&hash).copied()
    }

    fn insert(&mut self, hash: u64, count: usize) {
        // At capacity: drop half the entries rather than tracking recency
        if self.counts.len() >= self.max_size {
            let evicted: Vec<u64> = self.counts.keys().take(self.max_size / 2).copied().collect();
            for key in evicted {
                self.counts.remove(&key);
            }
        }
        self.counts.insert(hash, count);
    }
}

fn hash_content(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Count tokens in text using cl100k_base encoding.
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let content_hash = hash_content(text);
    if let Some(cache) = TOKEN_CACHE.read().as_ref() {
        if let Some(count) = cache.get(content_hash) {
            return count;
        }
    }

    let count = match CL100K.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => estimate_tokens_quick(text),
    };

    TOKEN_CACHE
        .write()
        .get_or_insert_with(|| TokenCache::new(TOKEN_CACHE_CAPACITY))
        .insert(content_hash, count);

    count
}

/// Rough estimate (~4 bytes per token) used when the BPE is unavailable.
pub fn estimate_tokens_quick(text: &str) -> usize {
    (text.len() as f64 / 4.0).ceil() as usize
}
