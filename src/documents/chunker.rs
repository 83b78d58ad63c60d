//! Semantic Chunking
//!
//! Splits section text into token-bounded chunks. Paragraphs are packed
//! whole while they fit; a paragraph that is over budget on its own is
//! broken into sentences, which are packed the same way.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::structure::{List, StructuredDocument, Table, UNTITLED_SECTION};
use crate::context::tokens::TokenCounter;

/// Default chunk budget in tokens.
pub const DEFAULT_MAX_TOKENS: usize = 512;

/// Section title marking list items; such chunks derive their own title.
pub const LIST_ITEM_TITLE: &str = "list_item";

lazy_static! {
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n\s*\n").expect("valid regex");
    static ref LEADING_TITLE: Regex = Regex::new(r"^(.*?) – ").expect("valid regex");
}

/// A chunk of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub title: String,
    pub text: String,
}

/// Chunked form of one document. Tables and lists pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedDocument {
    pub document_name: String,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub lists: Vec<List>,
}

/// Pending units of the chunk being built.
struct Accumulator<'a> {
    units: Vec<&'a str>,
    tokens: usize,
}

impl<'a> Accumulator<'a> {
    fn new() -> Self {
        Self { units: Vec::new(), tokens: 0 }
    }

    /// Flush first if `unit` would push the running count over budget, then
    /// append it regardless of its own size.
    fn push(&mut self, unit: &'a str, unit_tokens: usize, max_tokens: usize, chunks: &mut Vec<String>) {
        if self.tokens + unit_tokens > max_tokens {
            self.flush(chunks);
        }
        self.units.push(unit);
        self.tokens += unit_tokens;
    }

    fn flush(&mut self, chunks: &mut Vec<String>) {
        if self.units.is_empty() {
            return;
        }
        chunks.push(self.units.join(" "));
        self.units.clear();
        self.tokens = 0;
    }
}

/// Split text into trimmed, non-empty paragraphs on blank lines.
pub fn split_into_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split a paragraph into sentences on `". "`. The separator is consumed and
/// blank sentences are dropped.
pub fn split_into_sentences(paragraph: &str) -> Vec<&str> {
    paragraph.split(". ").filter(|s| !s.trim().is_empty()).collect()
}

/// Chunk `text` so that every chunk stays within `max_tokens`, except a
/// single sentence that alone exceeds the budget.
pub fn semantic_chunking(text: &str, max_tokens: usize, counter: &dyn TokenCounter) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut acc = Accumulator::new();

    for paragraph in split_into_paragraphs(text) {
        let paragraph_tokens = counter.count(paragraph);

        if paragraph_tokens <= max_tokens {
            acc.push(paragraph, paragraph_tokens, max_tokens, &mut chunks);
            continue;
        }

        for sentence in split_into_sentences(paragraph) {
            let sentence_tokens = counter.count(sentence);
            if sentence_tokens > max_tokens {
                warn!(
                    tokens = sentence_tokens,
                    max_tokens,
                    "Sentence exceeds chunk budget, emitting oversized chunk"
                );
            }
            acc.push(sentence, sentence_tokens, max_tokens, &mut chunks);
        }
    }

    acc.flush(&mut chunks);
    chunks
}

/// Title from a leading `"TITLE – "` marker in the chunk text.
pub fn extract_section_title(text: &str) -> String {
    LEADING_TITLE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| UNTITLED_SECTION.to_string())
}

/// Title for a chunk cut from a section titled `section_title`.
pub fn chunk_title(section_title: &str, chunk: &str) -> String {
    if section_title == LIST_ITEM_TITLE {
        extract_section_title(chunk)
    } else {
        section_title.to_string()
    }
}

/// Chunk every section of a structured document.
pub fn chunk_document(
    doc: &StructuredDocument,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> ChunkedDocument {
    let chunks = doc
        .sections
        .iter()
        .flat_map(|section| {
            let content = section.content.join(" ");
            semantic_chunking(&content, max_tokens, counter)
                .into_iter()
                .map(|text| Chunk {
                    title: chunk_title(&section.title, &text),
                    text,
                })
                .collect::<Vec<_>>()
        })
        .collect();

    ChunkedDocument {
        document_name: doc.document_name.clone(),
        chunks,
        tables: doc.tables.clone(),
        lists: doc.lists.clone(),
    }
}
