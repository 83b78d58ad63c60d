//! Document Processing Module
//!
//! Handles structuring, chunking and artifact storage for source documents.

pub mod chunker;
pub mod docling;
pub mod docx;
pub mod store;
pub mod structure;

use std::path::Path;

pub use chunker::{
    chunk_document, chunk_title, extract_section_title, semantic_chunking, Chunk,
    ChunkedDocument, DEFAULT_MAX_TOKENS, LIST_ITEM_TITLE,
};
pub use docling::DoclingJsonConverter;
pub use docx::DocxConverter;
pub use store::StoreError;
pub use structure::{
    classify_label, structure_document, DocumentConverter, List, ListType, RawDocument,
    Section, SectionType, StructureError, StructuredDocument, Table, UNTITLED_SECTION,
};

/// Extensions the structuring stage accepts.
pub const SOURCE_EXTENSIONS: &[&str] = &["docx", "json"];

/// Converter for a source file, chosen by extension.
pub fn converter_for(path: &Path) -> Option<Box<dyn DocumentConverter>> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "docx" => Some(Box::new(DocxConverter)),
        "json" => Some(Box::new(DoclingJsonConverter)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_for() {
        assert!(converter_for(Path::new("a/Policy.DOCX")).is_some());
        assert!(converter_for(Path::new("export.json")).is_some());
        assert!(converter_for(Path::new("notes.txt")).is_none());
        assert!(converter_for(Path::new("README")).is_none());
    }
}
