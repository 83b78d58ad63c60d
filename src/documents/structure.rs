//! Document Structuring
//!
//! Turns a converter's raw output (labelled text runs, table cells, list
//! groups) into titled sections, fixed-width tables and lists.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Title used when a section or chunk has nothing better.
pub const UNTITLED_SECTION: &str = "Untitled Section";

/// Labels that mark a policy section (compared lower-cased).
const POLICY_LABELS: &[&str] = &[
    "scope",
    "purpose",
    "applies to",
    "background",
    "statement of policy",
];

#[derive(Error, Debug)]
pub enum StructureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Converts one document file into its raw, unstructured form.
pub trait DocumentConverter {
    fn convert(&self, path: &Path) -> Result<RawDocument, StructureError>;
}

// ============ RAW (CONVERTER OUTPUT) ============

/// Converter output in the shape of a docling export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDocument {
    pub name: String,
    pub texts: Vec<RawText>,
    pub tables: Vec<RawTable>,
    pub lists: Vec<RawList>,
}

/// A labelled run of text (`title`, `section_header`, `list_item`, `text`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct RawText {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub cells: Vec<RawCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawCell {
    pub text: String,
    pub column_header: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawList {
    pub list_type: String,
    pub items: Vec<String>,
}

// ============ STRUCTURED ============

/// Section classification derived from a text label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    PolicySection,
    ProcedureStep,
    GeneralSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListType {
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub section_type: SectionType,
    pub title: String,
    pub content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct List {
    pub list_type: ListType,
    pub items: Vec<String>,
}

/// Structured form of one document, persisted under the processed directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub document_name: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub lists: Vec<List>,
}

/// Classify a text label into a section type.
pub fn classify_label(label: &str) -> SectionType {
    let label = label.trim().to_lowercase();
    if POLICY_LABELS.contains(&label.as_str()) {
        SectionType::PolicySection
    } else if label.contains("procedure") {
        SectionType::ProcedureStep
    } else {
        SectionType::GeneralSection
    }
}

/// Group labelled text runs into sections. A new section starts whenever the
/// classified type changes; its title is the label that started it.
pub fn group_sections(texts: &[RawText]) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();

    for entry in texts {
        let content = entry.text.trim();
        if content.is_empty() {
            continue;
        }
        let label = entry.label.trim();
        let section_type = classify_label(label);

        match sections.last_mut() {
            Some(current) if current.section_type == section_type => {
                current.content.push(content.to_string());
            }
            _ => {
                let title = if label.is_empty() { UNTITLED_SECTION } else { label };
                sections.push(Section {
                    section_type,
                    title: title.to_string(),
                    content: vec![content.to_string()],
                });
            }
        }
    }

    sections
}

/// Build a table from its cells. Body cells are cut into rows of header
/// width; an incomplete trailing row is dropped.
pub fn build_table(raw: &RawTable) -> Option<Table> {
    let mut headers = Vec::new();
    let mut body = Vec::new();
    for cell in &raw.cells {
        let text = cell.text.trim();
        if text.is_empty() {
            continue;
        }
        if cell.column_header {
            headers.push(text.to_string());
        } else {
            body.push(text.to_string());
        }
    }

    if headers.is_empty() || body.is_empty() {
        return None;
    }

    let rows = body
        .chunks_exact(headers.len())
        .map(|row| row.to_vec())
        .collect();

    Some(Table { headers, rows })
}

pub fn build_list(raw: &RawList) -> Option<List> {
    let items: Vec<String> = raw
        .items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    if items.is_empty() {
        return None;
    }

    let list_type = if raw.list_type == "ordered" {
        ListType::Ordered
    } else {
        ListType::Unordered
    };

    Some(List { list_type, items })
}

/// Structure a raw document. `fallback_name` is used when the converter
/// could not determine a document name.
pub fn structure_document(raw: &RawDocument, fallback_name: &str) -> StructuredDocument {
    let document_name = if raw.name.trim().is_empty() {
        fallback_name.to_string()
    } else {
        raw.name.trim().to_string()
    };

    StructuredDocument {
        document_name,
        sections: group_sections(&raw.texts),
        tables: raw.tables.iter().filter_map(build_table).collect(),
        lists: raw.lists.iter().filter_map(build_list).collect(),
    }
}
