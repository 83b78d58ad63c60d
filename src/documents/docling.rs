//! Docling JSON import
//!
//! Reads documents that were already converted by docling and exported with
//! `export_to_dict`. Entries with missing or ill-typed fields are skipped
//! instead of failing the whole file.

use serde_json::Value;
use std::fs;
use std::path::Path;

use super::structure::{
    DocumentConverter, RawCell, RawDocument, RawList, RawTable, RawText, StructureError,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct DoclingJsonConverter;

impl DocumentConverter for DoclingJsonConverter {
    fn convert(&self, path: &Path) -> Result<RawDocument, StructureError> {
        let content = fs::read_to_string(path)?;
        let doc: Value = serde_json::from_str(&content)?;
        if !doc.is_object() {
            return Err(StructureError::Malformed(format!(
                "{}: expected a JSON object",
                path.display()
            )));
        }
        Ok(parse_docling(&doc))
    }
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Parse a docling `export_to_dict` value.
pub fn parse_docling(doc: &Value) -> RawDocument {
    let name = str_field(doc, "name").unwrap_or_default().to_string();

    let texts = array(doc, "texts")
        .iter()
        .filter_map(|entry| {
            let text = str_field(entry, "text")?;
            Some(RawText {
                label: str_field(entry, "label").unwrap_or_default().to_string(),
                text: text.to_string(),
            })
        })
        .collect();

    let tables = array(doc, "tables")
        .iter()
        .filter_map(|entry| {
            let cells = entry.get("data")?.get("table_cells")?.as_array()?;
            let cells = cells
                .iter()
                .filter_map(|cell| {
                    Some(RawCell {
                        text: str_field(cell, "text")?.to_string(),
                        column_header: cell
                            .get("column_header")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                    })
                })
                .collect();
            Some(RawTable { cells })
        })
        .collect();

    let lists = array(doc, "lists")
        .iter()
        .filter_map(|entry| {
            let items = entry.get("items")?.as_array()?;
            Some(RawList {
                list_type: str_field(entry, "list_type").unwrap_or_default().to_string(),
                items: items
                    .iter()
                    .filter_map(|item| str_field(item, "text").map(str::to_string))
                    .collect(),
            })
        })
        .collect();

    RawDocument { name, texts, tables, lists }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::structure::{structure_document, ListType, SectionType};
    use serde_json::json;

    #[test]
    fn test_parse_docling_export() {
        let doc = json!({
            "name": "leave-policy",
            "texts": [
                { "label": "purpose", "text": "Defines leave." },
                { "label": "text" },
                { "label": "procedure_step", "text": "Submit the form." },
                "not an object"
            ],
            "tables": [
                { "data": { "table_cells": [
                    { "text": "Type", "column_header": true },
                    { "text": "Days", "column_header": true },
                    { "text": "Annual" },
                    { "text": "25" }
                ] } },
                { "data": {} }
            ],
            "lists": [
                { "list_type": "ordered", "items": [{ "text": "First" }, { "text": " " }] },
                { "list_type": "bullet" }
            ]
        });

        let raw = parse_docling(&doc);
        assert_eq!(raw.name, "leave-policy");
        assert_eq!(raw.texts.len(), 2);
        assert_eq!(raw.tables.len(), 1);
        assert_eq!(raw.lists.len(), 1);

        let structured = structure_document(&raw, "fallback");
        assert_eq!(structured.sections.len(), 2);
        assert_eq!(structured.sections[0].section_type, SectionType::PolicySection);
        assert_eq!(structured.sections[1].section_type, SectionType::ProcedureStep);
        assert_eq!(structured.tables[0].rows, vec![vec!["Annual", "25"]]);
        assert_eq!(structured.lists[0].list_type, ListType::Ordered);
        assert_eq!(structured.lists[0].items, vec!["First"]);
    }

    #[test]
    fn test_convert_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        let err = DoclingJsonConverter.convert(&path).unwrap_err();
        assert!(matches!(err, StructureError::Malformed(_)));
    }

    #[test]
    fn test_convert_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = DoclingJsonConverter.convert(&path).unwrap_err();
        assert!(matches!(err, StructureError::Json(_)));
    }
}
