//! DOCX extraction
//!
//! Reads the WordprocessingML body of a `.docx` archive and produces the raw
//! labelled text runs, table cells and list groups that structuring expects.
//! Paragraph labels follow docling's vocabulary: `title`, `section_header`,
//! `list_item` and `text`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use super::structure::{
    DocumentConverter, RawCell, RawDocument, RawList, RawTable, RawText, StructureError,
};

const DOCUMENT_PART: &str = "word/document.xml";
const NUMBERING_PART: &str = "word/numbering.xml";

#[derive(Debug, Clone, Copy, Default)]
pub struct DocxConverter;

impl DocumentConverter for DocxConverter {
    fn convert(&self, path: &Path) -> Result<RawDocument, StructureError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)?;

        let document_xml = read_part(&mut archive, DOCUMENT_PART)?.ok_or_else(|| {
            StructureError::Malformed(format!("{}: missing {}", path.display(), DOCUMENT_PART))
        })?;
        let numbering = match read_part(&mut archive, NUMBERING_PART)? {
            Some(xml) => Numbering::parse(&xml)?,
            None => Numbering::default(),
        };

        let mut raw = parse_document_xml(&document_xml, &numbering)?;
        raw.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        debug!(
            path = %path.display(),
            texts = raw.texts.len(),
            tables = raw.tables.len(),
            lists = raw.lists.len(),
            "Parsed docx"
        );
        Ok(raw)
    }
}

fn read_part(
    archive: &mut zip::ZipArchive<File>,
    name: &str,
) -> Result<Option<String>, StructureError> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

fn xml_error(e: impl std::fmt::Display) -> StructureError {
    StructureError::Malformed(e.to_string())
}

/// Value of the `w:val` (or any `*:val`) attribute.
fn val_attr(element: &BytesStart) -> Result<Option<String>, StructureError> {
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.local_name().as_ref() == b"val" {
            return Ok(Some(attr.unescape_value().map_err(xml_error)?.into_owned()));
        }
    }
    Ok(None)
}

fn named_attr(element: &BytesStart, name: &[u8]) -> Result<Option<String>, StructureError> {
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value().map_err(xml_error)?.into_owned()));
        }
    }
    Ok(None)
}

// ============ NUMBERING ============

/// Numbering definitions: which `(numId, ilvl)` pairs are bullets.
#[derive(Debug, Default)]
pub struct Numbering {
    /// numId -> abstractNumId
    instances: HashMap<String, String>,
    /// (abstractNumId, ilvl) -> numFmt
    formats: HashMap<(String, String), String>,
}

impl Numbering {
    pub fn parse(xml: &str) -> Result<Self, StructureError> {
        let mut numbering = Numbering::default();
        let mut reader = Reader::from_str(xml);

        let mut abstract_id: Option<String> = None;
        let mut level: Option<String> = None;
        let mut num_id: Option<String> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"abstractNum" => abstract_id = named_attr(&e, b"abstractNumId")?,
                    b"lvl" => level = named_attr(&e, b"ilvl")?,
                    b"numFmt" => {
                        if let (Some(a), Some(l), Some(fmt)) =
                            (abstract_id.clone(), level.clone(), val_attr(&e)?)
                        {
                            numbering.formats.insert((a, l), fmt);
                        }
                    }
                    b"num" => num_id = named_attr(&e, b"numId")?,
                    b"abstractNumId" => {
                        if let (Some(n), Some(a)) = (num_id.clone(), val_attr(&e)?) {
                            numbering.instances.insert(n, a);
                        }
                    }
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"abstractNum" => abstract_id = None,
                    b"lvl" => level = None,
                    b"num" => num_id = None,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(numbering)
    }

    /// `Some(true)` for bullets, `Some(false)` for numbered levels.
    fn is_bullet(&self, num_id: &str, ilvl: &str) -> Option<bool> {
        let abstract_id = self.instances.get(num_id)?;
        let format = self.formats.get(&(abstract_id.clone(), ilvl.to_string()))?;
        Some(format == "bullet")
    }
}

// ============ DOCUMENT BODY ============

#[derive(Default)]
struct ParagraphState {
    text: String,
    style: Option<String>,
    num_id: Option<String>,
    ilvl: Option<String>,
}

#[derive(Default)]
struct TableState {
    cells: Vec<RawCell>,
    row_index: usize,
    row_is_header: bool,
    cell_text: String,
}

struct BodyParser<'a> {
    numbering: &'a Numbering,
    paragraph: Option<ParagraphState>,
    in_run: bool,
    in_text_run: bool,
    tables: Vec<TableState>,
    /// List being filled and the numId it was started under.
    open_list: Option<(Option<String>, RawList)>,
    doc: RawDocument,
}

impl<'a> BodyParser<'a> {
    fn new(numbering: &'a Numbering) -> Self {
        Self {
            numbering,
            paragraph: None,
            in_run: false,
            in_text_run: false,
            tables: Vec::new(),
            open_list: None,
            doc: RawDocument::default(),
        }
    }

    fn on_element(&mut self, e: &BytesStart, is_empty: bool) -> Result<(), StructureError> {
        match e.local_name().as_ref() {
            b"p" if !is_empty => self.paragraph = Some(ParagraphState::default()),
            b"pStyle" => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.style = val_attr(e)?;
                }
            }
            b"numId" => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.num_id = val_attr(e)?;
                }
            }
            b"ilvl" => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.ilvl = val_attr(e)?;
                }
            }
            b"r" if !is_empty => self.in_run = true,
            b"t" if !is_empty => self.in_text_run = true,
            // Tab stops in paragraph properties share the element name
            b"tab" if self.in_run => self.push_text("\t"),
            b"br" | b"cr" if self.in_run => self.push_text("\n"),
            b"tbl" if !is_empty => {
                self.close_list();
                self.tables.push(TableState::default());
            }
            b"tr" if !is_empty => {
                if let Some(table) = self.tables.last_mut() {
                    table.row_is_header = false;
                }
            }
            b"tblHeader" => {
                let on = !matches!(val_attr(e)?.as_deref(), Some("0") | Some("false"));
                if let Some(table) = self.tables.last_mut() {
                    table.row_is_header = on;
                }
            }
            b"tc" if !is_empty => {
                if let Some(table) = self.tables.last_mut() {
                    table.cell_text.clear();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_end(&mut self, local_name: &[u8]) {
        match local_name {
            b"r" => self.in_run = false,
            b"t" => self.in_text_run = false,
            b"p" => {
                if let Some(paragraph) = self.paragraph.take() {
                    self.finish_paragraph(paragraph);
                }
            }
            b"tc" => {
                if let Some(table) = self.tables.last_mut() {
                    let column_header = table.row_index == 0 || table.row_is_header;
                    let text = std::mem::take(&mut table.cell_text);
                    table.cells.push(RawCell { text, column_header });
                }
            }
            b"tr" => {
                if let Some(table) = self.tables.last_mut() {
                    table.row_index += 1;
                }
            }
            b"tbl" => {
                if let Some(table) = self.tables.pop() {
                    self.doc.tables.push(RawTable { cells: table.cells });
                }
            }
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(p) = self.paragraph.as_mut() {
            p.text.push_str(text);
        }
    }

    fn finish_paragraph(&mut self, paragraph: ParagraphState) {
        let text = paragraph.text.trim();

        if let Some(table) = self.tables.last_mut() {
            if !text.is_empty() {
                if !table.cell_text.is_empty() {
                    table.cell_text.push('\n');
                }
                table.cell_text.push_str(text);
            }
            return;
        }

        if text.is_empty() {
            return;
        }

        let label = paragraph_label(&paragraph);
        if label == "list_item" {
            let list_type = self.list_type(&paragraph);
            let continues = self.open_list.as_ref().is_some_and(|(num_id, list)| {
                *num_id == paragraph.num_id && list.list_type == list_type
            });
            if !continues {
                self.close_list();
            }
            let (_, list) = self.open_list.get_or_insert_with(|| {
                (
                    paragraph.num_id.clone(),
                    RawList { list_type: list_type.to_string(), items: Vec::new() },
                )
            });
            list.items.push(text.to_string());
        } else {
            self.close_list();
        }

        self.doc.texts.push(RawText {
            label: label.to_string(),
            text: text.to_string(),
        });
    }

    fn list_type(&self, paragraph: &ParagraphState) -> &'static str {
        let bullet = match (&paragraph.num_id, &paragraph.ilvl) {
            (Some(num_id), ilvl) => self
                .numbering
                .is_bullet(num_id, ilvl.as_deref().unwrap_or("0")),
            _ => None,
        };
        match bullet {
            Some(true) => "unordered",
            Some(false) => "ordered",
            None => {
                let numbered_style = paragraph
                    .style
                    .as_deref()
                    .map(|s| s.to_lowercase().contains("number"))
                    .unwrap_or(false);
                if numbered_style {
                    "ordered"
                } else {
                    "unordered"
                }
            }
        }
    }

    fn close_list(&mut self) {
        if let Some((_, list)) = self.open_list.take() {
            self.doc.lists.push(list);
        }
    }

    fn finish(mut self) -> RawDocument {
        self.close_list();
        self.doc
    }
}

/// docling-style label for a paragraph.
fn paragraph_label(paragraph: &ParagraphState) -> &'static str {
    let style = paragraph
        .style
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();

    if paragraph.num_id.as_deref().is_some_and(|id| id != "0") || style.starts_with("list") {
        "list_item"
    } else if style == "title" {
        "title"
    } else if style.starts_with("heading") || style == "subtitle" {
        "section_header"
    } else {
        "text"
    }
}

/// Parse `word/document.xml` into a raw document (name left empty).
pub fn parse_document_xml(xml: &str, numbering: &Numbering) -> Result<RawDocument, StructureError> {
    let mut reader = Reader::from_str(xml);
    let mut parser = BodyParser::new(numbering);

    loop {
        match reader.read_event()? {
            Event::Start(e) => parser.on_element(&e, false)?,
            Event::Empty(e) => parser.on_element(&e, true)?,
            Event::Text(t) => {
                if parser.in_text_run {
                    let text = t.unescape().map_err(xml_error)?;
                    parser.push_text(&text);
                }
            }
            Event::End(e) => parser.on_end(e.local_name().as_ref()),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(parser.finish())
}
