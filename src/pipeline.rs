//! Processing Pipeline
//!
//! Batch stages over the data directory:
//! raw documents → structured JSON → chunked JSON → vector store.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RagConfig;
use crate::context::TokenCounter;
use crate::documents::store::{artifact_path, ensure_dir, list_files, load_structured, save_json};
use crate::documents::{
    chunk_document, converter_for, structure_document, StoreError, StructureError,
    SOURCE_EXTENSIONS,
};
use crate::index::{build_index, BuildReport, IndexError};
use crate::llm::Embedder;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to structure {path}: {source}")]
    Structure {
        path: PathBuf,
        #[source]
        source: StructureError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// What to do when one file in a batch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPolicy {
    /// Stop the batch at the first failing file.
    #[default]
    Abort,
    /// Log the failure, record it and continue with the next file.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub written: Vec<String>,
    pub skipped: Vec<SkippedFile>,
    /// Source files whose artifact replaced one written earlier in the
    /// same stage (e.g. `leave.docx` and `leave.json`).
    pub overwritten: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessReport {
    pub structured: StageReport,
    pub chunked: StageReport,
    /// `None` when there was nothing to index.
    pub index: Option<BuildReport>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Run `step` for each file under `policy`, collecting written artifacts.
fn run_stage<F>(
    stage: &str,
    files: Vec<PathBuf>,
    policy: BatchPolicy,
    mut step: F,
) -> Result<StageReport, PipelineError>
where
    F: FnMut(&Path) -> Result<PathBuf, PipelineError>,
{
    let mut report = StageReport::default();
    let mut outputs = HashSet::new();
    for path in files {
        match step(&path) {
            Ok(output) => {
                info!(stage, file = %file_name(&path), output = %output.display(), "Processed");
                if outputs.insert(output.clone()) {
                    report.written.push(file_name(&output));
                } else {
                    warn!(
                        stage,
                        file = %file_name(&path),
                        output = %output.display(),
                        "Artifact overwrites one from an earlier file with the same stem"
                    );
                    report.overwritten.push(file_name(&path));
                }
            }
            Err(err) if policy == BatchPolicy::Skip => {
                warn!(stage, file = %file_name(&path), error = %err, "Skipping file");
                report.skipped.push(SkippedFile { file: file_name(&path), error: err.to_string() });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(report)
}

/// Structure every supported document in `raw_dir` into `processed_dir`.
pub fn structure_all(
    raw_dir: &Path,
    processed_dir: &Path,
    policy: BatchPolicy,
) -> Result<StageReport, PipelineError> {
    let files = list_files(raw_dir, SOURCE_EXTENSIONS)?;
    if files.is_empty() {
        warn!(dir = %raw_dir.display(), "No source documents found");
    }
    ensure_dir(processed_dir)?;

    run_stage("structure", files, policy, |path| {
        let structure_err = |source: StructureError| PipelineError::Structure {
            path: path.to_path_buf(),
            source,
        };
        let converter = converter_for(path).ok_or_else(|| {
            structure_err(StructureError::UnsupportedType(file_name(path)))
        })?;
        let raw = converter.convert(path).map_err(structure_err)?;

        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let doc = structure_document(&raw, &fallback);

        let output = artifact_path(processed_dir, path);
        save_json(&output, &doc)?;
        Ok(output)
    })
}

/// Chunk every structured document in `processed_dir` into `chunked_dir`.
pub fn chunk_all(
    processed_dir: &Path,
    chunked_dir: &Path,
    max_tokens: usize,
    counter: &dyn TokenCounter,
    policy: BatchPolicy,
) -> Result<StageReport, PipelineError> {
    let files = list_files(processed_dir, &["json"])?;
    ensure_dir(chunked_dir)?;

    run_stage("chunk", files, policy, |path| {
        let doc = load_structured(path)?;
        let chunked = chunk_document(&doc, max_tokens, counter);
        let output = chunked_dir.join(file_name(path));
        save_json(&output, &chunked)?;
        Ok(output)
    })
}

/// Structure, chunk and index everything under the configured data directory.
pub fn run_processing(
    config: &RagConfig,
    embedder: &dyn Embedder,
    counter: &dyn TokenCounter,
) -> Result<ProcessReport, PipelineError> {
    let paths = &config.paths;
    let policy = config.batch.on_error;

    let structured = structure_all(&paths.raw_dir(), &paths.processed_dir(), policy)?;
    let chunked = chunk_all(
        &paths.processed_dir(),
        &paths.chunked_dir(),
        config.chunking.max_tokens,
        counter,
        policy,
    )?;
    let index = build_index(embedder, &paths.chunked_dir(), &paths.vectors_dir())?;

    info!(
        structured = structured.written.len(),
        chunked = chunked.written.len(),
        skipped = structured.skipped.len() + chunked.skipped.len(),
        vectors = index.as_ref().map(|r| r.vectors).unwrap_or(0),
        "Processing complete"
    );

    Ok(ProcessReport { structured, chunked, index })
}
