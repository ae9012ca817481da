//! Persistence of per-document outputs.
//!
//! Each successfully parsed document becomes two files in the output folder:
//!
//! ```text
//! <stem>.tsv            tab-separated rows, schema + provenance columns,
//!                       optionally preceded by one header line
//! <stem>.manifest.json  source name, header mode, record count, columns
//! ```
//!
//! The manifest is what lets the merger skip exactly one header line for
//! artifacts that have one and none for artifacts that don't, without
//! guessing from file content.
//!
//! Both files are written to a temp file in the destination folder and then
//! renamed, so a crash never leaves a half-written artifact behind.

use crate::output::PersistedArtifact;
use crate::record::{DocumentOutput, FieldValue, Record};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

pub const ARTIFACT_EXTENSION: &str = "tsv";
pub const MANIFEST_SUFFIX: &str = ".manifest.json";

#[derive(Debug, Error)]
#[error("'{path}': {detail}")]
pub struct PersistFailure {
    pub path: PathBuf,
    pub detail: String,
}

impl PersistFailure {
    fn new(path: &Path, detail: impl ToString) -> Self {
        Self {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }
}

/// Sidecar describing one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub source: String,
    pub has_header: bool,
    pub record_count: usize,
    pub columns: Vec<String>,
}

/// Paths of the artifact and its manifest for a document stem.
pub fn artifact_paths(output_dir: &Path, stem: &str) -> (PathBuf, PathBuf) {
    (
        output_dir.join(format!("{stem}.{ARTIFACT_EXTENSION}")),
        output_dir.join(format!("{stem}{MANIFEST_SUFFIX}")),
    )
}

fn tsv_writer<W: Write>(w: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(w)
}

/// Reader for artifacts; `has_header` drops exactly the first line.
pub(crate) fn tsv_reader<R: std::io::Read>(r: R, has_header: bool) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_header)
        .flexible(true)
        .from_reader(r)
}

/// Write rows (and optionally the header) to `path` atomically.
pub(crate) fn write_tsv_atomic<'a>(
    path: &Path,
    header: Option<&[&str]>,
    rows: impl IntoIterator<Item = &'a [String]>,
) -> Result<usize, PersistFailure> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| PersistFailure::new(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PersistFailure::new(path, e))?;
    let mut count = 0usize;
    {
        let mut writer = tsv_writer(&mut tmp);
        if let Some(h) = header {
            writer
                .write_record(h)
                .map_err(|e| PersistFailure::new(path, e))?;
        }
        for row in rows {
            writer
                .write_record(row)
                .map_err(|e| PersistFailure::new(path, e))?;
            count += 1;
        }
        writer.flush().map_err(|e| PersistFailure::new(path, e))?;
    }
    tmp.persist(path)
        .map_err(|e| PersistFailure::new(path, e.error))?;
    Ok(count)
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistFailure> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PersistFailure::new(path, e))?;
    tmp.write_all(bytes)
        .map_err(|e| PersistFailure::new(path, e))?;
    tmp.persist(path)
        .map_err(|e| PersistFailure::new(path, e.error))?;
    Ok(())
}

/// Write one document's records and manifest into `output_dir`.
///
/// The output folder is created if absent.
pub fn persist_document(
    output: &DocumentOutput,
    output_dir: &Path,
    stem: &str,
    schema: &Schema,
    null_literal: &str,
    with_header: bool,
) -> Result<PersistedArtifact, PersistFailure> {
    let (path, manifest_path) = artifact_paths(output_dir, stem);
    let columns = schema.columns();
    let rows = output.rows(null_literal);

    let written = write_tsv_atomic(
        &path,
        with_header.then_some(columns.as_slice()),
        rows.iter().map(|r| r.as_slice()),
    )?;

    let manifest = ArtifactManifest {
        source: output.source.clone(),
        has_header: with_header,
        record_count: written,
        columns: columns.iter().map(|c| c.to_string()).collect(),
    };
    let json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| PersistFailure::new(&manifest_path, e))?;
    write_bytes_atomic(&manifest_path, &json)?;

    debug!(
        "Persisted {} records from {} to {}",
        written,
        output.source,
        path.display()
    );

    Ok(PersistedArtifact {
        path,
        manifest_path,
        source: output.source.clone(),
        has_header: with_header,
        record_count: written,
    })
}

/// Load the artifact description from a manifest file.
pub fn read_manifest(manifest_path: &Path) -> Result<PersistedArtifact, PersistFailure> {
    let bytes = std::fs::read(manifest_path).map_err(|e| PersistFailure::new(manifest_path, e))?;
    let manifest: ArtifactManifest =
        serde_json::from_slice(&bytes).map_err(|e| PersistFailure::new(manifest_path, e))?;

    let file_name = manifest_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.strip_suffix(MANIFEST_SUFFIX).unwrap_or(&file_name);
    let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let (path, _) = artifact_paths(dir, stem);

    Ok(PersistedArtifact {
        path,
        manifest_path: manifest_path.to_path_buf(),
        source: manifest.source,
        has_header: manifest.has_header,
        record_count: manifest.record_count,
    })
}

/// All artifacts described by manifests in `output_dir`, ordered by source name.
pub fn discover_artifacts(output_dir: &Path) -> Result<Vec<PersistedArtifact>, PersistFailure> {
    let entries = std::fs::read_dir(output_dir).map_err(|e| PersistFailure::new(output_dir, e))?;

    let mut artifacts = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX))
        })
        .map(|p| read_manifest(&p))
        .collect::<Result<Vec<_>, _>>()?;

    artifacts.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(artifacts)
}

/// Read an artifact back into typed records.
///
/// The provenance column is checked against the manifest source.
pub fn read_artifact(
    artifact: &PersistedArtifact,
    schema: &'static Schema,
    null_literal: &str,
) -> Result<DocumentOutput, PersistFailure> {
    let file = std::fs::File::open(&artifact.path).map_err(|e| PersistFailure::new(&artifact.path, e))?;
    let mut reader = tsv_reader(file, artifact.has_header);
    let width = schema.len() + 1;

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row.map_err(|e| PersistFailure::new(&artifact.path, e))?;
        if row.len() != width {
            return Err(PersistFailure::new(
                &artifact.path,
                format!("row {} has {} columns, expected {}", i + 1, row.len(), width),
            ));
        }
        if &row[schema.len()] != artifact.source.as_str() {
            return Err(PersistFailure::new(
                &artifact.path,
                format!(
                    "row {} has provenance '{}', expected '{}'",
                    i + 1,
                    &row[schema.len()],
                    artifact.source
                ),
            ));
        }
        let values = schema
            .fields()
            .iter()
            .zip(row.iter())
            .map(|(field, cell)| FieldValue::from_cell(cell, field, null_literal))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PersistFailure::new(&artifact.path, e))?;
        let record = Record::from_values(schema, values)
            .map_err(|e| PersistFailure::new(&artifact.path, e))?;
        records.push(record);
    }

    Ok(DocumentOutput::new(artifact.source.clone(), records))
}
