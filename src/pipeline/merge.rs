//! Merger: per-document artifacts → one consolidated dataset.
//!
//! The dataset has exactly one header line followed by every artifact's data
//! rows, in the order the artifacts are given. Rows are copied verbatim; the
//! merger never re-types or rewrites cell text.
//!
//! Header handling follows each artifact's manifest: the first line is
//! dropped only when `has_header` is set, so a data row can never be
//! mistaken for a header. An artifact that is missing, unreadable, listed
//! twice, or holding rows of another document is recorded in the summary and
//! skipped.

use crate::error::Pdf2TsvError;
use crate::output::{MergeSummary, PersistedArtifact};
use crate::pipeline::persist::{tsv_reader, write_tsv_atomic};
use crate::schema::Schema;
use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Concatenate `artifacts` into `dest`.
///
/// Fails only when `dest` itself cannot be written.
pub fn merge_artifacts(
    artifacts: &[PersistedArtifact],
    dest: &Path,
    schema: &Schema,
) -> Result<MergeSummary, Pdf2TsvError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut missing = Vec::new();
    let mut merged = 0usize;
    let mut seen = HashSet::new();

    for artifact in artifacts {
        if !seen.insert(artifact.path.as_path()) {
            warn!("Skipping {}: listed more than once", artifact.path.display());
            missing.push(artifact.path.clone());
            continue;
        }
        match read_rows(artifact, schema) {
            Ok(doc_rows) => {
                if doc_rows.len() != artifact.record_count {
                    warn!(
                        "{}: manifest says {} records, file has {}",
                        artifact.path.display(),
                        artifact.record_count,
                        doc_rows.len()
                    );
                }
                rows.extend(doc_rows);
                merged += 1;
            }
            Err(detail) => {
                warn!("Skipping {}: {}", artifact.path.display(), detail);
                missing.push(artifact.path.clone());
            }
        }
    }

    let columns = schema.columns();
    let total_records = write_tsv_atomic(dest, Some(columns.as_slice()), rows.iter().map(|r| r.as_slice()))
        .map_err(|e| Pdf2TsvError::MergeFailed {
            path: dest.to_path_buf(),
            detail: e.detail,
        })?;

    info!(
        "Merged {}/{} document outputs ({} records) into {}",
        merged,
        artifacts.len(),
        total_records,
        dest.display()
    );

    Ok(MergeSummary {
        output_path: dest.to_path_buf(),
        expected: artifacts.len(),
        merged,
        total_records,
        missing,
    })
}

fn read_rows(artifact: &PersistedArtifact, schema: &Schema) -> Result<Vec<Vec<String>>, String> {
    let file = std::fs::File::open(&artifact.path).map_err(|e| e.to_string())?;
    let mut reader = tsv_reader(file, artifact.has_header);
    let width = schema.len() + 1;

    if artifact.has_header {
        let header = reader.headers().map_err(|e| e.to_string())?;
        if header.iter().ne(schema.columns()) {
            warn!(
                "{}: first line is not the canonical header; dropped anyway",
                artifact.path.display()
            );
        }
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        if record.len() != width {
            return Err(format!(
                "row {} has {} columns, expected {}",
                i + 1,
                record.len(),
                width
            ));
        }
        if &record[width - 1] != artifact.source.as_str() {
            return Err(format!(
                "row {} comes from '{}', expected '{}'",
                i + 1,
                &record[width - 1],
                artifact.source
            ));
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Count lines of `path` equal to the schema's header line.
///
/// A well-formed dataset yields exactly 1.
pub fn count_header_lines(path: &Path, schema: &Schema) -> std::io::Result<usize> {
    let header = schema.header_line();
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        if line?.trim_end_matches('\r') == header {
            count += 1;
        }
    }
    Ok(count)
}
