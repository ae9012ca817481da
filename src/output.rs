//! Result types returned by the batch entry points.

use crate::document::DocumentState;
use crate::error::{DocumentError, Pdf2TsvError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A per-document TSV artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedArtifact {
    /// The `<stem>.tsv` file.
    pub path: PathBuf,
    /// The `<stem>.manifest.json` sidecar.
    pub manifest_path: PathBuf,
    /// Source document name, as written to the provenance column.
    pub source: String,
    /// Whether the first line of `path` is a header line.
    pub has_header: bool,
    pub record_count: usize,
}

/// Outcome of one document's pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    /// 1-indexed position in processing order.
    pub index: usize,
    /// File name of the source PDF.
    pub name: String,
    pub path: PathBuf,
    /// Terminal state: `Persisted` or `Failed`.
    pub state: DocumentState,
    /// Last state reached before failing, if it failed.
    pub failed_at: Option<DocumentState>,
    pub records: usize,
    pub artifact: Option<PersistedArtifact>,
    pub error: Option<DocumentError>,
    pub duration_ms: u64,
}

impl DocumentReport {
    pub fn succeeded(&self) -> bool {
        self.state == DocumentState::Persisted
    }
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_records: usize,
    pub duration_ms: u64,
}

impl BatchStats {
    pub fn from_reports(reports: &[DocumentReport], duration_ms: u64) -> Self {
        let succeeded = reports.iter().filter(|r| r.succeeded()).count();
        Self {
            total_documents: reports.len(),
            succeeded,
            failed: reports.len() - succeeded,
            total_records: reports.iter().map(|r| r.records).sum(),
            duration_ms,
        }
    }
}

/// What the merger produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub output_path: PathBuf,
    /// Artifacts handed to the merger.
    pub expected: usize,
    /// Artifacts whose rows made it into the dataset.
    pub merged: usize,
    pub total_records: usize,
    /// Artifacts that were absent or could not be read.
    pub missing: Vec<PathBuf>,
}

impl MergeSummary {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Turn a partial merge into [`Pdf2TsvError::MergeIncomplete`].
    pub fn into_result(self) -> Result<Self, Pdf2TsvError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Pdf2TsvError::MergeIncomplete {
                expected: self.expected,
                merged: self.merged,
                missing: self.missing,
            })
        }
    }
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutput {
    /// One report per document, in processing order.
    pub reports: Vec<DocumentReport>,
    pub stats: BatchStats,
    /// `None` when no document reached `Persisted`.
    pub merge: Option<MergeSummary>,
}

impl BatchOutput {
    pub fn failures(&self) -> impl Iterator<Item = &DocumentReport> {
        self.reports.iter().filter(|r| !r.succeeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: DocumentState, records: usize) -> DocumentReport {
        DocumentReport {
            index: 1,
            name: "a.pdf".into(),
            path: PathBuf::from("a.pdf"),
            state,
            failed_at: None,
            records,
            artifact: None,
            error: None,
            duration_ms: 5,
        }
    }

    #[test]
    fn stats_count_success_and_failure() {
        let reports = vec![
            report(DocumentState::Persisted, 2),
            report(DocumentState::Failed, 0),
            report(DocumentState::Persisted, 3),
        ];
        let stats = BatchStats::from_reports(&reports, 10);
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total_records, 5);
    }

    #[test]
    fn incomplete_merge_becomes_error() {
        let summary = MergeSummary {
            output_path: PathBuf::from("out/all.tsv"),
            expected: 2,
            merged: 1,
            total_records: 1,
            missing: vec![PathBuf::from("out/b.tsv")],
        };
        assert!(!summary.is_complete());
        match summary.into_result() {
            Err(Pdf2TsvError::MergeIncomplete { expected, merged, missing }) => {
                assert_eq!((expected, merged), (2, 1));
                assert_eq!(missing, vec![PathBuf::from("out/b.tsv")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
