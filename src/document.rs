//! Per-document pipeline: one PDF from `Pending` to `Persisted` or `Failed`.
//!
//! ```text
//! Pending ─extract─▶ TextExtracted ─oracle─▶ Structured ─normalise+parse─▶ Parsed ─write─▶ Persisted
//!    │                    │                      │                           │
//!    └────────────────────┴──────────────────────┴───────────────────────────┴──▶ Failed
//! ```
//!
//! Every stage error is caught here and turned into a [`DocumentError`]; a
//! document never takes the batch down with it. The raw oracle reply is
//! kept on parse failures so it can be shown to the user.

use crate::config::ExtractionConfig;
use crate::error::DocumentError;
use crate::output::{DocumentReport, PersistedArtifact};
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::input::{document_name, StemClaim};
use crate::pipeline::llm::StructuringOracle;
use crate::pipeline::normalize::normalize_response;
use crate::pipeline::parse::{parse_response, ParseError};
use crate::pipeline::persist::{artifact_paths, persist_document};
use crate::prompts::build_prompt;
use crate::record::DocumentOutput;
use crate::schema::Schema;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocumentState {
    Pending,
    TextExtracted,
    Structured,
    Parsed,
    Persisted,
    Failed,
}

impl DocumentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentState::Persisted | DocumentState::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: DocumentState) -> bool {
        use DocumentState::*;
        match (self, next) {
            (Pending, TextExtracted)
            | (TextExtracted, Structured)
            | (Structured, Parsed)
            | (Parsed, Persisted) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Tracks one document's walk through the states.
#[derive(Debug)]
struct DocumentRun {
    name: String,
    state: DocumentState,
}

impl DocumentRun {
    fn new(name: String) -> Self {
        Self {
            name,
            state: DocumentState::Pending,
        }
    }

    fn advance(&mut self, next: DocumentState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("{}: {:?} -> {:?}", self.name, self.state, next);
        self.state = next;
    }
}

/// Everything one document's pipeline needs, borrowed from the batch.
pub(crate) struct DocumentContext<'a> {
    pub extractor: &'a dyn TextExtractor,
    pub oracle: &'a dyn StructuringOracle,
    pub config: &'a ExtractionConfig,
    pub schema: &'static Schema,
    pub output_dir: &'a Path,
}

/// Take one document through every stage and report where it ended.
pub(crate) async fn process_document(
    ctx: &DocumentContext<'_>,
    index: usize,
    path: &Path,
    claim: &StemClaim,
) -> DocumentReport {
    let start = Instant::now();
    let mut run = DocumentRun::new(document_name(path));

    let outcome = run_stages(ctx, &mut run, path, claim).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(artifact) => {
            run.advance(DocumentState::Persisted);
            info!(
                "{}: {} records → {}",
                run.name,
                artifact.record_count,
                artifact.path.display()
            );
            DocumentReport {
                index,
                name: run.name,
                path: path.to_path_buf(),
                state: DocumentState::Persisted,
                failed_at: None,
                records: artifact.record_count,
                artifact: Some(artifact),
                error: None,
                duration_ms,
            }
        }
        Err(error) => {
            let failed_at = run.state;
            run.advance(DocumentState::Failed);
            warn!("{} (after {:?})", error, failed_at);
            DocumentReport {
                index,
                name: run.name,
                path: path.to_path_buf(),
                state: DocumentState::Failed,
                failed_at: Some(failed_at),
                records: 0,
                artifact: None,
                error: Some(error),
                duration_ms,
            }
        }
    }
}

async fn run_stages(
    ctx: &DocumentContext<'_>,
    run: &mut DocumentRun,
    path: &Path,
    claim: &StemClaim,
) -> Result<PersistedArtifact, DocumentError> {
    let document = run.name.clone();
    let config = ctx.config;

    // Extraction
    let text = ctx
        .extractor
        .extract(path)
        .await
        .map_err(|e| DocumentError::NoExtractableText {
            document: document.clone(),
            detail: e.to_string(),
        })?;
    if text.is_blank() {
        return Err(DocumentError::NoExtractableText {
            document,
            detail: "no text layer found (scanned image?)".to_string(),
        });
    }
    debug!(
        "{}: {} pages, {} words",
        document,
        text.pages.len(),
        text.word_count()
    );
    run.advance(DocumentState::TextExtracted);

    // Structuring
    let prompt = build_prompt(ctx.schema, config.shape, &config.null_literal, &text.joined());
    let raw = ctx
        .oracle
        .structure(&prompt)
        .await
        .map_err(|e| DocumentError::OracleFailure {
            document: document.clone(),
            detail: e.to_string(),
        })?;
    run.advance(DocumentState::Structured);

    // Normalisation + parsing
    let cleaned = normalize_response(&raw).map_err(|_| DocumentError::EmptyResponse {
        document: document.clone(),
    })?;
    let records = parse_response(config.shape, &cleaned, ctx.schema, &config.null_literal)
        .map_err(|e| match e {
            ParseError::Malformed { detail } => DocumentError::MalformedStructure {
                document: document.clone(),
                detail,
                raw: raw.clone(),
            },
            ParseError::SchemaMismatch { detail } => DocumentError::SchemaMismatch {
                document: document.clone(),
                detail,
                raw: raw.clone(),
            },
        })?;
    run.advance(DocumentState::Parsed);

    // Persistence
    let stem = match claim {
        StemClaim::Owned(stem) => stem.clone(),
        StemClaim::Taken { stem, by } => {
            return Err(DocumentError::PersistError {
                document,
                path: artifact_paths(ctx.output_dir, stem).0,
                detail: format!("artifact name '{stem}' is already used by {by}"),
            });
        }
    };
    let (artifact_path, _) = artifact_paths(ctx.output_dir, &stem);
    if artifact_path.file_name().and_then(|n| n.to_str()) == Some(config.merged_file_name.as_str()) {
        return Err(DocumentError::PersistError {
            document,
            path: artifact_path,
            detail: "name collides with the consolidated dataset".to_string(),
        });
    }

    let output = DocumentOutput::new(document.clone(), records);
    persist_document(
        &output,
        ctx.output_dir,
        &stem,
        ctx.schema,
        &config.null_literal,
        config.write_individual_headers,
    )
    .map_err(|e| DocumentError::PersistError {
        document,
        path: e.path,
        detail: e.detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentState::*;

    #[test]
    fn legal_transitions() {
        assert!(Pending.can_advance_to(TextExtracted));
        assert!(TextExtracted.can_advance_to(Structured));
        assert!(Structured.can_advance_to(Parsed));
        assert!(Parsed.can_advance_to(Persisted));
        for s in [Pending, TextExtracted, Structured, Parsed] {
            assert!(s.can_advance_to(Failed));
        }
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Pending.can_advance_to(Structured));
        assert!(!Pending.can_advance_to(Persisted));
        assert!(!Parsed.can_advance_to(TextExtracted));
        assert!(!Persisted.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(Persisted.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Parsed.is_terminal());
    }
}
