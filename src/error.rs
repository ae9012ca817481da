//! Error types for the edgequake-pdf2tsv library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`Pdf2TsvError`]: **fatal** for the run: nothing can be processed
//!   (no credential, input folder missing, consolidated file not writable).
//!   Returned as `Err(Pdf2TsvError)` from the top-level entry points.
//!
//! * [`DocumentError`]: **non-fatal**: one document failed somewhere in its
//!   pipeline but the batch carries on. Stored inside
//!   [`crate::output::DocumentReport`] so callers can inspect partial success
//!   rather than losing the batch to one bad PDF.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2tsv library.
#[derive(Debug, Error)]
pub enum Pdf2TsvError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// No oracle credential or provider could be resolved.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ConfigurationMissing { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input ─────────────────────────────────────────────────────────────
    #[error("Input directory not found: '{path}'")]
    InputDirNotFound { path: PathBuf },

    #[error("No PDF files found in '{path}'")]
    NoDocuments { path: PathBuf },

    // ── Output ────────────────────────────────────────────────────────────
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The consolidated dataset could not be produced at all.
    #[error("Merge into '{path}' failed: {detail}")]
    MergeFailed { path: PathBuf, detail: String },

    /// Some expected per-document artifacts were not merged.
    ///
    /// Only produced by [`crate::output::MergeSummary::into_result`] when the
    /// caller wants to treat a partial merge as an error; the merge itself
    /// always proceeds with whatever is available.
    #[error("{merged}/{expected} document outputs merged; missing or unreadable: {missing:?}")]
    MergeIncomplete {
        expected: usize,
        merged: usize,
        missing: Vec<PathBuf>,
    },

    // ── Pdfium binding ────────────────────────────────────────────────────
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install libpdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Taxonomy name of a per-document failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NoExtractableText,
    OracleFailure,
    EmptyResponse,
    MalformedStructure,
    SchemaMismatch,
    PersistError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NoExtractableText => "NoExtractableText",
            ErrorKind::OracleFailure => "OracleFailure",
            ErrorKind::EmptyResponse => "EmptyResponse",
            ErrorKind::MalformedStructure => "MalformedStructure",
            ErrorKind::SchemaMismatch => "SchemaMismatch",
            ErrorKind::PersistError => "PersistError",
        };
        f.write_str(name)
    }
}

/// A non-fatal error for a single document.
///
/// The two parse failures keep the raw oracle reply so it can be shown to
/// the user next to the error.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum DocumentError {
    #[error("{document}: NoExtractableText: {detail}")]
    NoExtractableText { document: String, detail: String },

    #[error("{document}: OracleFailure: {detail}")]
    OracleFailure { document: String, detail: String },

    #[error("{document}: EmptyResponse: the model returned no content")]
    EmptyResponse { document: String },

    #[error("{document}: MalformedStructure: {detail}")]
    MalformedStructure {
        document: String,
        detail: String,
        raw: String,
    },

    #[error("{document}: SchemaMismatch: {detail}")]
    SchemaMismatch {
        document: String,
        detail: String,
        raw: String,
    },

    #[error("{document}: PersistError: cannot write '{path}': {detail}")]
    PersistError {
        document: String,
        path: PathBuf,
        detail: String,
    },
}

impl DocumentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::NoExtractableText { .. } => ErrorKind::NoExtractableText,
            DocumentError::OracleFailure { .. } => ErrorKind::OracleFailure,
            DocumentError::EmptyResponse { .. } => ErrorKind::EmptyResponse,
            DocumentError::MalformedStructure { .. } => ErrorKind::MalformedStructure,
            DocumentError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            DocumentError::PersistError { .. } => ErrorKind::PersistError,
        }
    }

    pub fn document(&self) -> &str {
        match self {
            DocumentError::NoExtractableText { document, .. }
            | DocumentError::OracleFailure { document, .. }
            | DocumentError::EmptyResponse { document }
            | DocumentError::MalformedStructure { document, .. }
            | DocumentError::SchemaMismatch { document, .. }
            | DocumentError::PersistError { document, .. } => document,
        }
    }

    /// Raw oracle reply, for the failures where it aids diagnosis.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            DocumentError::MalformedStructure { raw, .. }
            | DocumentError::SchemaMismatch { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
