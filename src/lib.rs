//! # edgequake-pdf2tsv
//!
//! Turn a folder of PDF remittance documents into structured tab-separated
//! data using an LLM.
//!
//! ## Why this crate?
//!
//! Remittance PDFs carry the same handful of fields (reference, debtor,
//! IBAN, amount, due date, issuer, …) in endlessly varying layouts. Instead
//! of a template per layout, this crate extracts each document's text layer
//! and lets an LLM map it onto a fixed schema, then validates the reply
//! strictly before anything reaches disk.
//!
//! ## Pipeline Overview
//!
//! ```text
//! my_pdfs/*.pdf
//!  │
//!  ├─ 1. Input      list PDFs, sorted by file name
//!  ├─ 2. Extract    text layer via pdfium (spawn_blocking), reading order
//!  ├─ 3. Oracle     one LLM call per document (gemini / gpt-4.1-nano / …)
//!  ├─ 4. Normalise  strip fences, prose and invisible characters
//!  ├─ 5. Parse      tab-separated rows (or legacy JSON) → typed records
//!  ├─ 6. Persist    output/<stem>.tsv + manifest, atomically
//!  └─ 7. Merge      output/todos_los_documentos.tsv, exactly one header
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2tsv::{run, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let output = run("my_pdfs", config).await?;
//!     for report in output.failures() {
//!         eprintln!("{}: {:?}", report.name, report.error);
//!     }
//!     if let Some(merge) = &output.merge {
//!         println!("{} records in {}", merge.total_records, merge.output_path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2tsv` binary (clap + anyhow + tracing-subscriber + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2tsv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod schema;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{inspect_documents, merge_directory, run, run_sync, Pipeline};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, OutputShape};
pub use document::DocumentState;
pub use error::{DocumentError, ErrorKind, Pdf2TsvError};
pub use output::{BatchOutput, BatchStats, DocumentReport, MergeSummary, PersistedArtifact};
pub use pipeline::extract::{ExtractedText, PdfiumTextExtractor, TextExtractor};
pub use pipeline::llm::{LlmOracle, OracleError, StructuringOracle};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{Amount, DocumentOutput, FieldValue, Record};
pub use schema::{FieldKind, FieldSpec, Schema};
pub use stream::process_stream;
