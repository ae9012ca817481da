//! Pipeline stages for PDF-to-TSV extraction.
//!
//! Each submodule implements exactly one transformation step and is tested
//! on its own. [`crate::document`] strings them together per document.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ llm ──▶ normalize ──▶ parse ──▶ persist ──▶ merge
//! (folder)  (pdfium)   (oracle) (cleanup)    (records) (<stem>.tsv) (dataset)
//! ```
//!
//! 1. [`input`]     list the PDFs of the input folder in processing order
//! 2. [`extract`]   page text in reading order; `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`llm`]       the only stage with network I/O
//! 4. [`normalize`] deterministic cleanup of the raw reply
//! 5. [`parse`]     strict schema validation; one bad row rejects the document
//! 6. [`persist`]   per-document artifact plus manifest, written atomically
//! 7. [`merge`]     one header, all rows, in processing order

pub mod extract;
pub mod input;
pub mod llm;
pub mod merge;
pub mod normalize;
pub mod parse;
pub mod persist;
