//! PDF text extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to drive from async contexts. `tokio::task::spawn_blocking` moves the work
//! onto the blocking pool so the runtime keeps serving other documents'
//! oracle calls meanwhile.
//!
//! ## Why re-order segments?
//!
//! pdfium returns text in content-stream order, which for generated
//! remittance forms is frequently column-by-column: all labels first, then
//! all values. The oracle needs label and value next to each other, so each
//! page's text segments are re-assembled top-to-bottom, left-to-right, with
//! segments on the same baseline joined into one line.

use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Ordered page text of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub pages: Vec<String>,
}

impl ExtractedText {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }

    /// All pages joined by a blank line.
    pub fn joined(&self) -> String {
        self.pages.join("\n\n")
    }

    /// True when no page carries any non-whitespace character.
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.trim().is_empty())
    }

    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.chars().count()).sum()
    }

    pub fn word_count(&self) -> usize {
        self.pages.iter().map(|p| p.split_whitespace().count()).sum()
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("file not found: '{0}'")]
    NotFound(PathBuf),

    #[error("permission denied reading '{0}'")]
    PermissionDenied(PathBuf),

    #[error("'{path}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    #[error("cannot read PDF '{path}': {detail}")]
    Pdf { path: PathBuf, detail: String },

    #[error("pdfium library unavailable: {0}")]
    Binding(String),

    #[error("extraction task failed: {0}")]
    Internal(String),
}

/// Source of document text.
///
/// Must return page text in natural reading order.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractError>;
}

/// [`TextExtractor`] backed by pdfium-render.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextExtractor {
    password: Option<String>,
    library_path: Option<PathBuf>,
}

impl PdfiumTextExtractor {
    pub fn new(password: Option<String>) -> Self {
        Self {
            password,
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Bind to a specific libpdfium file instead of searching.
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Check that pdfium can be loaded at all.
    pub fn probe(&self) -> Result<(), ExtractError> {
        bind_pdfium(self.library_path.as_deref()).map(|_| ())
    }
}

#[async_trait]
impl TextExtractor for PdfiumTextExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractError> {
        let path = path.to_path_buf();
        let password = self.password.clone();
        let library_path = self.library_path.clone();

        tokio::task::spawn_blocking(move || {
            extract_blocking(&path, password.as_deref(), library_path.as_deref())
        })
        .await
        .map_err(|e| ExtractError::Internal(format!("extract task panicked: {e}")))?
    }
}

/// Bind to libpdfium: explicit path, then `./`, then the system library.
fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, ExtractError> {
    let bindings = match library_path {
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")),
    }
    .or_else(|_| Pdfium::bind_to_system_library())
    .map_err(|e| ExtractError::Binding(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Check existence, readability and the `%PDF` magic bytes.
pub fn validate_pdf(path: &Path) -> Result<(), ExtractError> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }
    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(ExtractError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ExtractError::PermissionDenied(path.to_path_buf()))
        }
        Err(_) => Err(ExtractError::NotFound(path.to_path_buf())),
    }
}

fn extract_blocking(
    path: &Path,
    password: Option<&str>,
    library_path: Option<&Path>,
) -> Result<ExtractedText, ExtractError> {
    validate_pdf(path)?;
    let pdfium = bind_pdfium(library_path)?;

    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| ExtractError::Pdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} ({} pages)", path.display(), pages.len());

    let mut out = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let page_height = page.height().value;
        let text = page.text().map_err(|e| ExtractError::Pdf {
            path: path.to_path_buf(),
            detail: format!("page {}: {e:?}", idx + 1),
        })?;

        let mut cells = Vec::new();
        for segment in text.segments().iter() {
            let content = segment.text();
            if content.trim().is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            cells.push(TextCell {
                text: content.trim().to_string(),
                x: bounds.left().value,
                y: page_height - bounds.top().value,
                height: (bounds.top().value - bounds.bottom().value).abs(),
            });
        }

        let page_text = if cells.is_empty() {
            text.all()
        } else {
            assemble_reading_order(cells)
        };
        debug!("Page {}: {} chars", idx + 1, page_text.len());
        out.push(page_text);
    }

    Ok(ExtractedText::new(out))
}

// ── Reading order ────────────────────────────────────────────────────────────

/// A positioned text fragment, top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub struct TextCell {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub height: f32,
}

/// Join cells into lines: top-to-bottom, then left-to-right within a line.
///
/// Two cells share a line when their tops differ by less than half the
/// taller cell's height (minimum 2pt).
pub fn assemble_reading_order(mut cells: Vec<TextCell>) -> String {
    cells.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Vec<TextCell>> = Vec::new();
    for cell in cells {
        match lines.last_mut() {
            Some(line) if same_line(&line[0], &cell) => line.push(cell),
            _ => lines.push(vec![cell]),
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            line.into_iter()
                .map(|c| c.text)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn same_line(anchor: &TextCell, cell: &TextCell) -> bool {
    let tolerance = (anchor.height.max(cell.height) * 0.5).max(2.0);
    (cell.y - anchor.y).abs() < tolerance
}
