//! Configuration types for PDF-to-TSV extraction.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The config is an explicit value handed to
//! [`crate::batch::Pipeline`] at construction; nothing is read from global
//! state once the pipeline exists, so the per-document pipeline and the
//! merger can be tested with any directories and any oracle.

use crate::error::Pdf2TsvError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// File name of the consolidated dataset.
pub const DEFAULT_MERGED_FILE_NAME: &str = "todos_los_documentos.tsv";

/// Textual marker the oracle uses for "no value".
pub const DEFAULT_NULL_LITERAL: &str = "NULL";

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2tsv::{ExtractionConfig, OutputShape};
///
/// let config = ExtractionConfig::builder()
///     .shape(OutputShape::Delimited)
///     .concurrency(2)
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Where per-document artifacts and the consolidated dataset go.
    /// If None, uses `<input_dir>/output`.
    pub output_dir: Option<PathBuf>,

    /// Wire shape requested from the oracle. Default: [`OutputShape::Delimited`].
    pub shape: OutputShape,

    /// Literal the oracle emits for missing values; also written for nulls. Default: `NULL`.
    pub null_literal: String,

    /// Write a header line into each per-document artifact. Default: true.
    ///
    /// The choice is recorded in the artifact manifest, and the merger skips
    /// the first line only for artifacts that carry one.
    pub write_individual_headers: bool,

    /// File name of the consolidated dataset inside `output_dir`.
    pub merged_file_name: String,

    /// Number of documents processed at once. Default: 1 (sequential).
    ///
    /// Documents are independent, so raising this overlaps oracle latency.
    /// Reports and the merged dataset keep processing order regardless.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-nano".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per document. Default: 4096.
    pub max_tokens: usize,

    /// Transport-level retries of a single oracle call. Default: 0.
    ///
    /// This re-sends the same prompt after a provider error or timeout; it
    /// never re-runs extraction or parsing.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-oracle-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses built-in default.
    pub system_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Optional per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            shape: OutputShape::default(),
            null_literal: DEFAULT_NULL_LITERAL.to_string(),
            write_individual_headers: true,
            merged_file_name: DEFAULT_MERGED_FILE_NAME.to_string(),
            concurrency: 1,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            system_prompt: None,
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("output_dir", &self.output_dir)
            .field("shape", &self.shape)
            .field("null_literal", &self.null_literal)
            .field("write_individual_headers", &self.write_individual_headers)
            .field("merged_file_name", &self.merged_file_name)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Output directory for a given input directory.
    pub fn resolve_output_dir(&self, input_dir: &std::path::Path) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| input_dir.join("output"))
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn shape(mut self, shape: OutputShape) -> Self {
        self.config.shape = shape;
        self
    }

    /// Surrounding whitespace is dropped: cells are compared trimmed.
    pub fn null_literal(mut self, literal: impl Into<String>) -> Self {
        self.config.null_literal = literal.into().trim().to_string();
        self
    }

    pub fn write_individual_headers(mut self, v: bool) -> Self {
        self.config.write_individual_headers = v;
        self
    }

    pub fn merged_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.merged_file_name = name.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2TsvError> {
        let c = &self.config;
        if c.null_literal.trim().is_empty() {
            return Err(Pdf2TsvError::InvalidConfig(
                "Null literal must not be empty: nulls would be indistinguishable from empty values"
                    .into(),
            ));
        }
        if c.null_literal.contains(['\t', '\n', '\r']) {
            return Err(Pdf2TsvError::InvalidConfig(
                "Null literal must not contain tabs or line breaks".into(),
            ));
        }
        let name = c.merged_file_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(Pdf2TsvError::InvalidConfig(format!(
                "Merged file name must be a plain file name, got '{}'",
                c.merged_file_name
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2TsvError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Reply shape requested from the oracle.
///
/// | Shape | Reply | Records |
/// |-------|-------|---------|
/// | `Delimited` | header-less tab-separated rows (default) | one per row |
/// | `Json` | one JSON object, or an array of objects (legacy) | one per object |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputShape {
    #[default]
    Delimited,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.shape, OutputShape::Delimited);
        assert_eq!(c.null_literal, "NULL");
        assert!(c.write_individual_headers);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.merged_file_name, "todos_los_documentos.tsv");
    }

    #[test]
    fn builder_clamps() {
        let c = ExtractionConfig::builder()
            .concurrency(0)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn empty_null_literal_rejected() {
        let err = ExtractionConfig::builder().null_literal("  ").build();
        assert!(matches!(err, Err(Pdf2TsvError::InvalidConfig(_))));
    }

    #[test]
    fn null_literal_is_trimmed() {
        let c = ExtractionConfig::builder().null_literal(" N/A ").build().unwrap();
        assert_eq!(c.null_literal, "N/A");
    }

    #[test]
    fn merged_file_name_must_be_plain() {
        let err = ExtractionConfig::builder()
            .merged_file_name("../all.tsv")
            .build();
        assert!(matches!(err, Err(Pdf2TsvError::InvalidConfig(_))));
    }

    #[test]
    fn output_dir_defaults_under_input() {
        let c = ExtractionConfig::default();
        assert_eq!(
            c.resolve_output_dir(std::path::Path::new("/data/pdfs")),
            PathBuf::from("/data/pdfs/output")
        );
        let c = ExtractionConfig::builder().output_dir("/tmp/out").build().unwrap();
        assert_eq!(
            c.resolve_output_dir(std::path::Path::new("/data/pdfs")),
            PathBuf::from("/tmp/out")
        );
    }
}
