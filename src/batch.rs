//! Batch entry points: a folder of PDFs in, per-document TSVs and one
//! consolidated dataset out.
//!
//! [`Pipeline::run`] is the whole flow:
//!
//! 1. discover the PDFs in the input folder (sorted by file name)
//! 2. take each one through [`crate::document`]'s state machine, up to
//!    `concurrency` at a time
//! 3. once every document is terminal, merge the artifacts of the ones that
//!    reached `Persisted`
//!
//! A document failing never stops the batch. Only conditions that make the
//! whole run pointless (no credential, no input folder, unwritable dataset)
//! come back as `Err`.

use crate::config::ExtractionConfig;
use crate::document::{process_document, DocumentContext};
use crate::error::Pdf2TsvError;
use crate::output::{BatchOutput, BatchStats, DocumentReport, MergeSummary};
use crate::pipeline::extract::{ExtractError, ExtractedText, PdfiumTextExtractor, TextExtractor};
use crate::pipeline::input::{claim_stems, discover_pdfs, document_name, document_stem, StemClaim};
use crate::pipeline::llm::{LlmOracle, StructuringOracle};
use crate::pipeline::merge::merge_artifacts;
use crate::pipeline::persist::discover_artifacts;
use crate::schema::Schema;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// The configured stages, ready to process documents.
///
/// Cheap to share: wrap it in an `Arc` to use it from several tasks or with
/// [`crate::stream::process_stream`].
pub struct Pipeline {
    pub(crate) config: ExtractionConfig,
    pub(crate) schema: &'static Schema,
    pub(crate) extractor: Arc<dyn TextExtractor>,
    pub(crate) oracle: Arc<dyn StructuringOracle>,
}

impl Pipeline {
    /// Assemble a pipeline from explicit stages.
    pub fn new(
        config: ExtractionConfig,
        extractor: Arc<dyn TextExtractor>,
        oracle: Arc<dyn StructuringOracle>,
    ) -> Self {
        Self {
            config,
            schema: Schema::remittance(),
            extractor,
            oracle,
        }
    }

    /// Build the production pipeline: pdfium extraction and an LLM oracle.
    ///
    /// # Errors
    /// [`Pdf2TsvError::ConfigurationMissing`] when no LLM provider can be
    /// resolved, [`Pdf2TsvError::PdfiumBindingFailed`] when libpdfium cannot
    /// be loaded. Nothing has been processed at that point.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, Pdf2TsvError> {
        let provider = resolve_provider(&config)?;
        info!(
            "LLM provider resolved (model: {})",
            config.model.as_deref().unwrap_or("provider default")
        );
        let extractor = PdfiumTextExtractor::new(config.password.clone());
        extractor
            .probe()
            .map_err(|e| Pdf2TsvError::PdfiumBindingFailed(e.to_string()))?;
        let oracle = Arc::new(LlmOracle::new(provider, &config));
        Ok(Self::new(config, Arc::new(extractor), oracle))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Take one document to a terminal state, firing progress events.
    pub async fn process_one(
        &self,
        index: usize,
        total: usize,
        path: &Path,
        output_dir: &Path,
    ) -> DocumentReport {
        let claim = StemClaim::Owned(document_stem(path));
        self.process_claimed(index, total, path, output_dir, &claim).await
    }

    pub(crate) async fn process_claimed(
        &self,
        index: usize,
        total: usize,
        path: &Path,
        output_dir: &Path,
        claim: &StemClaim,
    ) -> DocumentReport {
        let name = document_name(path);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(index, total, &name);
        }

        let ctx = DocumentContext {
            extractor: self.extractor.as_ref(),
            oracle: self.oracle.as_ref(),
            config: &self.config,
            schema: self.schema,
            output_dir,
        };
        let report = process_document(&ctx, index, path, claim).await;

        if let Some(ref cb) = self.config.progress_callback {
            match &report.error {
                None => cb.on_document_complete(index, total, &name, report.records),
                Some(e) => cb.on_document_error(index, total, &name, e.to_string()),
            }
        }
        report
    }

    /// Process `paths` and return one report per path, in the same order.
    pub async fn process_documents(&self, paths: &[PathBuf], output_dir: &Path) -> Vec<DocumentReport> {
        let total = paths.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let claims = claim_stems(paths);

        // `buffered` keeps input order even when later documents finish first.
        let reports: Vec<DocumentReport> = stream::iter(
            paths
                .iter()
                .zip(&claims)
                .enumerate()
                .map(|(i, (path, claim))| self.process_claimed(i + 1, total, path, output_dir, claim)),
        )
        .buffered(self.config.concurrency.max(1))
        .collect()
        .await;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, reports.iter().filter(|r| r.succeeded()).count());
        }
        reports
    }

    /// Run the whole batch over the PDFs in `input_dir`.
    ///
    /// # Errors
    /// - [`Pdf2TsvError::InputDirNotFound`] / [`Pdf2TsvError::NoDocuments`]
    /// - [`Pdf2TsvError::OutputWriteFailed`] when the output folder cannot be created
    /// - [`Pdf2TsvError::MergeFailed`] when the dataset cannot be written
    ///
    /// Per-document failures are in the returned reports, not here.
    pub async fn run(&self, input_dir: &Path) -> Result<BatchOutput, Pdf2TsvError> {
        let pdfs = discover_pdfs(input_dir)?;
        if pdfs.is_empty() {
            return Err(Pdf2TsvError::NoDocuments {
                path: input_dir.to_path_buf(),
            });
        }
        let output_dir = self.config.resolve_output_dir(input_dir);
        self.run_paths(&pdfs, &output_dir).await
    }

    /// Run the batch over an explicit, already-ordered list of PDFs.
    pub async fn run_paths(
        &self,
        pdfs: &[PathBuf],
        output_dir: &Path,
    ) -> Result<BatchOutput, Pdf2TsvError> {
        let start = Instant::now();
        std::fs::create_dir_all(output_dir).map_err(|source| Pdf2TsvError::OutputWriteFailed {
            path: output_dir.to_path_buf(),
            source,
        })?;
        info!(
            "Processing {} documents into {}",
            pdfs.len(),
            output_dir.display()
        );

        let reports = self.process_documents(pdfs, output_dir).await;

        let artifacts: Vec<_> = reports
            .iter()
            .filter_map(|r| r.artifact.clone())
            .collect();

        let merge = if artifacts.is_empty() {
            warn!("No document was processed successfully; skipping merge");
            None
        } else {
            let dest = output_dir.join(&self.config.merged_file_name);
            Some(merge_artifacts(&artifacts, &dest, self.schema)?)
        };

        let stats = BatchStats::from_reports(&reports, start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {}/{} documents, {} records, {}ms",
            stats.succeeded, stats.total_documents, stats.total_records, stats.duration_ms
        );

        Ok(BatchOutput {
            reports,
            stats,
            merge,
        })
    }
}

/// Build a production pipeline and run it over `input_dir`.
pub async fn run(input_dir: impl AsRef<Path>, config: ExtractionConfig) -> Result<BatchOutput, Pdf2TsvError> {
    Pipeline::from_config(config)?.run(input_dir.as_ref()).await
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(input_dir: impl AsRef<Path>, config: ExtractionConfig) -> Result<BatchOutput, Pdf2TsvError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2TsvError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(input_dir, config))
}

/// Re-merge the artifacts already in `output_dir`, without any oracle calls.
///
/// Artifacts are found through their manifests and merged in source-name
/// order, which matches the order of a full run.
pub fn merge_directory(output_dir: &Path, config: &ExtractionConfig) -> Result<MergeSummary, Pdf2TsvError> {
    let dest = output_dir.join(&config.merged_file_name);
    let artifacts = discover_artifacts(output_dir).map_err(|e| Pdf2TsvError::MergeFailed {
        path: dest.clone(),
        detail: e.to_string(),
    })?;
    if artifacts.is_empty() {
        return Err(Pdf2TsvError::NoDocuments {
            path: output_dir.to_path_buf(),
        });
    }
    merge_artifacts(&artifacts, &dest, Schema::remittance())
}

/// Extract text from each PDF without calling the oracle.
///
/// Does not require an LLM provider or API key.
pub async fn inspect_documents(
    extractor: &dyn TextExtractor,
    paths: &[PathBuf],
) -> Vec<(String, Result<ExtractedText, ExtractError>)> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        out.push((document_name(path), extractor.extract(path).await));
    }
    out
}

// ── Provider resolution ──────────────────────────────────────────────────

fn default_model(provider_name: &str) -> &'static str {
    match provider_name {
        "gemini" => "gemini-2.0-flash",
        "anthropic" => "claude-sonnet-4-20250514",
        "ollama" => "llama3.2",
        _ => "gpt-4.1-nano",
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2TsvError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2TsvError::ConfigurationMissing {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_set(key: &str) -> bool {
    std::env::var(key).is_ok_and(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    that provider's default model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Gemini key** (`GEMINI_API_KEY` or `GOOGLE_API_KEY`), then **OpenAI
///    key** (`OPENAI_API_KEY`).
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2TsvError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or_else(|| default_model(name));
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let keyed: [(&str, &[&str]); 2] = [
        ("gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
        ("openai", &["OPENAI_API_KEY"]),
    ];
    for (name, keys) in keyed {
        if keys.iter().any(|k| env_set(k)) {
            let model = config.model.as_deref().unwrap_or_else(|| default_model(name));
            return create_provider(name, model).map_err(|e| match e {
                Pdf2TsvError::ConfigurationMissing { provider, hint } => {
                    Pdf2TsvError::ConfigurationMissing {
                        provider,
                        hint: format!("{hint}\nKeys checked: {}", keys.join(", ")),
                    }
                }
                other => other,
            });
        }
    }

    let hint = "Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY (a .env file works too).";

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2TsvError::ConfigurationMissing {
            provider: "auto".to_string(),
            hint: format!("No LLM provider could be auto-detected from environment.\n{hint}\nError: {e}"),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_models() {
        assert_eq!(default_model("gemini"), "gemini-2.0-flash");
        assert_eq!(default_model("openai"), "gpt-4.1-nano");
        assert_eq!(default_model("unknown"), "gpt-4.1-nano");
    }

    #[test]
    fn merge_directory_without_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let err = merge_directory(dir.path(), &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, Pdf2TsvError::NoDocuments { .. }));
    }
}
