//! CLI binary for edgequake-pdf2tsv.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2tsv::pipeline::input::{
    discover_pdfs, first_available, ConventionalPath, FixedPath, PathProvider,
    CONVENTIONAL_INPUT_DIR,
};
use edgequake_pdf2tsv::pipeline::merge::count_header_lines;
use edgequake_pdf2tsv::{
    inspect_documents, merge_directory, BatchOutput, BatchProgressCallback, ExtractionConfig,
    OutputShape, PdfiumTextExtractor, Pipeline, ProgressCallback, Schema,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one ✓/✗ line per
/// document.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total} documents…"))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, name: &str, records: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{records} records")),
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, name: &str, error: String) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg),
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed > 0 {
            eprintln!(
                "{} {}/{} documents failed",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                red(&failed.to_string()),
                total
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process ./my_pdfs into ./my_pdfs/output
  pdf2tsv

  # Explicit folders
  pdf2tsv remesas/ -o datos/

  # Only the first two PDFs (smoke test)
  pdf2tsv --limit 2

  # Check the PDFs have a text layer (no API key needed)
  pdf2tsv --extract-only remesas/

  # Rebuild the consolidated dataset from existing outputs
  pdf2tsv --merge-only remesas/

  # Legacy JSON reply shape, OpenAI model
  pdf2tsv --shape json --provider openai --model gpt-4.1-mini

OUTPUT:
  <output>/<name>.tsv                one file per PDF, tab-separated
  <output>/<name>.manifest.json      header mode and record count
  <output>/todos_los_documentos.tsv  all records, exactly one header line

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium

  Variables are also read from a .env file in the working directory.
"#;

/// Extract remittance data from PDF documents into TSV using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2tsv",
    version,
    about = "Extract remittance data from a folder of PDFs into TSV using LLMs",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder containing the PDFs. Default: ./my_pdfs
    #[arg(env = "PDF2TSV_INPUT")]
    input: Option<PathBuf>,

    /// Folder for per-document outputs and the dataset. Default: <input>/output
    #[arg(short, long, env = "PDF2TSV_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Reply shape requested from the model.
    #[arg(long, env = "PDF2TSV_SHAPE", value_enum, default_value = "delimited")]
    shape: ShapeArg,

    /// Number of documents processed at once.
    #[arg(short, long, env = "PDF2TSV_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Process only the first N PDFs (by file name).
    #[arg(long, env = "PDF2TSV_LIMIT")]
    limit: Option<usize>,

    /// Literal the model writes for missing values.
    #[arg(long, env = "PDF2TSV_NULL_LITERAL", default_value = "NULL")]
    null_literal: String,

    /// Omit the header line from per-document files.
    #[arg(long, env = "PDF2TSV_NO_INDIVIDUAL_HEADERS")]
    no_individual_headers: bool,

    /// File name of the consolidated dataset.
    #[arg(long, env = "PDF2TSV_MERGED_NAME", default_value = "todos_los_documentos.tsv")]
    merged_name: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2TSV_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2TSV_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per document.
    #[arg(long, env = "PDF2TSV_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2TSV_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Transport retries per LLM call.
    #[arg(long, env = "PDF2TSV_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-document LLM call timeout in seconds.
    #[arg(long, env = "PDF2TSV_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Print per-page text statistics only; no LLM calls.
    #[arg(long, conflicts_with = "merge_only")]
    extract_only: bool,

    /// Rebuild the consolidated dataset from existing outputs; no LLM calls.
    #[arg(long)]
    merge_only: bool,

    /// Print the batch result as JSON on stdout.
    #[arg(long, env = "PDF2TSV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2TSV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TSV_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ShapeArg {
    Delimited,
    Json,
}

impl From<ShapeArg> for OutputShape {
    fn from(v: ShapeArg) -> Self {
        match v {
            ShapeArg::Delimited => OutputShape::Delimited,
            ShapeArg::Json => OutputShape::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Resolve folders ──────────────────────────────────────────────────
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    let fixed = cli.input.clone().map(FixedPath);
    let conventional = ConventionalPath { base: cwd };
    let input_dir = match fixed {
        Some(ref f) => first_available(&[f as &dyn PathProvider, &conventional]),
        None => first_available(&[&conventional]),
    }
    .with_context(|| {
        format!(
            "No input folder given and ./{CONVENTIONAL_INPUT_DIR} does not exist. \
             Create it and put your PDFs there, or pass a folder."
        )
    })?;

    let progress_cb: Option<ProgressCallback> = if show_progress && !cli.extract_only && !cli.merge_only {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let output_dir = config.resolve_output_dir(&input_dir);

    // ── Merge-only mode ──────────────────────────────────────────────────
    if cli.merge_only {
        let summary = merge_directory(&output_dir, &config).context("Merge failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
            );
        } else if !cli.quiet {
            eprintln!(
                "{}  {}/{} outputs  {} records  →  {}",
                if summary.is_complete() { green("✔") } else { cyan("⚠") },
                summary.merged,
                summary.expected,
                summary.total_records,
                bold(&summary.output_path.display().to_string()),
            );
            for path in &summary.missing {
                eprintln!("   {} {}", red("missing"), path.display());
            }
            print_header_check(&summary.output_path);
        }
        return Ok(());
    }

    // ── Discover documents ───────────────────────────────────────────────
    let mut pdfs = discover_pdfs(&input_dir).context("Cannot list input folder")?;
    if let Some(limit) = cli.limit {
        pdfs.truncate(limit);
    }
    if pdfs.is_empty() {
        anyhow::bail!("No PDF files found in '{}'", input_dir.display());
    }

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        let extractor = PdfiumTextExtractor::new(config.password.clone());
        for (name, result) in inspect_documents(&extractor, &pdfs).await {
            match result {
                Ok(text) => {
                    println!("{}  ({} pages)", bold(&name), text.pages.len());
                    for (i, page) in text.pages.iter().enumerate() {
                        println!(
                            "  page {:>3}: {:>6} words  {:>7} chars",
                            i + 1,
                            page.split_whitespace().count(),
                            page.chars().count()
                        );
                    }
                    if text.is_blank() {
                        println!("  {}", red("no text layer (scanned image?)"));
                    } else {
                        let preview: String = text.joined().chars().take(300).collect();
                        println!("{}", dim(&preview));
                    }
                }
                Err(e) => println!("{}  {}", bold(&name), red(&e.to_string())),
            }
        }
        return Ok(());
    }

    // ── Full run ─────────────────────────────────────────────────────────
    let pipeline = Pipeline::from_config(config).context("LLM provider not configured")?;
    let output = pipeline
        .run_paths(&pdfs, &output_dir)
        .await
        .context("Batch failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        print_summary(&output, pipeline.schema());
    }

    if output.stats.succeeded == 0 {
        anyhow::bail!("No document was processed successfully");
    }
    Ok(())
}

fn print_summary(output: &BatchOutput, schema: &Schema) {
    let stats = &output.stats;
    eprintln!(
        "{}  {}/{} documents  {} records  {}ms",
        if stats.failed == 0 { green("✔") } else { cyan("⚠") },
        stats.succeeded,
        stats.total_documents,
        stats.total_records,
        stats.duration_ms,
    );

    for report in output.failures() {
        if let Some(ref err) = report.error {
            eprintln!("   {} {}  {}", red("✗"), report.name, red(&err.kind().to_string()));
            eprintln!("     {}", err);
            if let Some(raw) = err.raw_response() {
                eprintln!("     {}", dim("model reply:"));
                for line in raw.lines() {
                    eprintln!("     {}", dim(line));
                }
            }
        }
    }

    if let Some(ref merge) = output.merge {
        eprintln!(
            "   →  {}  ({}/{} outputs merged)",
            bold(&merge.output_path.display().to_string()),
            merge.merged,
            merge.expected
        );
        for path in &merge.missing {
            eprintln!("   {} {}", red("missing"), path.display());
        }
        eprintln!("   header: {}", dim(&schema.header_line()));
        print_header_check(&merge.output_path);
    }
}

fn print_header_check(path: &Path) {
    match count_header_lines(path, Schema::remittance()) {
        Ok(1) => eprintln!("   {} header appears exactly once", green("✓")),
        Ok(n) => eprintln!("   {} header appears {} times", red("✗"), n),
        Err(e) => eprintln!("   {} cannot read {}: {}", red("✗"), path.display(), e),
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .shape(cli.shape.clone().into())
        .null_literal(cli.null_literal.clone())
        .write_individual_headers(!cli.no_individual_headers)
        .merged_file_name(cli.merged_name.clone())
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref dir) = cli.output {
        builder = builder.output_dir(dir.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
