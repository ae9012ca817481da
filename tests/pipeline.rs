//! Batch pipeline tests with in-process stages.
//!
//! The "PDFs" here are plain text files: `FileTextExtractor` returns their
//! contents as a single page, and `ScriptedOracle` answers with the reply
//! registered for the `[[key]]` marker found in the prompt. No pdfium, no
//! network.

use async_trait::async_trait;
use edgequake_pdf2tsv::pipeline::extract::ExtractError;
use edgequake_pdf2tsv::pipeline::merge::count_header_lines;
use edgequake_pdf2tsv::pipeline::persist::read_artifact;
use edgequake_pdf2tsv::{
    merge_directory, process_stream, BatchProgressCallback, DocumentState, ErrorKind,
    ExtractedText, ExtractionConfig, FieldValue, OracleError, OutputShape, Pdf2TsvError, Pipeline,
    Schema, StructuringOracle, TextExtractor,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────

struct FileTextExtractor;

#[async_trait]
impl TextExtractor for FileTextExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractError> {
        std::fs::read_to_string(path)
            .map(|text| ExtractedText::new(vec![text]))
            .map_err(|_| ExtractError::NotFound(path.to_path_buf()))
    }
}

#[derive(Clone)]
struct Script {
    reply: Result<String, OracleError>,
    delay_ms: u64,
}

#[derive(Default)]
struct ScriptedOracle {
    scripts: HashMap<String, Script>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    fn reply(mut self, key: &str, reply: &str) -> Self {
        self.scripts.insert(
            key.to_string(),
            Script {
                reply: Ok(reply.to_string()),
                delay_ms: 0,
            },
        );
        self
    }

    fn slow_reply(mut self, key: &str, reply: &str, delay_ms: u64) -> Self {
        self.scripts.insert(
            key.to_string(),
            Script {
                reply: Ok(reply.to_string()),
                delay_ms,
            },
        );
        self
    }

    fn fail(mut self, key: &str, err: OracleError) -> Self {
        self.scripts.insert(
            key.to_string(),
            Script {
                reply: Err(err),
                delay_ms: 0,
            },
        );
        self
    }
}

#[async_trait]
impl StructuringOracle for ScriptedOracle {
    async fn structure(&self, prompt: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .iter()
            .find(|(key, _)| prompt.contains(&format!("[[{key}]]")))
            .map(|(_, s)| s.clone())
            .ok_or_else(|| OracleError::Provider("no script for prompt".into()))?;
        if script.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(script.delay_ms)).await;
        }
        script.reply
    }
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl BatchProgressCallback for RecordingCallback {
    fn on_batch_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("start {total}"));
    }
    fn on_document_complete(&self, index: usize, _total: usize, name: &str, records: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("ok {index} {name} {records}"));
    }
    fn on_document_error(&self, index: usize, _total: usize, name: &str, _error: String) {
        self.events.lock().unwrap().push(format!("err {index} {name}"));
    }
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn row(reference: &str, amount: &str) -> String {
    format!(
        "{reference}\tNombre {reference}\tES00 0000 0000\t{amount}\t01/01/2025\tEmisorX\tID123\tFileRef\t10/10/2025\t09/10/2025\tDoc{reference}"
    )
}

/// Create `<dir>/my_pdfs/<name>.pdf` whose text carries the `[[name]]` marker.
fn input_dir_with(names: &[&str]) -> (tempfile::TempDir, PathBuf) {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("my_pdfs");
    std::fs::create_dir(&input).unwrap();
    for name in names {
        std::fs::write(
            input.join(format!("{name}.pdf")),
            format!("Remesa [[{name}]]\nIBAN: ES00 0000 0000\nImporte: 123.45"),
        )
        .unwrap();
    }
    (root, input)
}

fn pipeline(config: ExtractionConfig, oracle: ScriptedOracle) -> (Pipeline, Arc<ScriptedOracle>) {
    let oracle = Arc::new(oracle);
    let p = Pipeline::new(config, Arc::new(FileTextExtractor), oracle.clone());
    (p, oracle)
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn inline_fenced_reply_yields_one_record() {
    let (_root, input) = input_dir_with(&["a"]);
    let reply = format!("```{}```", row("REF1", "123.45"));
    let (p, _) = pipeline(ExtractionConfig::default(), ScriptedOracle::default().reply("a", &reply));

    let out = p.run(&input).await.unwrap();
    assert_eq!(out.stats.succeeded, 1);
    assert_eq!(out.reports[0].records, 1);

    let artifact = out.reports[0].artifact.clone().unwrap();
    assert_eq!(artifact.path, input.join("output").join("a.tsv"));
    let doc = read_artifact(&artifact, Schema::remittance(), "NULL").unwrap();
    assert_eq!(doc.source, "a.pdf");
    assert_eq!(
        doc.records[0].get("importe").and_then(|v| v.as_amount()).map(|a| a.as_str()),
        Some("123.45")
    );

    let merged = out.merge.unwrap();
    assert_eq!(merged.output_path, input.join("output").join("todos_los_documentos.tsv"));
    assert_eq!(merged.total_records, 1);
}

#[tokio::test]
async fn empty_reply_fails_only_that_document() {
    let (_root, input) = input_dir_with(&["a", "b"]);
    let oracle = ScriptedOracle::default()
        .reply("a", "")
        .reply("b", &row("REF2", "10.00"));
    let (p, _) = pipeline(ExtractionConfig::default(), oracle);

    let out = p.run(&input).await.unwrap();
    let a = &out.reports[0];
    assert_eq!(a.state, DocumentState::Failed);
    assert_eq!(a.failed_at, Some(DocumentState::Structured));
    assert_eq!(a.error.as_ref().map(|e| e.kind()), Some(ErrorKind::EmptyResponse));
    assert!(!input.join("output").join("a.tsv").exists());

    assert_eq!(out.reports[1].state, DocumentState::Persisted);
    let merged = out.merge.unwrap();
    assert_eq!(merged.expected, 1);
    let lines = read_lines(&merged.output_path);
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with("\tb.pdf"));
}

#[tokio::test]
async fn two_and_three_rows_merge_with_one_header() {
    let (_root, input) = input_dir_with(&["a", "b"]);
    let oracle = ScriptedOracle::default()
        .reply("a", &format!("{}\n{}", row("A1", "1.00"), row("A2", "2.00")))
        .reply(
            "b",
            &format!("{}\n{}\n{}", row("B1", "3.00"), row("B2", "4.00"), row("B3", "5.00")),
        );
    let (p, _) = pipeline(ExtractionConfig::default(), oracle);

    let out = p.run(&input).await.unwrap();
    assert_eq!(out.reports[0].records, 2);
    assert_eq!(out.reports[1].records, 3);
    let merged = out.merge.unwrap();
    assert_eq!(merged.total_records, 5);

    let lines = read_lines(&merged.output_path);
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], Schema::remittance().header_line());
    assert_eq!(count_header_lines(&merged.output_path, Schema::remittance()).unwrap(), 1);
    let refs: Vec<&str> = lines[1..]
        .iter()
        .map(|l| l.split('\t').next().unwrap())
        .collect();
    assert_eq!(refs, vec!["A1", "A2", "B1", "B2", "B3"]);
    assert!(lines[1].ends_with("\ta.pdf"));
    assert!(lines[5].ends_with("\tb.pdf"));
}

#[tokio::test]
async fn json_reply_with_missing_key_persists_null() {
    let (_root, input) = input_dir_with(&["a"]);
    let reply = r#"```json
{"referencia_unica": "REF1", "nombre_librado": "Nombre Uno", "importe": "123.45",
 "vencimiento": "01/01/2025", "emisor": "EmisorX", "identificacion_emisor": "ID123",
 "referencia_fichero": "FileRef", "fecha_recepcion": "10/10/2025",
 "fecha_documento": "09/10/2025", "referencia_documento": "DocRef1"}
```"#;
    let config = ExtractionConfig::builder()
        .shape(OutputShape::Json)
        .build()
        .unwrap();
    let (p, _) = pipeline(config, ScriptedOracle::default().reply("a", reply));

    let out = p.run(&input).await.unwrap();
    let artifact = out.reports[0].artifact.clone().unwrap();
    let doc = read_artifact(&artifact, Schema::remittance(), "NULL").unwrap();
    assert_eq!(doc.records[0].get("iban"), Some(&FieldValue::Null));

    let lines = read_lines(&artifact.path);
    let cells: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(cells.len(), 12);
    assert_eq!(cells[2], "NULL");
}

#[tokio::test]
async fn failure_kinds_are_reported_per_document() {
    let (_root, input) = input_dir_with(&["b_oracle", "c_malformed", "d_mismatch", "e_ok"]);
    std::fs::write(input.join("a_blank.pdf"), "   \n").unwrap();

    let oracle = ScriptedOracle::default()
        .fail("b_oracle", OracleError::Timeout(5))
        .reply("c_malformed", "{ not json")
        .reply("d_mismatch", "only\ttwo columns")
        .reply("e_ok", &row("E1", "5.00"));
    let config = ExtractionConfig::default();
    let (p, oracle) = pipeline(config, oracle);

    let out = p.run(&input).await.unwrap();
    let kinds: Vec<Option<ErrorKind>> = out
        .reports
        .iter()
        .map(|r| r.error.as_ref().map(|e| e.kind()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            Some(ErrorKind::NoExtractableText),
            Some(ErrorKind::OracleFailure),
            Some(ErrorKind::SchemaMismatch),
            Some(ErrorKind::SchemaMismatch),
            None,
        ]
    );
    // Blank document never reaches the oracle.
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 4);

    let mismatch = out.reports[3].error.as_ref().unwrap();
    assert_eq!(mismatch.raw_response(), Some("only\ttwo columns"));
    assert_eq!(out.stats.succeeded, 1);
    assert_eq!(out.stats.failed, 4);
    assert_eq!(out.merge.unwrap().total_records, 1);
}

#[tokio::test]
async fn malformed_json_keeps_raw_reply() {
    let (_root, input) = input_dir_with(&["a"]);
    let config = ExtractionConfig::builder()
        .shape(OutputShape::Json)
        .build()
        .unwrap();
    let (p, _) = pipeline(config, ScriptedOracle::default().reply("a", "Sorry, I can't."));

    let out = p.run(&input).await.unwrap();
    let err = out.reports[0].error.as_ref().unwrap();
    assert_eq!(err.kind(), ErrorKind::MalformedStructure);
    assert_eq!(err.raw_response(), Some("Sorry, I can't."));
    assert!(out.merge.is_none());
}

#[tokio::test]
async fn headerless_outputs_lose_no_rows() {
    let (_root, input) = input_dir_with(&["a", "b"]);
    let oracle = ScriptedOracle::default()
        .reply("a", &row("A1", "1.00"))
        .reply("b", &row("B1", "2.00"));
    let config = ExtractionConfig::builder()
        .write_individual_headers(false)
        .build()
        .unwrap();
    let (p, _) = pipeline(config, oracle);

    let out = p.run(&input).await.unwrap();
    let a = out.reports[0].artifact.clone().unwrap();
    assert!(!a.has_header);
    assert_eq!(read_lines(&a.path).len(), 1);

    let merged = out.merge.unwrap();
    let lines = read_lines(&merged.output_path);
    assert_eq!(lines.len(), 3);
    assert_eq!(count_header_lines(&merged.output_path, Schema::remittance()).unwrap(), 1);
    assert!(lines[1].starts_with("A1\t"));
    assert!(lines[2].starts_with("B1\t"));
}

#[tokio::test]
async fn rerun_produces_identical_dataset() {
    let (_root, input) = input_dir_with(&["a", "b"]);
    let oracle = ScriptedOracle::default()
        .reply("a", &row("A1", "1.00"))
        .reply("b", &row("B1", "2.00"));
    let (p, _) = pipeline(ExtractionConfig::default(), oracle);

    let first = p.run(&input).await.unwrap().merge.unwrap();
    let bytes = std::fs::read(&first.output_path).unwrap();
    let second = p.run(&input).await.unwrap().merge.unwrap();
    assert_eq!(std::fs::read(&second.output_path).unwrap(), bytes);
    assert_eq!(count_header_lines(&second.output_path, Schema::remittance()).unwrap(), 1);
}

#[tokio::test]
async fn concurrent_batch_keeps_processing_order() {
    let (_root, input) = input_dir_with(&["a", "b", "c"]);
    let oracle = ScriptedOracle::default()
        .slow_reply("a", &row("A1", "1.00"), 150)
        .slow_reply("b", &row("B1", "2.00"), 50)
        .reply("c", &row("C1", "3.00"));
    let config = ExtractionConfig::builder().concurrency(3).build().unwrap();
    let (p, _) = pipeline(config, oracle);

    let out = p.run(&input).await.unwrap();
    let names: Vec<&str> = out.reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    let indices: Vec<usize> = out.reports.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);

    let lines = read_lines(&out.merge.unwrap().output_path);
    let refs: Vec<&str> = lines[1..]
        .iter()
        .map(|l| l.split('\t').next().unwrap())
        .collect();
    assert_eq!(refs, vec!["A1", "B1", "C1"]);
}

#[tokio::test]
async fn progress_events_follow_the_batch() {
    let (_root, input) = input_dir_with(&["a", "b"]);
    let oracle = ScriptedOracle::default()
        .reply("a", &row("A1", "1.00"))
        .reply("b", "");
    let cb = Arc::new(RecordingCallback::default());
    let config = ExtractionConfig::builder()
        .progress_callback(cb.clone() as Arc<dyn BatchProgressCallback>)
        .build()
        .unwrap();
    let (p, _) = pipeline(config, oracle);

    p.run(&input).await.unwrap();
    let events = cb.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec!["start 2", "ok 1 a.pdf 1", "err 2 b.pdf", "done 1/2"]
    );
}

#[tokio::test]
async fn custom_output_dir_and_merged_name() {
    let (root, input) = input_dir_with(&["a"]);
    let out_dir = root.path().join("datos");
    let config = ExtractionConfig::builder()
        .output_dir(&out_dir)
        .merged_file_name("all.tsv")
        .build()
        .unwrap();
    let (p, _) = pipeline(config, ScriptedOracle::default().reply("a", &row("A1", "1.00")));

    let out = p.run(&input).await.unwrap();
    assert_eq!(out.merge.unwrap().output_path, out_dir.join("all.tsv"));
    assert!(out_dir.join("a.tsv").exists());
    assert!(out_dir.join("a.manifest.json").exists());
}

#[tokio::test]
async fn merge_directory_rebuilds_same_dataset() {
    let (_root, input) = input_dir_with(&["a", "b"]);
    let oracle = ScriptedOracle::default()
        .reply("a", &row("A1", "1.00"))
        .reply("b", &row("B1", "2.00"));
    let config = ExtractionConfig::builder()
        .write_individual_headers(false)
        .build()
        .unwrap();
    let (p, _) = pipeline(config.clone(), oracle);

    let merged = p.run(&input).await.unwrap().merge.unwrap();
    let bytes = std::fs::read(&merged.output_path).unwrap();
    std::fs::remove_file(&merged.output_path).unwrap();

    let rebuilt = merge_directory(&input.join("output"), &config).unwrap();
    assert_eq!(rebuilt.merged, 2);
    assert_eq!(std::fs::read(&rebuilt.output_path).unwrap(), bytes);
}

#[tokio::test]
async fn stream_yields_reports_in_order() {
    let (_root, input) = input_dir_with(&["a", "b"]);
    let oracle = ScriptedOracle::default()
        .slow_reply("a", &row("A1", "1.00"), 100)
        .reply("b", &row("B1", "2.00"));
    let config = ExtractionConfig::builder().concurrency(2).build().unwrap();
    let (p, _) = pipeline(config, oracle);

    let paths = vec![input.join("a.pdf"), input.join("b.pdf")];
    let reports: Vec<_> = process_stream(Arc::new(p), paths, input.join("output"))
        .collect()
        .await;
    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    assert!(reports.iter().all(|r| r.succeeded()));
}

#[tokio::test]
async fn empty_and_missing_input_folders_are_fatal() {
    let root = tempfile::tempdir().unwrap();
    let (p, _) = pipeline(ExtractionConfig::default(), ScriptedOracle::default());

    let err = p.run(root.path()).await.unwrap_err();
    assert!(matches!(err, Pdf2TsvError::NoDocuments { .. }));

    let err = p.run(&root.path().join("nope")).await.unwrap_err();
    assert!(matches!(err, Pdf2TsvError::InputDirNotFound { .. }));
}

#[tokio::test]
async fn document_named_like_dataset_is_rejected() {
    let (_root, input) = input_dir_with(&["todos_los_documentos"]);
    let (p, _) = pipeline(
        ExtractionConfig::default(),
        ScriptedOracle::default().reply("todos_los_documentos", &row("A1", "1.00")),
    );

    let out = p.run(&input).await.unwrap();
    assert_eq!(
        out.reports[0].error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::PersistError)
    );
    assert!(out.merge.is_none());
}

#[tokio::test]
async fn names_differing_in_extension_case_do_not_share_an_artifact() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("my_pdfs");
    std::fs::create_dir(&input).unwrap();
    std::fs::write(input.join("x.PDF"), "Remesa [[up]]").unwrap();
    std::fs::write(input.join("x.pdf"), "Remesa [[low]]").unwrap();
    let oracle = ScriptedOracle::default()
        .reply("up", &row("UP", "1.00"))
        .reply("low", &row("LOW", "2.00"));
    let (p, _) = pipeline(ExtractionConfig::default(), oracle);

    let out = p.run(&input).await.unwrap();
    assert_eq!(out.reports[0].name, "x.PDF");
    assert_eq!(out.reports[0].state, DocumentState::Persisted);
    assert_eq!(out.reports[1].name, "x.pdf");
    assert_eq!(
        out.reports[1].error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::PersistError)
    );
    assert!(out.reports[1].artifact.is_none());

    let merged = out.merge.unwrap();
    assert!(merged.is_complete());
    assert_eq!(merged.total_records, 1);
    let lines = read_lines(&merged.output_path);
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("UP\t"));
    assert!(lines[1].ends_with("\tx.PDF"));
}
