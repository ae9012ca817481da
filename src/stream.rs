//! Streaming batch API: emit document reports as documents finish.
//!
//! [`crate::batch::Pipeline::run`] returns only after every document is
//! terminal and the dataset is merged. [`process_stream`] instead yields
//! each [`DocumentReport`] as soon as it (and every document before it) is
//! done, so callers can show results or react to failures early. Reports
//! arrive in processing order.
//!
//! The stream never merges; call [`crate::pipeline::merge::merge_artifacts`]
//! on the collected artifacts, or [`crate::batch::merge_directory`], once
//! it is exhausted.

use crate::batch::Pipeline;
use crate::output::DocumentReport;
use crate::pipeline::input::claim_stems;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// A boxed stream of document reports.
pub type ReportStream = Pin<Box<dyn Stream<Item = DocumentReport> + Send>>;

/// Process `paths` with up to `concurrency` documents in flight.
pub fn process_stream(
    pipeline: Arc<Pipeline>,
    paths: Vec<PathBuf>,
    output_dir: PathBuf,
) -> ReportStream {
    let total = paths.len();
    let concurrency = pipeline.config.concurrency.max(1);
    let output_dir = Arc::new(output_dir);
    let claims = claim_stems(&paths);

    let s = stream::iter(paths.into_iter().zip(claims).enumerate().map(move |(i, (path, claim))| {
        let pipeline = Arc::clone(&pipeline);
        let output_dir = Arc::clone(&output_dir);
        async move {
            pipeline
                .process_claimed(i + 1, total, &path, &output_dir, &claim)
                .await
        }
    }))
    .buffered(concurrency);

    Box::pin(s)
}
