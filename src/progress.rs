//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline takes each document to a terminal state. The CLI
//! uses this to print one pass/fail line per document.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2tsv::{BatchProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, name: &str, records: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {} ({} records)", index, total, name, records);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch runner as it processes each document.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the
/// per-document hooks may fire from several tasks at once. All methods
/// default to no-ops.
///
/// `index` is 1-based processing order.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first document starts.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before text extraction for a document begins.
    fn on_document_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a document reaches `Persisted`.
    fn on_document_complete(&self, index: usize, total: usize, name: &str, records: usize) {
        let _ = (index, total, name, records);
    }

    /// Called when a document reaches `Failed`.
    ///
    /// `error` is owned so implementations can move it into spawned tasks.
    fn on_document_error(&self, index: usize, total: usize, name: &str, error: String) {
        let _ = (index, total, name, error);
    }

    /// Called once after every document reached a terminal state.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
