//! Progress-callback trait for per-document conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the tree. The CLI uses it to drive
//! its progress bar; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use rmtree::{ConversionConfig, ConversionProgressCallback, DocumentOutcome};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, outcome: &DocumentOutcome) {
//!         let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {} ({})", outcome.name, outcome.state);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{DocumentOutcome, RunSummary};
use std::sync::Arc;

/// Called by the conversion pipeline as it processes each document.
///
/// Documents are processed concurrently, so every method except the two
/// `on_conversion_*` ones may be called from several threads at once.
/// All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, before any document starts.
    ///
    /// # Arguments
    /// * `total_documents` — documents that will be visited (trash excluded when skipped)
    fn on_conversion_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document starts rendering.
    fn on_document_start(&self, uuid: &str, name: &str, total_pages: usize) {
        let _ = (uuid, name, total_pages);
    }

    /// Called when the stroke renderer fails on a page.
    ///
    /// # Arguments
    /// * `page_num` — 1-indexed page number
    fn on_page_error(&self, uuid: &str, page_num: usize, error: &str) {
        let _ = (uuid, page_num, error);
    }

    /// Called once per document with its terminal state.
    fn on_document_complete(&self, outcome: &DocumentOutcome) {
        let _ = outcome;
    }

    /// Called once after every document reached a terminal state.
    fn on_conversion_complete(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
