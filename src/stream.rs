//! Streaming conversion API: emit documents as they finish.
//!
//! Unlike the eager [`crate::convert::convert`], which returns only after
//! every document reached a terminal state, [`convert_stream`] yields each
//! [`DocumentRun`] as soon as its PDF is written (or the document is
//! skipped or failed). Documents run concurrently, so runs arrive in
//! completion order; sort by `outcome.output` if order matters.
//!
//! Every item carries the issues its document raised. Issues raised before
//! any document started (scan and folder mirroring) are held on the
//! returned [`ConversionStream`]; [`ConversionStream::finish`] drains the
//! rest of the stream and merges everything into one [`ConversionOutput`].

use crate::config::{CancellationFlag, ConversionConfig};
use crate::convert::{collect_runs, mirror_folders, prepare, Prepared};
use crate::error::RmTreeError;
use crate::output::ConversionOutput;
use crate::pipeline::assemble::DocumentRun;
use crate::report::IssueReport;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-document runs.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocumentRun> + Send>>;

/// A conversion in progress.
pub struct ConversionStream {
    /// Issues raised before the first document: scan and folder mirroring.
    pub issues: IssueReport,
    /// Folders mirrored under the destination root.
    pub folders: usize,
    /// One item per document visited.
    pub documents: DocumentStream,
    cancellation: Option<CancellationFlag>,
    started: Instant,
}

impl ConversionStream {
    /// Drain the remaining documents and merge every issue into one output.
    pub async fn finish(self) -> ConversionOutput {
        let runs: Vec<DocumentRun> = self.documents.collect().await;
        let mut output = collect_runs(runs, self.issues);
        output.summary.folders = self.folders;
        output.summary.cancelled = self
            .cancellation
            .as_ref()
            .is_some_and(CancellationFlag::is_cancelled);
        output.summary.duration_ms = self.started.elapsed().as_millis() as u64;
        output
    }
}

/// Convert `source` into `dest`, streaming runs as documents finish.
///
/// Folders are created before the stream is returned. Document work starts
/// when the stream is first polled.
///
/// # Returns
/// - `Ok(ConversionStream)`: up-front issues plus one item per document
/// - `Err(RmTreeError)`: fatal error (source missing, destination not
///   writable, renderer or backend unavailable)
pub async fn convert_stream(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStream, RmTreeError> {
    let started = Instant::now();
    let Prepared {
        assembler,
        documents,
        scan_issues: mut issues,
    } = prepare(source.as_ref(), dest.as_ref(), config).await?;

    let folders = mirror_folders(&assembler, &mut issues).await?;
    info!(
        "Streaming {} documents ({} folders ready, {} issues so far)",
        documents.len(),
        folders,
        issues.len()
    );

    let concurrency = config.concurrency.max(1);
    let cb = config.progress_callback.clone();
    if let Some(ref cb) = cb {
        cb.on_conversion_start(documents.len());
    }

    let s = stream::iter(documents)
        .map(move |uuid| {
            let assembler = Arc::clone(&assembler);
            let cb = cb.clone();
            async move {
                let run = assembler.convert_document(&uuid).await;
                if let Some(ref cb) = cb {
                    cb.on_document_complete(&run.outcome);
                }
                run
            }
        })
        .buffer_unordered(concurrency);

    Ok(ConversionStream {
        issues,
        folders,
        documents: Box::pin(s),
        cancellation: config.cancellation.clone(),
        started,
    })
}
