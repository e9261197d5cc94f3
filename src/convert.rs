//! Eager (whole-tree) conversion entry points.
//!
//! [`convert`] waits until every document reached a terminal state and
//! returns the full [`ConversionOutput`]. Use [`crate::stream::convert_stream`]
//! instead to receive each [`crate::output::DocumentOutcome`] as it finishes.

use crate::config::ConversionConfig;
use crate::error::RmTreeError;
use crate::output::{CompatibilityReport, ConversionOutput, RunSummary};
use crate::pipeline::assemble::{Assembler, DocumentRun};
use crate::pipeline::background::{self, TemplateTable};
use crate::pipeline::pdf::PdfBackend;
use crate::pipeline::render::{RmcRenderer, StrokeRenderer};
use crate::pipeline::{compat, index};
use crate::report::IssueReport;
use crate::tree::Tree;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert the `xochitl` folder `source` into a PDF tree under `dest`.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ConversionOutput)` once every document reached a terminal state,
/// even if some of them failed (see `output.summary.exit_code()`).
///
/// # Errors
/// Returns `Err(RmTreeError)` only for fatal errors:
/// - source folder missing or unreadable
/// - destination root not writable
/// - renderer or PDF backend unavailable
pub async fn convert(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, RmTreeError> {
    let total_start = Instant::now();
    let prepared = prepare(source.as_ref(), dest.as_ref(), config).await?;
    let Prepared {
        assembler,
        documents,
        mut scan_issues,
    } = prepared;

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(documents.len());
    }

    // ── Step 1: mirror the folder hierarchy ──────────────────────────────
    let folders = mirror_folders(&assembler, &mut scan_issues).await?;
    debug!("{folders} folders ready");

    // ── Step 2: documents, `concurrency` at a time ───────────────────────
    let runs: Vec<DocumentRun> = stream::iter(documents.into_iter().map(|uuid| {
        let assembler = Arc::clone(&assembler);
        let cb = config.progress_callback.clone();
        async move {
            let run = assembler.convert_document(&uuid).await;
            if let Some(ref cb) = cb {
                cb.on_document_complete(&run.outcome);
            }
            run
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    // ── Step 3: merge per-document reports ───────────────────────────────
    let mut output = collect_runs(runs, scan_issues);
    output.summary.folders = folders;
    output.summary.cancelled = config.is_cancelled();
    output.summary.duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion complete: {} documents ({} assembled, {} partial, {} skipped, {} failed), {} issues, {}ms",
        output.summary.documents,
        output.summary.assembled,
        output.summary.partially_assembled,
        output.summary.skipped,
        output.summary.failed,
        output.issues.len(),
        output.summary.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(&output.summary);
    }

    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, RmTreeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RmTreeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(source, dest, config))
}

/// Dry run: scan and check every document, write nothing.
///
/// Needs neither the renderer nor the PDF backend.
pub async fn check_compatibility(
    source: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<CompatibilityReport, RmTreeError> {
    let (tree, scan_issues) = scan_tree(source.as_ref()).await?;
    let mut report = compat::check_tree(&tree, config);

    let mut issues = scan_issues;
    issues.merge(report.issues);
    issues.sort();
    report.issues = issues;

    info!(
        "Compatibility check: {} documents, {} issues ({} errors)",
        report.documents.len(),
        report.issues.len(),
        report.issues.errors().count()
    );
    Ok(report)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Everything a run needs before the first document starts.
pub(crate) struct Prepared {
    pub assembler: Arc<Assembler>,
    pub documents: Vec<String>,
    pub scan_issues: IssueReport,
}

pub(crate) async fn prepare(
    source: &Path,
    dest: &Path,
    config: &ConversionConfig,
) -> Result<Prepared, RmTreeError> {
    info!("Converting {} → {}", source.display(), dest.display());

    // ── Scan ─────────────────────────────────────────────────────────────
    let (tree, scan_issues) = scan_tree(source).await?;

    // ── Destination root ─────────────────────────────────────────────────
    ensure_writable(dest)?;

    // ── Collaborators ────────────────────────────────────────────────────
    let templates = load_templates(config)?;
    let renderer = resolve_renderer(config)?;
    let backend = resolve_backend(config).await?;
    debug!(
        "renderer: {}, backend: {}, {} templates",
        renderer.name(),
        backend.name(),
        templates.len()
    );

    let assembler = Arc::new(Assembler::new(
        Arc::new(tree),
        Arc::new(templates),
        renderer,
        backend,
        dest,
        config.clone(),
    ));
    let documents = assembler.documents_to_convert();
    info!("{} documents to convert", documents.len());

    Ok(Prepared {
        assembler,
        documents,
        scan_issues,
    })
}

/// Scan on the blocking pool.
pub(crate) async fn scan_tree(source: &Path) -> Result<(Tree, IssueReport), RmTreeError> {
    let source = source.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut report = IssueReport::new();
        index::scan(&source, &mut report).map(|tree| (tree, report))
    })
    .await
    .map_err(|e| RmTreeError::Internal(format!("Scan task panicked: {e}")))?
}

/// Merge document runs into the final output, ordered by output path.
pub(crate) fn collect_runs(mut runs: Vec<DocumentRun>, scan_issues: IssueReport) -> ConversionOutput {
    runs.sort_by(|a, b| a.outcome.output.cmp(&b.outcome.output));

    let mut issues = scan_issues;
    let mut summary = RunSummary::default();
    let mut documents = Vec::with_capacity(runs.len());
    for run in runs {
        summary.record(&run.outcome);
        issues.merge(run.issues);
        documents.push(run.outcome);
    }
    issues.sort();

    ConversionOutput {
        documents,
        issues,
        summary,
    }
}

/// Create every mirrored folder on the blocking pool, recording failures.
pub(crate) async fn mirror_folders(
    assembler: &Arc<Assembler>,
    issues: &mut IssueReport,
) -> Result<usize, RmTreeError> {
    let assembler = Arc::clone(assembler);
    let (folders, folder_issues) = tokio::task::spawn_blocking(move || assembler.create_folders())
        .await
        .map_err(|e| RmTreeError::Internal(format!("Folder task panicked: {e}")))?;
    issues.merge(folder_issues);
    Ok(folders)
}

/// Create the destination root and prove it accepts new files.
fn ensure_writable(dest: &Path) -> Result<(), RmTreeError> {
    let unwritable = |source| RmTreeError::DestinationUnwritable {
        path: dest.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dest).map_err(unwritable)?;
    tempfile::tempfile_in(dest).map_err(unwritable)?;
    Ok(())
}

/// Resolve the template table, from most-specific to least-specific.
///
/// 1. **Configured folder** (`config.templates_dir`); unreadable is fatal.
/// 2. **Default folder**: `RMTREE_TEMPLATES`, then `templates/` beside the
///    executable; unreadable falls back to the bundled table.
/// 3. **Bundled** stock templates.
fn load_templates(config: &ConversionConfig) -> Result<TemplateTable, RmTreeError> {
    if let Some(dir) = &config.templates_dir {
        return TemplateTable::load(dir).map_err(|e| {
            RmTreeError::InvalidConfig(format!(
                "Cannot read templates folder '{}': {e}",
                dir.display()
            ))
        });
    }

    if let Some(dir) = background::default_templates_dir() {
        match TemplateTable::load(&dir) {
            Ok(table) => return Ok(table),
            Err(e) => warn!(
                "Ignoring templates folder '{}': {e}; using bundled templates",
                dir.display()
            ),
        }
    }

    let table = TemplateTable::bundled();
    debug!("No templates folder; {} bundled template names", table.len());
    Ok(table)
}

/// Resolve the stroke renderer, from most-specific to least-specific.
///
/// 1. **Pre-built renderer** (`config.renderer`), used as-is.
/// 2. **Explicit program** (`config.rmc_path`).
/// 3. **Lookup** through `RMC_PATH`, then `PATH`.
pub fn resolve_renderer(config: &ConversionConfig) -> Result<Arc<dyn StrokeRenderer>, RmTreeError> {
    if let Some(ref renderer) = config.renderer {
        return Ok(Arc::clone(renderer));
    }

    if let Some(ref program) = config.rmc_path {
        if !program.is_file() {
            return Err(RmTreeError::RendererUnavailable(format!(
                "'{}' does not exist",
                program.display()
            )));
        }
        return Ok(Arc::new(RmcRenderer::with_program(program)));
    }

    RmcRenderer::locate()
        .map(|r| Arc::new(r) as Arc<dyn StrokeRenderer>)
        .map_err(|e| RmTreeError::RendererUnavailable(e.to_string()))
}

/// Resolve the PDF backend: `config.pdf_backend`, else pdfium.
pub async fn resolve_backend(config: &ConversionConfig) -> Result<Arc<dyn PdfBackend>, RmTreeError> {
    if let Some(ref backend) = config.pdf_backend {
        return Ok(Arc::clone(backend));
    }

    default_backend().await
}

#[cfg(feature = "pdfium")]
async fn default_backend() -> Result<Arc<dyn PdfBackend>, RmTreeError> {
    // Binding may download the library on first use.
    let backend = tokio::task::spawn_blocking(crate::pipeline::pdf::PdfiumBackend::new)
        .await
        .map_err(|e| RmTreeError::Internal(format!("Backend task panicked: {e}")))??;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "pdfium"))]
async fn default_backend() -> Result<Arc<dyn PdfBackend>, RmTreeError> {
    Err(RmTreeError::BackendUnavailable(
        "built without the `pdfium` feature; configure a PdfBackend".into(),
    ))
}
