//! # rmtree
//!
//! Rebuild a reMarkable tablet's raw `xochitl` storage folder as an ordinary
//! folder tree of PDF files.
//!
//! ## Why this crate?
//!
//! The tablet stores every notebook as a flat heap of UUID-named files:
//! JSON sidecars for names and parents, one binary `.rm` stroke file per
//! page, optional template names and an optional background PDF. None of it
//! is readable without the device. This crate walks that heap, rebuilds the
//! user-visible folder hierarchy, and writes one PDF per document with the
//! handwriting drawn over its template or original PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! xochitl/
//!  │
//!  ├─ 1. Scan     sidecars → Tree (names, parents, pages), repair links
//!  ├─ 2. Check    per-document verdict: skip / fail / page plan
//!  ├─ 3. Render   .rm → SVG via rmc (spawn_blocking, bounded per document)
//!  ├─ 4. Layer    template or document-PDF backgrounds, overlay geometry
//!  ├─ 5. Compose  svg2pdf + pdfium, pages in declared order
//!  └─ 6. Write    atomic write under the mirrored folder path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rmtree::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // rmc is looked up through RMC_PATH, then PATH.
//!     let config = ConversionConfig::builder()
//!         .templates_dir("/usr/share/remarkable/templates")
//!         .build()?;
//!     let output = convert("xochitl", "notes", &config).await?;
//!     eprintln!(
//!         "{} assembled, {} skipped, {} failed, {} issues",
//!         output.summary.assembled,
//!         output.summary.skipped,
//!         output.summary.failed,
//!         output.issues.len()
//!     );
//!     std::process::exit(output.summary.exit_code());
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `rmtree` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `pdfium` | on      | Production [`PdfBackend`]: svg2pdf + pdfium (auto-downloaded) |
//!
//! Disable both to embed the pipeline with your own [`PdfBackend`]:
//! ```toml
//! rmtree = { version = "0.3", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Tool | Located by | Needed for |
//! |------|------------|------------|
//! | `rmc` | `RMC_PATH`, `PATH`, or `--rmc` | stroke pages (`convert` only) |
//! | libpdfium | `PDFIUM_LIB_PATH`, cache, or download | composition (`convert` only) |
//!
//! [`check_compatibility`] needs neither.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod stream;
pub mod tree;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CancellationFlag, ConversionConfig, ConversionConfigBuilder};
pub use convert::{check_compatibility, convert, convert_sync};
pub use error::{BackendError, RenderError, RmTreeError};
pub use output::{
    CheckStatus, CheckedDocument, CompatibilityReport, ConversionOutput, DocumentOutcome,
    DocumentState, RunSummary,
};
pub use pipeline::assemble::DocumentRun;
pub use pipeline::index::scan;
#[cfg(feature = "pdfium")]
pub use pipeline::pdf::PdfiumBackend;
pub use pipeline::pdf::{DocumentPlan, PageContent, PdfBackend, PlannedPage};
pub use pipeline::render::{RenderedPage, RmcRenderer, StrokeRenderer};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::{Issue, IssueKind, IssueReport, Severity};
pub use stream::{convert_stream, ConversionStream, DocumentStream};
pub use tree::{Document, Entry, EntryBody, Page, Tree};
