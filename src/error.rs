//! Error types for the rmtree library.
//!
//! Three distinct error types reflect three distinct failure scopes:
//!
//! * [`RmTreeError`] — **Fatal**: the run cannot proceed at all (source
//!   folder missing, destination root not writable, no PDF engine). Returned
//!   as `Err(RmTreeError)` from the top-level `convert*` functions.
//!
//! * [`RenderError`] — **Page-scoped**: the external stroke renderer failed
//!   on one page. The page becomes a placeholder and the document carries on.
//!
//! * [`BackendError`] — **Document-scoped**: PDF composition or the output
//!   write failed for one document. That document ends `Failed`; its siblings
//!   are unaffected.
//!
//! Everything that is not fatal ends up as an [`crate::report::Issue`] in the
//! run's [`crate::report::IssueReport`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the rmtree library.
#[derive(Debug, Error)]
pub enum RmTreeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source folder does not exist.
    #[error("Source folder not found: '{path}'\nPoint rmtree at the tablet's xochitl folder.")]
    SourceNotFound { path: PathBuf },

    /// The source path exists but is not a directory.
    #[error("Source '{path}' is not a directory")]
    SourceNotADirectory { path: PathBuf },

    /// The source folder could not be listed.
    #[error("Failed to read source folder '{path}': {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The destination root could not be created or written.
    #[error("Cannot write to destination '{path}': {source}")]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// The stroke renderer could not be set up.
    #[error("Stroke renderer unavailable: {0}")]
    RendererUnavailable(String),

    /// The PDF backend could not be set up.
    #[error(
        "PDF backend unavailable: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    BackendUnavailable(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure of the external stroke renderer on a single page.
///
/// Whatever the renderer reports is translated into one of these variants at
/// the adapter boundary (see [`crate::pipeline::render`]).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The stroke file contains a block the renderer does not understand.
    #[error("unknown block type: {detail}")]
    UnknownBlock { detail: String },

    /// The renderer tripped over an unexpected structure.
    #[error("renderer assertion failed: {detail}")]
    Assertion { detail: String },

    /// The renderer could not be run at all.
    #[error("renderer unavailable: {detail}")]
    Unavailable { detail: String },

    /// The stroke file could not be read.
    #[error("cannot read stroke file: {detail}")]
    Io { detail: String },

    /// Any other renderer failure, including output that is not an SVG.
    #[error("render failed: {detail}")]
    Other { detail: String },
}

/// A failure while composing or writing one document's PDF.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An SVG page could not be converted to PDF.
    #[error("SVG conversion failed on page {page}: {detail}")]
    Svg { page: usize, detail: String },

    /// A PDF input (background or template) could not be opened.
    #[error("Cannot open PDF '{path}': {detail}")]
    Open { path: PathBuf, detail: String },

    /// Page overlay or concatenation failed.
    #[error("PDF composition failed: {0}")]
    Compose(String),

    /// The composed PDF could not be written to its final location.
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
