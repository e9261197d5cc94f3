//! Configuration types for a tree conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The external collaborators (stroke
//! renderer, PDF backend, progress sink) are injected here too; when left
//! unset they are resolved lazily at the start of a run.

use crate::error::RmTreeError;
use crate::pipeline::pdf::PdfBackend;
use crate::pipeline::render::StrokeRenderer;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration for converting one `xochitl` folder.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use rmtree::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .concurrency(4)
///     .include_trash(false)
///     .templates_dir("/usr/share/remarkable/templates")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Treat structural deviations as warnings and convert best-effort. Default: false.
    ///
    /// Covers document-level checks only: malformed `.content`, `pageCount`
    /// mismatch, deleted pages with leftover strokes, duplicate page ids,
    /// unrecognised `.rm` headers and `redir` problems. Broken metadata and
    /// parent links are always repaired and reported regardless.
    pub ignore_assertions: bool,

    /// Keep pages in stroke formats other than v6 as placeholders instead of dropping them. Default: false.
    pub include_incompatible: bool,

    /// Convert documents in the trash (under `_trash/`). Default: true.
    pub include_trash: bool,

    /// Documents processed at the same time. Default: 4.
    pub concurrency: usize,

    /// Pages of one document rendered at the same time. Default: 4.
    pub page_concurrency: usize,

    /// Folder with template PDFs (and optionally `templates.json`), layered
    /// over the bundled stock templates. If None, `RMTREE_TEMPLATES` or a
    /// `templates/` folder beside the executable is used when present.
    pub templates_dir: Option<PathBuf>,

    /// Also write each rendered page as `<name>.<page>.svg`. Default: false.
    pub keep_svg: bool,

    /// Explicit `rmc` executable. Ignored when `renderer` is set.
    pub rmc_path: Option<PathBuf>,

    /// Pre-constructed stroke renderer. Takes precedence over `rmc_path`.
    pub renderer: Option<Arc<dyn StrokeRenderer>>,

    /// Pre-constructed PDF backend. If None, pdfium is bound on first use.
    pub pdf_backend: Option<Arc<dyn PdfBackend>>,

    /// Optional per-document progress sink.
    pub progress_callback: Option<ProgressCallback>,

    /// Set to stop starting new documents.
    pub cancellation: Option<CancellationFlag>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            ignore_assertions: false,
            include_incompatible: false,
            include_trash: true,
            concurrency: 4,
            page_concurrency: 4,
            templates_dir: None,
            keep_svg: false,
            rmc_path: None,
            renderer: None,
            pdf_backend: None,
            progress_callback: None,
            cancellation: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("ignore_assertions", &self.ignore_assertions)
            .field("include_incompatible", &self.include_incompatible)
            .field("include_trash", &self.include_trash)
            .field("concurrency", &self.concurrency)
            .field("page_concurrency", &self.page_concurrency)
            .field("templates_dir", &self.templates_dir)
            .field("keep_svg", &self.keep_svg)
            .field("rmc_path", &self.rmc_path)
            .field("renderer", &self.renderer.as_ref().map(|r| r.name().to_string()))
            .field("pdf_backend", &self.pdf_backend.as_ref().map(|b| b.name().to_string()))
            .field("progress_callback", &self.progress_callback.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationFlag::is_cancelled)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn ignore_assertions(mut self, v: bool) -> Self {
        self.config.ignore_assertions = v;
        self
    }

    pub fn include_incompatible(mut self, v: bool) -> Self {
        self.config.include_incompatible = v;
        self
    }

    pub fn include_trash(mut self, v: bool) -> Self {
        self.config.include_trash = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n;
        self
    }

    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.templates_dir = Some(dir.into());
        self
    }

    pub fn keep_svg(mut self, v: bool) -> Self {
        self.config.keep_svg = v;
        self
    }

    pub fn rmc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.rmc_path = Some(path.into());
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn StrokeRenderer>) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    pub fn pdf_backend(mut self, backend: Arc<dyn PdfBackend>) -> Self {
        self.config.pdf_backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancellation(mut self, flag: CancellationFlag) -> Self {
        self.config.cancellation = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, RmTreeError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(RmTreeError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.page_concurrency == 0 {
            return Err(RmTreeError::InvalidConfig(
                "Page concurrency must be ≥ 1".into(),
            ));
        }
        if let Some(dir) = &c.templates_dir {
            if !dir.is_dir() {
                return Err(RmTreeError::InvalidConfig(format!(
                    "Templates folder '{}' does not exist",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Cancellation ─────────────────────────────────────────────────────────

/// Cooperative stop signal shared between the caller and a running conversion.
///
/// Checked before each document starts; documents already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
