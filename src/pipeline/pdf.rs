//! PDF composition: the [`PdfBackend`] seam and its pdfium implementation.
//!
//! The assembler describes a document as a [`DocumentPlan`], an ordered list
//! of pages each made of an optional stroke layer and an optional background
//! page, and hands it to a backend that returns the finished PDF bytes. The
//! backend never touches the output tree; writing is the assembler's job.
//!
//! ## Production backend
//!
//! [`PdfiumBackend`] (feature `pdfium`) converts each SVG to a one-page
//! vector PDF with `svg2pdf`, then uses pdfium to place background and
//! strokes on a fresh page as form XObjects and concatenate the result.
//! pdfium is a single C++ library instance, so access is serialised behind a
//! `Mutex`; callers run `compose` inside `spawn_blocking`.

use crate::error::BackendError;
use crate::pipeline::background::Background;
use crate::pipeline::render::RenderedPage;
use serde::Serialize;
use std::path::Path;

/// Everything needed to produce one output PDF.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentPlan {
    pub uuid: String,
    pub name: String,
    pub pages: Vec<PlannedPage>,
}

impl DocumentPlan {
    pub fn stroke_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.content, PageContent::Strokes(_)))
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedPage {
    /// 1-indexed position among the document's live pages.
    pub number: usize,
    pub page_id: String,
    pub content: PageContent,
    pub background: Option<Background>,
}

/// The foreground of a planned page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageContent {
    Strokes(RenderedPage),
    /// No strokes were ever written on the page.
    Blank,
    /// Strokes exist but could not be rendered.
    Placeholder,
}

/// Converts a [`DocumentPlan`] into PDF bytes.
pub trait PdfBackend: Send + Sync {
    fn compose(&self, plan: &DocumentPlan) -> Result<Vec<u8>, BackendError>;

    /// Number of pages in an existing PDF.
    fn page_count(&self, pdf: &Path) -> Result<usize, BackendError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "pdf backend"
    }
}

/// pdfium addresses pages with a `u16`.
#[cfg(any(feature = "pdfium", test))]
fn page_index(bg: &Background) -> Result<u16, BackendError> {
    u16::try_from(bg.page).map_err(|_| BackendError::Open {
        path: bg.file.display_path(),
        detail: format!("page {} is beyond the last addressable page", bg.page + 1),
    })
}

#[cfg(feature = "pdfium")]
pub use self::pdfium::PdfiumBackend;

#[cfg(feature = "pdfium")]
mod pdfium {
    use super::{page_index, DocumentPlan, PageContent, PdfBackend, PlannedPage};
    use crate::error::{BackendError, RmTreeError};
    use crate::pipeline::background::{BackgroundFile, OverlayGeometry, Size};
    use pdfium_render::prelude::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use svg2pdf::usvg;
    use tracing::{debug, info};

    /// [`PdfBackend`] built on svg2pdf and pdfium.
    pub struct PdfiumBackend {
        pdfium: Mutex<Pdfium>,
    }

    impl std::fmt::Debug for PdfiumBackend {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("PdfiumBackend").finish_non_exhaustive()
        }
    }

    impl PdfiumBackend {
        /// Bind pdfium, downloading it on first use (honours `PDFIUM_LIB_PATH`).
        pub fn new() -> Result<Self, RmTreeError> {
            let pdfium = pdfium_auto::bind_pdfium_silent()
                .map_err(|e| RmTreeError::BackendUnavailable(e.to_string()))?;
            info!("PDF backend: pdfium bound");
            Ok(Self::from_pdfium(pdfium))
        }

        /// Use an already bound pdfium instance.
        pub fn from_pdfium(pdfium: Pdfium) -> Self {
            Self {
                pdfium: Mutex::new(pdfium),
            }
        }
    }

    fn compose_err(context: &str, e: PdfiumError) -> BackendError {
        BackendError::Compose(format!("{context}: {e:?}"))
    }

    fn svg_to_pdf(page: usize, svg: &str) -> Result<Vec<u8>, BackendError> {
        let tree = usvg::Tree::from_str(svg, &usvg::Options::default()).map_err(|e| {
            BackendError::Svg {
                page,
                detail: e.to_string(),
            }
        })?;
        // 72 dpi: one SVG user unit is one PDF point.
        svg2pdf::to_pdf(
            &tree,
            svg2pdf::ConversionOptions::default(),
            svg2pdf::PageOptions::default(),
        )
        .map_err(|e| BackendError::Svg {
            page,
            detail: format!("{e:?}"),
        })
    }

    fn page_size(page: &PdfPage) -> Size {
        Size::new(page.width().value, page.height().value)
    }

    /// Loaded background documents, opened once per composed document.
    struct Backgrounds<'a> {
        pdfium: &'a Pdfium,
        open: HashMap<BackgroundFile, PdfDocument<'a>>,
    }

    impl<'a> Backgrounds<'a> {
        fn get(&mut self, file: &BackgroundFile, page: usize) -> Result<&PdfDocument<'a>, BackendError> {
            if !self.open.contains_key(file) {
                let loaded = match file {
                    BackgroundFile::Pdf { path } => self.pdfium.load_pdf_from_file(path, None),
                    BackgroundFile::Bundled { svg, .. } => {
                        let bytes = svg_to_pdf(page, svg)?;
                        self.pdfium.load_pdf_from_byte_vec(bytes, None)
                    }
                };
                let doc = loaded.map_err(|e| BackendError::Open {
                    path: file.display_path(),
                    detail: format!("{e:?}"),
                })?;
                self.open.insert(file.clone(), doc);
            }
            self.open
                .get(file)
                .ok_or_else(|| BackendError::Compose("background cache miss".into()))
        }
    }

    impl PdfiumBackend {
        fn compose_page<'a>(
            pdfium: &'a Pdfium,
            out: &mut PdfDocument<'a>,
            backgrounds: &mut Backgrounds<'a>,
            planned: &PlannedPage,
        ) -> Result<(), BackendError> {
            // ── Background layer ────────────────────────────────────────────
            let background = match &planned.background {
                Some(bg) => {
                    let index = page_index(bg)?;
                    let doc = backgrounds.get(&bg.file, planned.number)?;
                    let page = doc.pages().get(index).map_err(|e| BackendError::Open {
                        path: bg.file.display_path(),
                        detail: format!("page {}: {e:?}", bg.page + 1),
                    })?;
                    let size = page_size(&page);
                    let object = page
                        .objects()
                        .copy_into_x_object_form_object(out)
                        .map_err(|e| compose_err("background copy", e))?;
                    Some((size, object))
                }
                None => None,
            };

            // ── Stroke layer ────────────────────────────────────────────────
            let strokes = match &planned.content {
                PageContent::Strokes(rendered) => {
                    let bytes = svg_to_pdf(planned.number, &rendered.svg)?;
                    let svg_doc = pdfium
                        .load_pdf_from_byte_vec(bytes, None)
                        .map_err(|e| compose_err("stroke layer", e))?;
                    let svg_page = svg_doc
                        .pages()
                        .get(0)
                        .map_err(|e| compose_err("stroke layer", e))?;
                    let object = svg_page
                        .objects()
                        .copy_into_x_object_form_object(out)
                        .map_err(|e| compose_err("stroke copy", e))?;
                    Some((rendered.view_box, object))
                }
                PageContent::Blank | PageContent::Placeholder => None,
            };

            // ── Placement ───────────────────────────────────────────────────
            let (page_size, bg_transform, stroke_offset) = match (&background, &strokes) {
                (Some((bg_size, _)), Some((view_box, _))) => {
                    let g = OverlayGeometry::compute(*view_box, Some(*bg_size));
                    (
                        g.page,
                        (g.background_scale, g.background_offset),
                        g.content_offset,
                    )
                }
                (None, Some((view_box, _))) => {
                    let g = OverlayGeometry::compute(*view_box, None);
                    (g.page, (1.0, (0.0, 0.0)), g.content_offset)
                }
                // Without strokes the background page is kept at its own size.
                (Some((bg_size, _)), None) => (*bg_size, (1.0, (0.0, 0.0)), (0.0, 0.0)),
                (None, None) => (Size::tablet(), (1.0, (0.0, 0.0)), (0.0, 0.0)),
            };

            let mut page = out
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::Custom(
                    PdfPoints::new(page_size.width),
                    PdfPoints::new(page_size.height),
                ))
                .map_err(|e| compose_err("new page", e))?;

            if let Some((_, mut object)) = background {
                let (scale, (dx, dy)) = bg_transform;
                object
                    .scale(scale, scale)
                    .and_then(|_| object.translate(PdfPoints::new(dx), PdfPoints::new(dy)))
                    .map_err(|e| compose_err("background transform", e))?;
                page.objects_mut()
                    .add_object(object)
                    .map_err(|e| compose_err("background place", e))?;
            }
            if let Some((_, mut object)) = strokes {
                let (dx, dy) = stroke_offset;
                object
                    .translate(PdfPoints::new(dx), PdfPoints::new(dy))
                    .map_err(|e| compose_err("stroke transform", e))?;
                page.objects_mut()
                    .add_object(object)
                    .map_err(|e| compose_err("stroke place", e))?;
            }
            Ok(())
        }
    }

    impl PdfBackend for PdfiumBackend {
        fn compose(&self, plan: &DocumentPlan) -> Result<Vec<u8>, BackendError> {
            let pdfium = self
                .pdfium
                .lock()
                .map_err(|_| BackendError::Compose("pdfium lock poisoned".into()))?;

            let mut out = pdfium
                .create_new_pdf()
                .map_err(|e| compose_err("new document", e))?;
            let mut backgrounds = Backgrounds {
                pdfium: &pdfium,
                open: HashMap::new(),
            };

            for planned in &plan.pages {
                Self::compose_page(&pdfium, &mut out, &mut backgrounds, planned)?;
            }

            debug!(
                "{}: composed {} pages ({} with strokes)",
                plan.uuid,
                plan.pages.len(),
                plan.stroke_pages()
            );
            out.save_to_bytes().map_err(|e| compose_err("save", e))
        }

        fn page_count(&self, pdf: &Path) -> Result<usize, BackendError> {
            let pdfium = self
                .pdfium
                .lock()
                .map_err(|_| BackendError::Compose("pdfium lock poisoned".into()))?;
            let doc = pdfium
                .load_pdf_from_file(pdf, None)
                .map_err(|e| BackendError::Open {
                    path: pdf.to_path_buf(),
                    detail: format!("{e:?}"),
                })?;
            Ok(doc.pages().len() as usize)
        }

        fn name(&self) -> &str {
            "pdfium"
        }
    }
}
