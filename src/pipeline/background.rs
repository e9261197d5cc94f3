//! Page backgrounds: template lookup, background choice and overlay geometry.
//!
//! A page's background is either a page of the document's own PDF (imported
//! PDFs and EPUBs) or a template such as "P Lines small". The document PDF
//! always wins. Stock templates are compiled in as SVG; PDFs in a templates
//! folder take precedence over them.
//!
//! The overlay geometry is fixed rather than fitted per document: every
//! background is scaled to the tablet's page height, centred horizontally on
//! the tablet's x origin and aligned to the top edge. Documents whose PDF
//! pages have an unusual aspect ratio may therefore not line up perfectly
//! with the strokes.

use crate::pipeline::schema::ContentSidecar;
use crate::report::{Issue, IssueKind, IssueReport, Severity};
use crate::tree::{Document, Entry, Page};
use rmc_bridge::{ViewBox, PAGE_HEIGHT_PT, PAGE_WIDTH_PT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ── Template table ───────────────────────────────────────────────────────────

/// Environment variable naming a templates folder to use when none is configured.
pub const TEMPLATES_ENV: &str = "RMTREE_TEMPLATES";

/// A stock template compiled into the binary.
struct BundledTemplate {
    /// Name shown on the tablet.
    name: &'static str,
    /// Name stored in `.content` / `.pagedata`.
    filename: &'static str,
    svg: &'static str,
}

macro_rules! bundled {
    ($name:literal, $filename:literal, $file:literal) => {
        BundledTemplate {
            name: $name,
            filename: $filename,
            svg: include_str!(concat!("../../templates/", $file)),
        }
    };
}

const BUNDLED: &[BundledTemplate] = &[
    bundled!("Lines small", "P Lines small", "lines-small.svg"),
    bundled!("Lines medium", "P Lines medium", "lines-medium.svg"),
    bundled!("Lines large", "P Lines large", "lines-large.svg"),
    bundled!("Grid small", "P Grid small", "grid-small.svg"),
    bundled!("Grid medium", "P Grid medium", "grid-medium.svg"),
    bundled!("Grid large", "P Grid large", "grid-large.svg"),
    bundled!("Dots small", "P Dots S", "dots-small.svg"),
    bundled!("Margin medium", "P Margin medium", "margin-medium.svg"),
];

/// `templates.json` as shipped on the tablet (only the fields used here).
#[derive(Debug, Deserialize)]
struct TemplatesJson {
    templates: Vec<TemplateDef>,
}

#[derive(Debug, Deserialize)]
struct TemplateDef {
    name: String,
    filename: String,
}

/// The file a background page is taken from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackgroundFile {
    /// A PDF on disk.
    Pdf { path: PathBuf },
    /// A one-page SVG template compiled into the binary.
    Bundled {
        filename: &'static str,
        #[serde(skip)]
        svg: &'static str,
    },
}

impl BackgroundFile {
    /// Path used in logs and errors.
    pub fn display_path(&self) -> PathBuf {
        match self {
            BackgroundFile::Pdf { path } => path.clone(),
            BackgroundFile::Bundled { filename, .. } => PathBuf::from(format!("{filename}.svg")),
        }
    }
}

/// Template name → background file. Loaded once per run, shared read-only.
#[derive(Debug, Clone, Default)]
pub struct TemplateTable {
    by_name: HashMap<String, BackgroundFile>,
}

impl TemplateTable {
    /// A table that knows no templates; every template lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The stock templates compiled into the binary, under both their
    /// display name and their file name.
    pub fn bundled() -> Self {
        let mut by_name = HashMap::new();
        for t in BUNDLED {
            let file = BackgroundFile::Bundled {
                filename: t.filename,
                svg: t.svg,
            };
            by_name.insert(t.name.to_string(), file.clone());
            by_name.insert(t.filename.to_string(), file);
        }
        Self { by_name }
    }

    /// The bundled table overlaid with the template PDFs in `dir`.
    ///
    /// With a `templates.json`, both the display `name` and the `filename`
    /// map to `<dir>/<filename>.pdf` when that file exists. Without one,
    /// every `*.pdf` is indexed by its file stem, and stock display names
    /// follow their file when it is present.
    pub fn load(dir: &Path) -> std::io::Result<Self> {
        let mut table = Self::bundled();
        let mut found = 0;
        let mut add = |table: &mut Self, name: String, path: &Path| {
            table
                .by_name
                .insert(name, BackgroundFile::Pdf { path: path.to_path_buf() });
            found += 1;
        };
        let manifest = dir.join("templates.json");

        if manifest.is_file() {
            let text = std::fs::read_to_string(&manifest)?;
            let parsed: TemplatesJson = serde_json::from_str(&text)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            for def in parsed.templates {
                let pdf = dir.join(format!("{}.pdf", def.filename));
                if pdf.is_file() {
                    add(&mut table, def.name, &pdf);
                    add(&mut table, def.filename, &pdf);
                } else {
                    debug!("template '{}' has no PDF at {}", def.name, pdf.display());
                }
            }
        } else {
            for dirent in std::fs::read_dir(dir)? {
                let path = dirent?.path();
                let is_pdf = path
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
                if !is_pdf {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if let Some(stock) = BUNDLED.iter().find(|t| t.filename == stem) {
                    add(&mut table, stock.name.to_string(), &path);
                }
                add(&mut table, stem.to_string(), &path);
            }
        }

        info!(
            "Loaded {found} template names from {} ({} bundled)",
            dir.display(),
            BUNDLED.len()
        );
        Ok(table)
    }

    pub fn lookup(&self, name: &str) -> Option<&BackgroundFile> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Templates folder to use when none is configured: `RMTREE_TEMPLATES`,
/// else a `templates` folder next to the running executable.
pub fn default_templates_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(TEMPLATES_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    let exe = std::env::current_exe().ok()?;
    templates_dir_beside(&exe)
}

fn templates_dir_beside(exe: &Path) -> Option<PathBuf> {
    let dir = exe.parent()?.join("templates");
    dir.is_dir().then_some(dir)
}

// ── Background choice ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackgroundSource {
    /// A page of the document's own `<uuid>.pdf`.
    Document,
    Template { name: String },
}

/// One page of some file to draw underneath the strokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Background {
    pub file: BackgroundFile,
    /// 0-based page index within `file`.
    pub page: usize,
    pub source: BackgroundSource,
}

/// Pick the background for `page`, recording a template issue when the
/// template cannot be found.
pub fn resolve(
    entry: &Entry,
    document: &Document,
    page: &Page,
    templates: &TemplateTable,
    report: &mut IssueReport,
) -> Option<Background> {
    if let Some(pdf) = &document.background_pdf {
        // Format version 1 has no redir; pages map one-to-one onto the PDF.
        let index = match (&document.content, page.redir) {
            (_, Some(r)) => Some(r),
            (ContentSidecar::V1(_), None) => Some(page.index),
            _ => None,
        };
        if let Some(index) = index {
            return Some(Background {
                file: BackgroundFile::Pdf { path: pdf.clone() },
                page: index,
                source: BackgroundSource::Document,
            });
        }
    }

    let name = page.template.as_ref()?;
    match templates.lookup(name) {
        Some(file) => Some(Background {
            file: file.clone(),
            page: 0,
            source: BackgroundSource::Template { name: name.clone() },
        }),
        None => {
            report.push(
                Issue::new(
                    IssueKind::Template,
                    Severity::Warning,
                    &entry.uuid,
                    &entry.name,
                    format!("template '{name}' not found; page has no background"),
                )
                .on_page(page.number(), &page.id),
            );
            None
        }
    }
}

// ── Overlay geometry ─────────────────────────────────────────────────────────

/// A width/height pair in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Size of a blank tablet page.
    pub const fn tablet() -> Self {
        Self::new(PAGE_WIDTH_PT, PAGE_HEIGHT_PT)
    }
}

/// Where things go on one composed page. PDF coordinates, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayGeometry {
    pub page: Size,
    /// Uniform scale applied to the background page.
    pub background_scale: f32,
    /// Translation of the (scaled) background.
    pub background_offset: (f32, f32),
    /// Translation of the stroke layer.
    pub content_offset: (f32, f32),
}

impl OverlayGeometry {
    /// Lay out a stroke layer of `view_box` over a background page of native size `background`.
    ///
    /// Without a view box the stroke layer is assumed to be one tablet page.
    pub fn compute(view_box: Option<ViewBox>, background: Option<Size>) -> Self {
        let (content, x_shift, y_shift) = match view_box {
            Some(vb) => (Size::new(vb.width, vb.height), vb.x, vb.y),
            None => (Size::tablet(), -PAGE_WIDTH_PT / 2.0, 0.0),
        };

        let (scale, bg) = match background {
            Some(b) if b.height > 0.0 => {
                let s = PAGE_HEIGHT_PT / b.height;
                (s, Size::new(b.width * s, PAGE_HEIGHT_PT))
            }
            _ => (1.0, Size::new(0.0, 0.0)),
        };

        let page = Size::new(content.width.max(bg.width), content.height.max(bg.height));

        // The tablet's x origin is the horizontal centre of the page; the
        // view box may extend further on one side when strokes leave the page.
        let drift = content.width / 2.0 + x_shift;
        let (mut bg_x, mut bg_y) = (0.0, 0.0);
        let (mut c_x, mut c_y) = (0.0, 0.0);
        if content.width > bg.width {
            bg_x = page.width / 2.0 - bg.width / 2.0 - drift;
        } else if content.width < bg.width {
            c_x = page.width / 2.0 - content.width / 2.0 + drift;
        }
        if content.height > bg.height {
            bg_y = page.height - bg.height + y_shift;
        } else if content.height < bg.height {
            c_y = page.height - content.height - y_shift;
        }

        Self {
            page,
            background_scale: scale,
            background_offset: (bg_x, bg_y),
            content_offset: (c_x, c_y),
        }
    }
}
