//! Document assembly: checked document → rendered pages → PDF on disk.
//!
//! One [`Assembler`] is built per run and shared (behind an `Arc`) by every
//! document task. Each call to [`Assembler::convert_document`] walks one
//! document through its state machine and returns the terminal
//! [`DocumentOutcome`] together with the issues it raised; nothing is shared
//! mutably between documents.
//!
//! Pages of a document are rendered concurrently (bounded by
//! `page_concurrency`) on the blocking pool and sorted back into declared
//! order before composition, so the output never depends on completion
//! order.

use crate::config::ConversionConfig;
use crate::error::{BackendError, RenderError};
use crate::output::{DocumentOutcome, DocumentState};
use crate::pipeline::background::{self, Background, BackgroundSource, TemplateTable};
use crate::pipeline::compat::{self, DocumentVerdict, PagePlan};
use crate::pipeline::pdf::{DocumentPlan, PageContent, PdfBackend, PlannedPage};
use crate::pipeline::render::StrokeRenderer;
use crate::report::{Issue, IssueKind, IssueReport, Severity};
use crate::tree::{Document, Entry, StrokeSource, Tree};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of converting one document.
#[derive(Debug, Clone)]
pub struct DocumentRun {
    pub outcome: DocumentOutcome,
    pub issues: IssueReport,
}

/// Why a document stopped before being written.
enum Halt {
    Skip(String),
    Fail(String),
}

struct Written {
    pages: usize,
    placeholders: usize,
}

/// Logs state transitions of one document.
struct StateTracker<'a> {
    uuid: &'a str,
    state: DocumentState,
}

impl StateTracker<'_> {
    fn advance(&mut self, next: DocumentState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} → {}",
            self.state,
            next
        );
        debug!("{}: {} → {}", self.uuid, self.state, next);
        self.state = next;
    }
}

/// Shared, read-only state for converting the documents of one tree.
pub struct Assembler {
    tree: Arc<Tree>,
    templates: Arc<TemplateTable>,
    renderer: Arc<dyn StrokeRenderer>,
    backend: Arc<dyn PdfBackend>,
    dest: PathBuf,
    config: ConversionConfig,
}

impl Assembler {
    pub fn new(
        tree: Arc<Tree>,
        templates: Arc<TemplateTable>,
        renderer: Arc<dyn StrokeRenderer>,
        backend: Arc<dyn PdfBackend>,
        dest: impl Into<PathBuf>,
        config: ConversionConfig,
    ) -> Self {
        Self {
            tree,
            templates,
            renderer,
            backend,
            dest: dest.into(),
            config,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    fn wanted(&self, uuid: &str) -> bool {
        self.config.include_trash || !self.tree.is_in_trash(uuid)
    }

    /// UUIDs of the documents to convert, ordered by output path.
    pub fn documents_to_convert(&self) -> Vec<String> {
        let mut docs: Vec<(PathBuf, String)> = self
            .tree
            .documents()
            .filter(|(e, _)| self.wanted(&e.uuid))
            .map(|(e, _)| {
                (
                    self.tree.relative_output(&e.uuid).unwrap_or_default(),
                    e.uuid.clone(),
                )
            })
            .collect();
        docs.sort();
        docs.into_iter().map(|(_, uuid)| uuid).collect()
    }

    /// Create the mirrored directory of every folder, empty ones included.
    ///
    /// Blocking. Returns the number of folders created or already present,
    /// and an output issue for every folder that could not be created.
    pub fn create_folders(&self) -> (usize, IssueReport) {
        let mut created = 0;
        let mut issues = IssueReport::new();
        for folder in self.tree.folders() {
            if !self.wanted(&folder.uuid) {
                continue;
            }
            let Some(rel) = self.tree.relative_output(&folder.uuid) else {
                continue;
            };
            match std::fs::create_dir_all(self.dest.join(&rel)) {
                Ok(()) => created += 1,
                Err(e) => {
                    warn!("Cannot create folder '{}': {e}", rel.display());
                    issues.push(Issue::new(
                        IssueKind::Output,
                        Severity::Error,
                        &folder.uuid,
                        &folder.name,
                        format!("cannot create folder '{}': {e}", rel.display()),
                    ));
                }
            }
        }
        (created, issues)
    }

    /// Convert one document to its terminal state.
    pub async fn convert_document(&self, uuid: &str) -> DocumentRun {
        let started = Instant::now();
        let mut issues = IssueReport::new();
        let mut tracker = StateTracker {
            uuid,
            state: DocumentState::Discovered,
        };

        let relative = self.tree.relative_output(uuid).unwrap_or_default();
        let (name, pages_total, result) = match self.tree.get(uuid) {
            Some(entry) => match entry.document() {
                Some(document) => {
                    let target = self.dest.join(&relative);
                    let result = self
                        .run(entry, document, &target, &mut tracker, &mut issues)
                        .await;
                    (entry.name.clone(), document.pages.len(), result)
                }
                None => (
                    entry.name.clone(),
                    0,
                    Err(Halt::Skip("entry is a folder".into())),
                ),
            },
            None => (String::new(), 0, Err(Halt::Fail("unknown entry".into()))),
        };

        let (written, placeholders, reason) = match result {
            Ok(w) => {
                tracker.advance(if w.placeholders > 0 {
                    DocumentState::PartiallyAssembled
                } else {
                    DocumentState::Assembled
                });
                (w.pages, w.placeholders, None)
            }
            Err(Halt::Skip(reason)) => {
                tracker.advance(DocumentState::Skipped);
                (0, 0, Some(reason))
            }
            Err(Halt::Fail(reason)) => {
                tracker.advance(DocumentState::Failed);
                (0, 0, Some(reason))
            }
        };

        let outcome = DocumentOutcome {
            uuid: uuid.to_string(),
            name,
            output: relative,
            state: tracker.state,
            pages_total,
            pages_written: written,
            placeholders,
            reason,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        match outcome.state {
            DocumentState::Failed => warn!(
                "{} failed: {}",
                outcome.output.display(),
                outcome.reason.as_deref().unwrap_or_default()
            ),
            state => info!("{} {} ({} pages)", outcome.output.display(), state, written),
        }
        DocumentRun { outcome, issues }
    }

    async fn run(
        &self,
        entry: &Entry,
        document: &Document,
        target: &Path,
        tracker: &mut StateTracker<'_>,
        issues: &mut IssueReport,
    ) -> Result<Written, Halt> {
        if self.config.is_cancelled() {
            return Err(Halt::Skip("cancelled".into()));
        }

        // ── Step 1: compatibility ───────────────────────────────────────────
        let verdict = compat::check_document(entry, document, &self.config, issues);
        tracker.advance(DocumentState::CompatibilityChecked);
        let plans = match verdict {
            DocumentVerdict::Skip { reason } => return Err(Halt::Skip(reason)),
            DocumentVerdict::Fail { reason } => return Err(Halt::Fail(reason)),
            DocumentVerdict::Proceed { pages } => pages,
        };

        // ── Step 2: documents without strokes are their background PDF ──────
        if let (true, Some(pdf)) = (document.is_pdf_only(), &document.background_pdf) {
            tracker.advance(DocumentState::Rendering);
            let bytes = tokio::fs::read(pdf)
                .await
                .map_err(|e| Halt::Fail(format!("cannot read '{}': {e}", pdf.display())))?;
            write_output(target.to_path_buf(), bytes).await?;
            debug!("{}: copied background PDF verbatim", entry.uuid);
            return Ok(Written {
                pages: document.pages.len(),
                placeholders: 0,
            });
        }

        if plans.is_empty() {
            return Err(Halt::Skip("no convertible pages".into()));
        }

        tracker.advance(DocumentState::Rendering);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_document_start(&entry.uuid, &entry.name, plans.len());
        }

        // ── Step 3: backgrounds ─────────────────────────────────────────────
        let backgrounds = self.plan_backgrounds(entry, document, &plans, issues).await?;

        // ── Step 4: render stroke pages concurrently ────────────────────────
        let jobs = plans.iter().copied().enumerate().map(|(slot, plan)| {
            let renderer = Arc::clone(&self.renderer);
            let stroke = match (&plan, &document.pages[plan.page()].stroke) {
                (PagePlan::Render { .. }, StrokeSource::Present { path, .. }) => Some(path.clone()),
                _ => None,
            };
            async move {
                let content = match (plan, stroke) {
                    (PagePlan::Render { .. }, Some(path)) => {
                        tokio::task::spawn_blocking(move || renderer.render(&path))
                            .await
                            .unwrap_or_else(|e| {
                                Err(RenderError::Other {
                                    detail: format!("render task panicked: {e}"),
                                })
                            })
                            .map(PageContent::Strokes)
                    }
                    (PagePlan::Blank { .. }, _) => Ok(PageContent::Blank),
                    _ => Ok(PageContent::Placeholder),
                };
                (slot, content)
            }
        });
        let mut rendered: Vec<(usize, Result<PageContent, RenderError>)> = stream::iter(jobs)
            .buffer_unordered(self.config.page_concurrency.max(1))
            .collect()
            .await;
        rendered.sort_by_key(|(slot, _)| *slot);

        // ── Step 5: build the plan in declared order ────────────────────────
        let mut pages = Vec::with_capacity(rendered.len());
        let mut placeholders = 0;
        for (((_, content), plan), background) in rendered.into_iter().zip(&plans).zip(backgrounds) {
            let page = &document.pages[plan.page()];
            let content = content.unwrap_or_else(|e| {
                issues.push(
                    Issue::new(
                        IssueKind::Render,
                        Severity::Error,
                        &entry.uuid,
                        &entry.name,
                        e.to_string(),
                    )
                    .on_page(page.number(), &page.id),
                );
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_page_error(&entry.uuid, page.number(), &e.to_string());
                }
                PageContent::Placeholder
            });
            if matches!(content, PageContent::Placeholder) {
                placeholders += 1;
            }
            pages.push(PlannedPage {
                number: page.number(),
                page_id: page.id.clone(),
                content,
                background,
            });
        }

        let plan = DocumentPlan {
            uuid: entry.uuid.clone(),
            name: entry.name.clone(),
            pages,
        };

        // ── Step 6: compose and write ───────────────────────────────────────
        let backend = Arc::clone(&self.backend);
        let (plan, composed) = tokio::task::spawn_blocking(move || {
            let composed = backend.compose(&plan);
            (plan, composed)
        })
        .await
        .map_err(|e| Halt::Fail(format!("compose task panicked: {e}")))?;
        let bytes = composed.map_err(|e| Halt::Fail(e.to_string()))?;

        write_output(target.to_path_buf(), bytes).await?;

        if self.config.keep_svg {
            keep_svgs(target, &plan).await;
        }

        Ok(Written {
            pages: plan.pages.len(),
            placeholders,
        })
    }

    /// Resolve the background of every planned page, checking document PDF
    /// page references against the PDF's real length.
    async fn plan_backgrounds(
        &self,
        entry: &Entry,
        document: &Document,
        plans: &[PagePlan],
        issues: &mut IssueReport,
    ) -> Result<Vec<Option<Background>>, Halt> {
        let pdf_pages = match &document.background_pdf {
            Some(pdf) => {
                let backend = Arc::clone(&self.backend);
                let pdf = pdf.clone();
                let count = tokio::task::spawn_blocking(move || backend.page_count(&pdf))
                    .await
                    .map_err(|e| Halt::Fail(format!("page count task panicked: {e}")))?
                    .map_err(|e| Halt::Fail(e.to_string()))?;
                Some(count)
            }
            None => None,
        };

        let mut backgrounds = Vec::with_capacity(plans.len());
        for plan in plans {
            let page = &document.pages[plan.page()];
            let bg = background::resolve(entry, document, page, &self.templates, issues);
            let bg = match (bg, pdf_pages) {
                (Some(bg), Some(count))
                    if bg.source == BackgroundSource::Document && bg.page >= count =>
                {
                    let message = format!(
                        "page refers to background page {} but the PDF has {count} pages",
                        bg.page + 1
                    );
                    if !self.config.ignore_assertions {
                        issues.push(
                            Issue::new(
                                IssueKind::Assertion,
                                Severity::Error,
                                &entry.uuid,
                                &entry.name,
                                message.clone(),
                            )
                            .on_page(page.number(), &page.id),
                        );
                        return Err(Halt::Fail(format!("page {}: {message}", page.number())));
                    }
                    issues.push(
                        Issue::new(
                            IssueKind::Assertion,
                            Severity::Warning,
                            &entry.uuid,
                            &entry.name,
                            message,
                        )
                        .on_page(page.number(), &page.id),
                    );
                    None
                }
                (bg, _) => bg,
            };
            backgrounds.push(bg);
        }
        Ok(backgrounds)
    }
}

async fn write_output(target: PathBuf, bytes: Vec<u8>) -> Result<(), Halt> {
    tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
        .await
        .map_err(|e| Halt::Fail(format!("write task panicked: {e}")))?
        .map_err(|e| Halt::Fail(e.to_string()))
}

/// Write `bytes` to `path` through a temporary file in the same directory.
///
/// A reader never observes a partially written PDF: either the old file (if
/// any) or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    let io_err = |source| BackendError::Write {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".rmtree-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))
            .map_err(io_err)?;
    }

    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Write `<name>.<page>.svg` next to the PDF for every stroke page.
async fn keep_svgs(target: &Path, plan: &DocumentPlan) {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| plan.uuid.clone());
    for page in &plan.pages {
        if let PageContent::Strokes(rendered) = &page.content {
            let path = target.with_file_name(format!("{stem}.{}.svg", page.number));
            if let Err(e) = tokio::fs::write(&path, &rendered.svg).await {
                warn!("Cannot write {}: {e}", path.display());
            }
        }
    }
}
