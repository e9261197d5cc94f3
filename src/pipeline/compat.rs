//! Compatibility checking: decide, per document, what can be converted.
//!
//! The checker never touches the renderer or the PDF backend. It looks at
//! the typed sidecars and the `.rm` headers collected by the scan and turns
//! them into a [`DocumentVerdict`] plus issues.
//!
//! Two knobs change the outcome:
//!
//! * `include_incompatible` keeps pages in any stroke format other than v6
//!   as placeholders (the issue becomes a warning).
//! * `ignore_assertions` turns structural deviations from fatal errors into
//!   warnings and lets the document through best-effort.

use crate::config::ConversionConfig;
use crate::output::{CheckStatus, CheckedDocument, CompatibilityReport};
use crate::pipeline::schema::ContentSidecar;
use crate::report::{Issue, IssueKind, IssueReport, Severity};
use crate::tree::{Document, Entry, Page, StrokeSource, Tree};
use rmc_bridge::LinesHeader;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// The only stroke format version the renderer understands.
pub const SUPPORTED_LINES_VERSION: u8 = 6;

/// What to do with one live page. `page` indexes [`Document::pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PagePlan {
    /// Strokes in a supported format.
    Render { page: usize },
    /// No stroke file; background only.
    Blank { page: usize },
    /// Keep the page slot but do not render its strokes.
    Placeholder { page: usize },
}

impl PagePlan {
    pub fn page(&self) -> usize {
        match *self {
            PagePlan::Render { page } | PagePlan::Blank { page } | PagePlan::Placeholder { page } => {
                page
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentVerdict {
    /// Not converted, not an error of this tool (unsupported format).
    Skip { reason: String },
    /// Structural problems make the document unusable.
    Fail { reason: String },
    Proceed { pages: Vec<PagePlan> },
}

/// Collects issues for one document and remembers the fatal ones.
struct Checker<'a> {
    entry: &'a Entry,
    ignore_assertions: bool,
    report: &'a mut IssueReport,
    fatal: Vec<String>,
}

impl Checker<'_> {
    fn push(&mut self, kind: IssueKind, severity: Severity, page: Option<&Page>, message: String) {
        let mut issue = Issue::new(kind, severity, &self.entry.uuid, &self.entry.name, message);
        if let Some(p) = page {
            issue = issue.on_page(p.number(), &p.id);
        }
        self.report.push(issue);
    }

    /// Record a structural deviation; fatal unless assertions are ignored.
    fn assertion(&mut self, page: Option<&Page>, message: String) {
        let severity = if self.ignore_assertions {
            Severity::Warning
        } else {
            self.fatal.push(match page {
                Some(p) => format!("page {}: {message}", p.number()),
                None => message.clone(),
            });
            Severity::Error
        };
        self.push(IssueKind::Assertion, severity, page, message);
    }
}

/// Check one document and record its issues.
pub fn check_document(
    entry: &Entry,
    document: &Document,
    config: &ConversionConfig,
    report: &mut IssueReport,
) -> DocumentVerdict {
    let mut checker = Checker {
        entry,
        ignore_assertions: config.ignore_assertions,
        report,
        fatal: Vec::new(),
    };

    // ── Step 1: content format version ──────────────────────────────────────
    match &document.content {
        ContentSidecar::Unsupported { format_version }
        | ContentSidecar::Malformed {
            format_version: Some(format_version @ (..=0 | 3..)),
            ..
        } => {
            let reason = format!("content format version {format_version} is not supported");
            checker.push(IssueKind::Compatibility, Severity::Error, None, reason.clone());
            return DocumentVerdict::Skip { reason };
        }
        ContentSidecar::Malformed { reason, .. } => {
            checker.assertion(None, format!("malformed .content: {reason}"));
        }
        ContentSidecar::V1(_) | ContentSidecar::V2(_) => {}
    }

    // ── Step 2: document-level structure ────────────────────────────────────
    if let Some(declared) = document.content.declared_page_count() {
        if declared != document.pages.len() {
            checker.assertion(
                None,
                format!(
                    "pageCount is {declared} but {} live pages are listed",
                    document.pages.len()
                ),
            );
        }
    }
    for id in &document.deleted_with_strokes {
        checker.assertion(None, format!("deleted page '{id}' still has a stroke file"));
    }
    let mut seen = HashSet::new();
    for page in &document.pages {
        if !seen.insert(page.id.as_str()) {
            checker.assertion(Some(page), format!("duplicate page id '{}'", page.id));
        }
    }

    // ── Step 3: per-page stroke format ──────────────────────────────────────
    let mut plans = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        if page.redir.is_some() && document.background_pdf.is_none() {
            checker.assertion(
                Some(page),
                "page refers to a background PDF page but the document has no PDF".to_string(),
            );
        }

        let plan = match &page.stroke {
            StrokeSource::Missing => Some(PagePlan::Blank { page: page.index }),
            StrokeSource::Present {
                header: LinesHeader::Version(SUPPORTED_LINES_VERSION),
                ..
            } => Some(PagePlan::Render { page: page.index }),
            StrokeSource::Present {
                header: LinesHeader::Version(v),
                ..
            } => {
                let message = format!("stroke format version {v} is not supported");
                if config.include_incompatible {
                    checker.push(IssueKind::Compatibility, Severity::Warning, Some(page), message);
                    Some(PagePlan::Placeholder { page: page.index })
                } else {
                    checker.push(IssueKind::Compatibility, Severity::Error, Some(page), message);
                    None
                }
            }
            StrokeSource::Present {
                header: LinesHeader::Unrecognized,
                ..
            } => {
                checker.assertion(Some(page), "unrecognised .rm header".to_string());
                Some(PagePlan::Placeholder { page: page.index })
            }
            StrokeSource::Unreadable { detail, .. } => {
                checker.assertion(Some(page), format!("cannot read .rm file: {detail}"));
                Some(PagePlan::Placeholder { page: page.index })
            }
        };
        plans.extend(plan);
    }

    // ── Step 4: verdict ─────────────────────────────────────────────────────
    match checker.fatal.as_slice() {
        [] => {
            debug!(
                "{} '{}': {} of {} pages kept",
                entry.uuid,
                entry.name,
                plans.len(),
                document.pages.len()
            );
            DocumentVerdict::Proceed { pages: plans }
        }
        [only] => DocumentVerdict::Fail {
            reason: only.clone(),
        },
        [first, rest @ ..] => DocumentVerdict::Fail {
            reason: format!("{first} (and {} more)", rest.len()),
        },
    }
}

/// Dry run over the whole tree: verdicts and issues, nothing written.
pub fn check_tree(tree: &Tree, config: &ConversionConfig) -> CompatibilityReport {
    let mut issues = IssueReport::new();
    let mut documents = Vec::new();

    for (entry, document) in tree.documents() {
        if !config.include_trash && tree.is_in_trash(&entry.uuid) {
            continue;
        }
        let verdict = check_document(entry, document, config, &mut issues);
        let total = document.pages.len();
        let (status, kept, reason) = match verdict {
            DocumentVerdict::Proceed { pages } => (CheckStatus::Ok, pages.len(), None),
            DocumentVerdict::Skip { reason } => (CheckStatus::Skip, 0, Some(reason)),
            DocumentVerdict::Fail { reason } => (CheckStatus::Fail, 0, Some(reason)),
        };
        documents.push(CheckedDocument {
            uuid: entry.uuid.clone(),
            name: entry.name.clone(),
            path: tree.relative_output(&entry.uuid).unwrap_or_default(),
            status,
            pages: total,
            kept_pages: kept,
            reason,
        });
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    CompatibilityReport { documents, issues }
}
