//! Metadata index: turn a flat `xochitl` folder into a [`Tree`].
//!
//! ```text
//! xochitl/
//!   <uuid>.metadata      name, type, parent
//!   <uuid>.content       page list (documents only)
//!   <uuid>.pagedata      per-page templates (format version 1)
//!   <uuid>.pdf           background PDF (imported documents)
//!   <uuid>/<page>.rm     strokes of one page
//!   <uuid>.tombstone     deletion marker
//! ```
//!
//! Everything here is synchronous file I/O; callers run it on a blocking
//! thread.

use crate::error::RmTreeError;
use crate::pipeline::schema::{
    self, ContentSidecar, EntryKind, MetadataSidecar, PageDef, SchemaError,
};
use crate::report::{Issue, IssueKind, IssueReport, Severity};
use crate::tree::{Document, Entry, EntryBody, Page, StrokeSource, Tree};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Matches `<uuid>` and `<uuid>.<anything>`; capture 1 is the UUID.
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9]{8}-[a-z0-9]{4}-[a-z0-9]{4}-[a-z0-9]{4}-[a-z0-9]{12})(\..*)?$")
        .unwrap()
});

/// Template name the tablet uses for plain paper.
pub const BLANK_TEMPLATE: &str = "Blank";

/// Scan `source` and build the document tree.
///
/// Problems with individual entries are recorded in `report`; only an
/// unusable source folder is an error.
pub fn scan(source: &Path, report: &mut IssueReport) -> Result<Tree, RmTreeError> {
    check_source(source)?;

    if tracing::enabled!(tracing::Level::DEBUG) {
        if let Ok(counts) = count_extensions(source) {
            debug!("source file types: {counts:?}");
        }
    }

    let uuids = list_uuids(source)?;
    info!("Scanning {} entries in {}", uuids.len(), source.display());

    let entries: Vec<Entry> = uuids
        .iter()
        .filter_map(|uuid| load_entry(source, uuid, report))
        .collect();

    let tree = Tree::build(source, entries, report);
    debug!(
        "tree: {} folders, {} documents",
        tree.folders().count(),
        tree.documents().count()
    );
    Ok(tree)
}

fn check_source(source: &Path) -> Result<(), RmTreeError> {
    match std::fs::metadata(source) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(RmTreeError::SourceNotADirectory {
            path: source.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RmTreeError::SourceNotFound {
            path: source.to_path_buf(),
        }),
        Err(e) => Err(RmTreeError::SourceUnreadable {
            path: source.to_path_buf(),
            source: e,
        }),
    }
}

/// Distinct UUIDs found among the names in `source`, sorted.
pub fn list_uuids(source: &Path) -> Result<BTreeSet<String>, RmTreeError> {
    let unreadable = |e| RmTreeError::SourceUnreadable {
        path: source.to_path_buf(),
        source: e,
    };
    let mut uuids = BTreeSet::new();
    for dirent in std::fs::read_dir(source).map_err(unreadable)? {
        let dirent = dirent.map_err(unreadable)?;
        let name = dirent.file_name();
        if let Some(caps) = name.to_str().and_then(|n| ID_PATTERN.captures(n)) {
            uuids.insert(caps[1].to_string());
        }
    }
    Ok(uuids)
}

/// Count the files in `dir` by extension (`""` for none). A debugging aid.
pub fn count_extensions(dir: &Path) -> std::io::Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for dirent in std::fs::read_dir(dir)? {
        let path = dirent?.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        *counts.entry(ext).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Paths of every sidecar an entry may have.
struct Sidecars {
    metadata: PathBuf,
    content: PathBuf,
    pagedata: PathBuf,
    pdf: PathBuf,
    pages_dir: PathBuf,
    tombstone: PathBuf,
    dirty: PathBuf,
}

impl Sidecars {
    fn new(source: &Path, uuid: &str) -> Self {
        let side = |ext: &str| source.join(format!("{uuid}.{ext}"));
        Self {
            metadata: side("metadata"),
            content: side("content"),
            pagedata: side("pagedata"),
            pdf: side("pdf"),
            pages_dir: source.join(uuid),
            tombstone: side("tombstone"),
            dirty: side("dirty"),
        }
    }
}

fn assertion(uuid: &str, name: &str, severity: Severity, message: impl Into<String>) -> Issue {
    Issue::new(IssueKind::Assertion, severity, uuid, name, message)
}

/// Load one entry, or record why it is excluded.
fn load_entry(source: &Path, uuid: &str, report: &mut IssueReport) -> Option<Entry> {
    let paths = Sidecars::new(source, uuid);

    if paths.tombstone.exists() || paths.dirty.exists() {
        let leftovers = [&paths.metadata, &paths.content, &paths.pdf, &paths.pages_dir]
            .iter()
            .any(|p| p.exists());
        if leftovers {
            report.push(assertion(
                uuid,
                "",
                Severity::Warning,
                "deleted entry still has sidecar files",
            ));
        }
        debug!("{uuid}: deletion marker, skipped");
        return None;
    }

    let metadata = match read_metadata(&paths.metadata) {
        Ok(m) => m,
        Err(message) => {
            report.push(assertion(uuid, "", Severity::Error, message));
            return None;
        }
    };
    let name = metadata.visible_name.clone();

    if metadata.deleted {
        debug!("{uuid}: marked deleted in metadata, skipped");
        return None;
    }

    let content_bytes = match std::fs::read(&paths.content) {
        Ok(b) => b,
        Err(e) => {
            report.push(assertion(
                uuid,
                &name,
                Severity::Error,
                format!("cannot read .content: {e}"),
            ));
            return None;
        }
    };

    let body = match metadata.kind {
        EntryKind::Folder => EntryBody::Folder,
        EntryKind::Document => match schema::parse_content(&content_bytes) {
            Ok(content) => EntryBody::Document(load_document(&paths, content, uuid, &name)),
            Err(e) => {
                report.push(assertion(
                    uuid,
                    &name,
                    Severity::Error,
                    format!(".content: {e}"),
                ));
                return None;
            }
        },
    };

    Some(Entry {
        uuid: uuid.to_string(),
        name,
        output_name: String::new(),
        parent: metadata.parent,
        pinned: metadata.pinned,
        body,
    })
}

fn read_metadata(path: &Path) -> Result<MetadataSidecar, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read .metadata: {e}"))?;
    schema::parse_metadata(&bytes).map_err(|e| match e {
        SchemaError::UnknownType(t) => format!(".metadata: unknown entry type '{t}'"),
        other => format!(".metadata: {other}"),
    })
}

fn load_document(paths: &Sidecars, content: ContentSidecar, uuid: &str, name: &str) -> Document {
    let defs = content.page_defs();

    // Format version 1 keeps templates in a separate file, one line per page.
    let v1_templates = match &content {
        ContentSidecar::V1(_) => read_pagedata(&paths.pagedata, uuid),
        _ => Vec::new(),
    };

    let mut pages = Vec::new();
    let mut deleted_with_strokes = Vec::new();
    for (position, def) in defs.into_iter().enumerate() {
        let stroke_path = paths.pages_dir.join(format!("{}.rm", def.id));
        if def.deleted {
            if stroke_path.exists() {
                deleted_with_strokes.push(def.id);
            }
            continue;
        }
        let PageDef {
            id,
            template,
            redir,
            ..
        } = def;
        let template = template.or_else(|| v1_templates.get(position).cloned());
        pages.push(Page {
            index: pages.len(),
            stroke: stroke_source(stroke_path),
            template: template.filter(|t| !t.is_empty() && t != BLANK_TEMPLATE),
            redir,
            id,
        });
    }

    let background_pdf = paths.pdf.is_file().then(|| paths.pdf.clone());
    debug!(
        "{uuid} '{name}': format {:?}, {} live pages, background pdf: {}",
        content.format_version(),
        pages.len(),
        background_pdf.is_some()
    );

    Document {
        content,
        pages,
        deleted_with_strokes,
        background_pdf,
    }
}

fn read_pagedata(path: &Path, uuid: &str) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => schema::parse_pagedata(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!("{uuid}: cannot read .pagedata: {e}");
            Vec::new()
        }
    }
}

fn stroke_source(path: PathBuf) -> StrokeSource {
    if !path.exists() {
        return StrokeSource::Missing;
    }
    match rmc_bridge::read_header(&path) {
        Ok(header) => StrokeSource::Present { path, header },
        Err(e) => StrokeSource::Unreadable {
            path,
            detail: e.to_string(),
        },
    }
}
