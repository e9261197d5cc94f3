//! The in-memory document tree.
//!
//! The tablet stores everything flat, keyed by UUID, with a `parent` pointer
//! in each `.metadata`. [`Tree::build`] turns that into a proper hierarchy
//! and guarantees, before anyone else looks at it, that
//!
//! * every entry has exactly one parent (root, trash, or an existing folder),
//! * following parents always terminates (cycles are broken),
//! * sibling output names are unique, so two documents never overwrite each
//!   other on disk.
//!
//! Every repair is recorded as an assertion issue; nothing is dropped
//! silently. After construction the tree is read-only.

use crate::pipeline::schema::{ContentSidecar, EntryKind, ParentRef};
use crate::report::{Issue, IssueKind, IssueReport, Severity};
use rmc_bridge::LinesHeader;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Folder name used for entries whose top ancestor sits in the trash.
pub const TRASH_DIR: &str = "_trash";

/// What is on disk for one page's strokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrokeSource {
    /// No `.rm` file: the page was never written on.
    Missing,
    Present { path: PathBuf, header: LinesHeader },
    /// The file exists but its header could not be read.
    Unreadable { path: PathBuf, detail: String },
}

/// One live page of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    /// 0-based position in declared order (deleted pages excluded).
    pub index: usize,
    pub stroke: StrokeSource,
    /// Template name; `None` for blank paper.
    pub template: Option<String>,
    /// Page of the document's own background PDF.
    pub redir: Option<usize>,
}

impl Page {
    /// 1-indexed page number used in reports.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Document-specific part of an [`Entry`].
#[derive(Debug, Clone)]
pub struct Document {
    pub content: ContentSidecar,
    /// Live pages in declared order.
    pub pages: Vec<Page>,
    /// Ids of deleted pages whose `.rm` file still exists.
    pub deleted_with_strokes: Vec<String>,
    /// `<uuid>.pdf`, present for imported PDFs and EPUBs.
    pub background_pdf: Option<PathBuf>,
}

impl Document {
    /// `true` when no page has stroke data: the background PDF is the document.
    pub fn is_pdf_only(&self) -> bool {
        self.background_pdf.is_some()
            && self
                .pages
                .iter()
                .all(|p| matches!(p.stroke, StrokeSource::Missing))
    }
}

#[derive(Debug, Clone)]
pub enum EntryBody {
    Folder,
    Document(Document),
}

/// One UUID-identified node.
#[derive(Debug, Clone)]
pub struct Entry {
    pub uuid: String,
    /// `visibleName` as written by the tablet.
    pub name: String,
    /// Sanitised, sibling-unique file system name (assigned by [`Tree::build`]).
    pub output_name: String,
    pub parent: ParentRef,
    pub pinned: bool,
    pub body: EntryBody,
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self.body {
            EntryBody::Folder => EntryKind::Folder,
            EntryBody::Document(_) => EntryKind::Document,
        }
    }

    pub fn document(&self) -> Option<&Document> {
        match &self.body {
            EntryBody::Document(d) => Some(d),
            EntryBody::Folder => None,
        }
    }
}

/// The full parent/child graph of one source folder.
#[derive(Debug, Clone)]
pub struct Tree {
    source: PathBuf,
    entries: BTreeMap<String, Entry>,
    children: BTreeMap<ParentRef, Vec<String>>,
}

impl Tree {
    /// Link `entries` into a tree, repairing broken parent links.
    pub fn build(source: impl Into<PathBuf>, entries: Vec<Entry>, report: &mut IssueReport) -> Self {
        let mut entries: BTreeMap<String, Entry> =
            entries.into_iter().map(|e| (e.uuid.clone(), e)).collect();

        reattach_dangling(&mut entries, report);
        break_cycles(&mut entries, report);
        assign_output_names(&mut entries);

        let mut children: BTreeMap<ParentRef, Vec<String>> = BTreeMap::new();
        for e in entries.values() {
            children.entry(e.parent.clone()).or_default().push(e.uuid.clone());
        }

        Self {
            source: source.into(),
            entries,
            children,
        }
    }

    /// The scanned `xochitl` folder.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, uuid: &str) -> Option<&Entry> {
        self.entries.get(uuid)
    }

    /// All entries in UUID order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn documents(&self) -> impl Iterator<Item = (&Entry, &Document)> {
        self.entries
            .values()
            .filter_map(|e| e.document().map(|d| (e, d)))
    }

    pub fn folders(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .values()
            .filter(|e| e.kind() == EntryKind::Folder)
    }

    /// UUIDs of the direct children of `parent`.
    pub fn children(&self, parent: &ParentRef) -> &[String] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ancestors of `uuid`, nearest first.
    pub fn ancestors(&self, uuid: &str) -> Vec<&Entry> {
        let mut chain = Vec::new();
        let mut current = self.entries.get(uuid);
        while let Some(entry) = current {
            current = match &entry.parent {
                ParentRef::Entry(p) => self.entries.get(p),
                _ => None,
            };
            if let Some(parent) = current {
                chain.push(parent);
            }
        }
        chain
    }

    /// `true` when the entry or one of its ancestors is in the trash.
    pub fn is_in_trash(&self, uuid: &str) -> bool {
        let top = self
            .ancestors(uuid)
            .last()
            .copied()
            .or_else(|| self.entries.get(uuid));
        matches!(top.map(|e| &e.parent), Some(ParentRef::Trash))
    }

    /// Directory (relative to the destination root) that holds `uuid`.
    pub fn relative_dir(&self, uuid: &str) -> PathBuf {
        let mut dir = PathBuf::new();
        if self.is_in_trash(uuid) {
            dir.push(TRASH_DIR);
        }
        for ancestor in self.ancestors(uuid).iter().rev() {
            dir.push(&ancestor.output_name);
        }
        dir
    }

    /// Relative output path: `<dir>/<name>.pdf` for documents, `<dir>/<name>` for folders.
    pub fn relative_output(&self, uuid: &str) -> Option<PathBuf> {
        let entry = self.entries.get(uuid)?;
        let dir = self.relative_dir(uuid);
        Some(match entry.kind() {
            EntryKind::Document => dir.join(format!("{}.pdf", entry.output_name)),
            EntryKind::Folder => dir.join(&entry.output_name),
        })
    }
}

fn assertion(entry: &Entry, message: String) -> Issue {
    Issue::new(
        IssueKind::Assertion,
        Severity::Error,
        &entry.uuid,
        &entry.name,
        message,
    )
}

/// Parents that do not exist, or are not folders, become root.
fn reattach_dangling(entries: &mut BTreeMap<String, Entry>, report: &mut IssueReport) {
    let kinds: HashMap<String, EntryKind> = entries
        .values()
        .map(|e| (e.uuid.clone(), e.kind()))
        .collect();

    for entry in entries.values_mut() {
        let ParentRef::Entry(parent) = &entry.parent else {
            continue;
        };
        let problem = match kinds.get(parent) {
            None => Some(format!("parent '{parent}' does not exist; reattached to root")),
            Some(EntryKind::Document) => {
                Some(format!("parent '{parent}' is a document; reattached to root"))
            }
            Some(EntryKind::Folder) if parent == &entry.uuid => {
                Some("entry is its own parent; reattached to root".to_string())
            }
            Some(EntryKind::Folder) => None,
        };
        if let Some(message) = problem {
            report.push(assertion(entry, message));
            entry.parent = ParentRef::Root;
        }
    }
}

/// Each cycle is broken by moving its smallest UUID to the root.
fn break_cycles(entries: &mut BTreeMap<String, Entry>, report: &mut IssueReport) {
    let uuids: Vec<String> = entries.keys().cloned().collect();
    let mut settled: HashSet<String> = HashSet::new();

    for start in uuids {
        loop {
            let mut chain: Vec<String> = Vec::new();
            let mut current = Some(start.clone());
            let mut cycle: Option<Vec<String>> = None;

            while let Some(uuid) = current {
                if settled.contains(&uuid) {
                    break;
                }
                if let Some(pos) = chain.iter().position(|u| u == &uuid) {
                    cycle = Some(chain[pos..].to_vec());
                    break;
                }
                current = match entries.get(&uuid).map(|e| &e.parent) {
                    Some(ParentRef::Entry(p)) => Some(p.clone()),
                    _ => None,
                };
                chain.push(uuid);
            }

            match cycle {
                Some(members) => {
                    let victim = members.iter().min().cloned().unwrap_or_default();
                    if let Some(entry) = entries.get_mut(&victim) {
                        report.push(assertion(
                            entry,
                            format!(
                                "parent chain forms a cycle through {} entries; reattached to root",
                                members.len()
                            ),
                        ));
                        entry.parent = ParentRef::Root;
                    }
                }
                None => {
                    settled.extend(chain);
                    break;
                }
            }
        }
    }
}

/// Characters that are invalid in file names on at least one platform.
const INVALID_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make a display name safe to use as a file or folder name.
pub fn sanitize_name(name: &str, uuid: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !INVALID_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        uuid.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Sibling collisions (case-insensitive) get ` (2)`, ` (3)`, … in UUID order.
fn assign_output_names(entries: &mut BTreeMap<String, Entry>) {
    let mut used: HashMap<(ParentRef, EntryKind, String), usize> = HashMap::new();

    // BTreeMap iteration is UUID order, which makes suffixes deterministic.
    for entry in entries.values_mut() {
        let base = sanitize_name(&entry.name, &entry.uuid);
        let key = (entry.parent.clone(), entry.kind(), base.to_lowercase());
        let seen = used.entry(key).or_insert(0);
        *seen += 1;
        entry.output_name = if *seen == 1 {
            base
        } else {
            debug!("name collision for '{}' ({}): suffix {}", base, entry.uuid, seen);
            format!("{base} ({seen})")
        };
    }
}
