//! Shared fixtures for the integration tests: a `xochitl` folder builder and
//! in-memory stand-ins for the stroke renderer and the PDF backend.

#![allow(dead_code)]

use rmtree::{
    BackendError, ConversionConfig, DocumentPlan, PdfBackend, RenderError, RenderedPage,
    StrokeRenderer,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ── xochitl fixture ──────────────────────────────────────────────────────────

/// One page of a fixture document.
#[derive(Debug, Clone)]
pub struct PageSpec {
    pub id: String,
    /// `Some(v)` writes a `.rm` file with a version `v` header.
    pub lines: Option<u8>,
    pub template: Option<String>,
    pub redir: Option<usize>,
    pub deleted: bool,
}

impl PageSpec {
    pub fn strokes(id: &str) -> Self {
        Self::with_lines(id, 6)
    }

    pub fn with_lines(id: &str, version: u8) -> Self {
        Self {
            id: id.to_string(),
            lines: Some(version),
            template: None,
            redir: None,
            deleted: false,
        }
    }

    pub fn blank(id: &str) -> Self {
        Self {
            id: id.to_string(),
            lines: None,
            template: None,
            redir: None,
            deleted: false,
        }
    }

    pub fn template(mut self, name: &str) -> Self {
        self.template = Some(name.to_string());
        self
    }

    pub fn redir(mut self, index: usize) -> Self {
        self.redir = Some(index);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }
}

/// A throwaway `xochitl` folder plus a destination root.
pub struct Xochitl {
    tmp: TempDir,
}

impl Xochitl {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("xochitl")).unwrap();
        Self { tmp }
    }

    pub fn source(&self) -> PathBuf {
        self.tmp.path().join("xochitl")
    }

    pub fn dest(&self) -> PathBuf {
        self.tmp.path().join("out")
    }

    pub fn write(&self, name: &str, body: impl AsRef<[u8]>) {
        let path = self.source().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }

    pub fn remove(&self, name: &str) {
        fs::remove_file(self.source().join(name)).unwrap();
    }

    pub fn metadata(&self, uuid: &str, kind: &str, name: &str, parent: &str) {
        let body = json!({
            "type": kind,
            "visibleName": name,
            "parent": parent,
            "deleted": false,
            "pinned": false,
            "lastModified": "1700000000000",
        });
        self.write(&format!("{uuid}.metadata"), body.to_string());
    }

    pub fn folder(&self, uuid: &str, name: &str, parent: &str) {
        self.metadata(uuid, "CollectionType", name, parent);
        self.write(&format!("{uuid}.content"), "{}");
    }

    /// A format version 2 notebook.
    pub fn document(&self, uuid: &str, name: &str, parent: &str, pages: &[PageSpec]) {
        self.metadata(uuid, "DocumentType", name, parent);
        let live = pages.iter().filter(|p| !p.deleted).count();
        let c_pages: Vec<Value> = pages
            .iter()
            .map(|p| {
                let mut page = json!({ "id": p.id, "idx": { "timestamp": "1:2", "value": "ba" } });
                if let Some(t) = &p.template {
                    page["template"] = json!({ "timestamp": "1:1", "value": t });
                }
                if let Some(r) = p.redir {
                    page["redir"] = json!({ "timestamp": "1:1", "value": r });
                }
                if p.deleted {
                    page["deleted"] = json!({ "timestamp": "1:1", "value": 1 });
                }
                page
            })
            .collect();
        let content = json!({
            "formatVersion": 2,
            "fileType": "notebook",
            "pageCount": live,
            "cPages": { "pages": c_pages },
        });
        self.write(&format!("{uuid}.content"), content.to_string());
        self.strokes(uuid, pages);
    }

    /// A format version 1 notebook with a `.pagedata` template list.
    pub fn document_v1(&self, uuid: &str, name: &str, parent: &str, pages: &[PageSpec]) {
        self.metadata(uuid, "DocumentType", name, parent);
        let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
        let content = json!({
            "formatVersion": 1,
            "fileType": "notebook",
            "pageCount": ids.len(),
            "pages": ids,
        });
        self.write(&format!("{uuid}.content"), content.to_string());
        let pagedata: Vec<&str> = pages
            .iter()
            .map(|p| p.template.as_deref().unwrap_or("Blank"))
            .collect();
        self.write(&format!("{uuid}.pagedata"), pagedata.join("\n"));
        self.strokes(uuid, pages);
    }

    /// `<uuid>.pdf`; the bytes are irrelevant to the fake backend.
    pub fn background_pdf(&self, uuid: &str) -> PathBuf {
        self.write(&format!("{uuid}.pdf"), b"%PDF-1.7 fixture");
        self.source().join(format!("{uuid}.pdf"))
    }

    fn strokes(&self, uuid: &str, pages: &[PageSpec]) {
        for page in pages {
            if let Some(version) = page.lines {
                self.write(&format!("{uuid}/{}.rm", page.id), lines_file(version));
            }
        }
    }

    pub fn output(&self, relative: &str) -> PathBuf {
        self.dest().join(relative)
    }

    /// Every file under the destination root, relative and sorted.
    pub fn written_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        collect_files(&self.dest(), &self.dest(), &mut files);
        files.sort();
        files
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).unwrap();
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
}

/// A stroke file with a valid header and no blocks.
pub fn lines_file(version: u8) -> Vec<u8> {
    let mut bytes = format!("reMarkable .lines file, version={version}").into_bytes();
    bytes.resize(rmc_bridge::HEADER_LEN, b' ');
    bytes
}

// ── Fake collaborators ───────────────────────────────────────────────────────

/// Renders every page to a tiny SVG naming the page id; fails on request.
#[derive(Default)]
pub struct FakeRenderer {
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn failing_on(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StrokeRenderer for FakeRenderer {
    fn render(&self, stroke: &Path) -> Result<RenderedPage, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = stroke
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.contains(&id) {
            return Err(RenderError::UnknownBlock {
                detail: format!("block type 13 in {id}"),
            });
        }
        Ok(RenderedPage::new(format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1404 1872"><title>{id}</title></svg>"#
        )))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Serialises the plan as JSON instead of drawing a PDF.
#[derive(Default)]
pub struct FakeBackend {
    /// Page counts of background PDFs, by file name; unknown files have 10.
    page_counts: HashMap<String, usize>,
}

impl FakeBackend {
    pub fn with_page_count(file_name: &str, count: usize) -> Self {
        Self {
            page_counts: HashMap::from([(file_name.to_string(), count)]),
        }
    }
}

impl PdfBackend for FakeBackend {
    fn compose(&self, plan: &DocumentPlan) -> Result<Vec<u8>, BackendError> {
        serde_json::to_vec_pretty(plan).map_err(|e| BackendError::Compose(e.to_string()))
    }

    fn page_count(&self, pdf: &Path) -> Result<usize, BackendError> {
        let name = pdf
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.page_counts.get(&name).copied().unwrap_or(10))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Config wired to the fakes.
pub fn config_with(renderer: Arc<FakeRenderer>, backend: FakeBackend) -> ConversionConfig {
    ConversionConfig {
        renderer: Some(renderer as Arc<dyn StrokeRenderer>),
        pdf_backend: Some(Arc::new(backend)),
        ..Default::default()
    }
}

pub fn fake_config() -> ConversionConfig {
    config_with(Arc::new(FakeRenderer::default()), FakeBackend::default())
}

/// The plan the fake backend wrote for a document.
pub fn read_plan(path: &Path) -> Value {
    let bytes = fs::read(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    serde_json::from_slice(&bytes).unwrap()
}

/// Page ids of a written plan, in output order.
pub fn plan_page_ids(plan: &Value) -> Vec<String> {
    plan["pages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["page_id"].as_str().unwrap().to_string())
        .collect()
}

/// `kind` of every page's content (`strokes`, `blank`, `placeholder`).
pub fn plan_page_kinds(plan: &Value) -> Vec<String> {
    plan["pages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["content"]["kind"].as_str().unwrap().to_string())
        .collect()
}
