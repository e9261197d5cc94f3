//! Whole-pipeline tests on fixture `xochitl` folders.
//!
//! The stroke renderer and PDF backend are replaced by fakes (see
//! `common/mod.rs`): the fake backend writes the document plan as JSON, so
//! every test can inspect exactly which pages, in which order, with which
//! backgrounds ended up in each output file.

mod common;

use common::*;
use futures::StreamExt;
use rmtree::{
    check_compatibility, convert, convert_stream, CancellationFlag, CheckStatus,
    ConversionConfig, ConversionProgressCallback, DocumentOutcome, DocumentRun, DocumentState,
    IssueKind, RmTreeError, Severity,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn id(n: u32) -> String {
    format!("{n:08x}-0000-4000-8000-000000000000")
}

fn outcome<'a>(output: &'a rmtree::ConversionOutput, uuid: &str) -> &'a DocumentOutcome {
    output
        .documents
        .iter()
        .find(|d| d.uuid == uuid)
        .unwrap_or_else(|| panic!("no outcome for {uuid}"))
}

// ── Page count and order ─────────────────────────────────────────────────────

#[tokio::test]
async fn pages_are_written_in_declared_order() {
    let x = Xochitl::new();
    let doc = id(1);
    x.document(
        &doc,
        "Notes",
        "",
        &[
            PageSpec::strokes("c"),
            PageSpec::blank("a"),
            PageSpec::strokes("b"),
            PageSpec::blank("gone").deleted(),
        ],
    );

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    let o = outcome(&output, &doc);
    assert_eq!(o.state, DocumentState::Assembled);
    assert_eq!(o.pages_total, 3);
    assert_eq!(o.pages_written, 3);

    let plan = read_plan(&x.output("Notes.pdf"));
    assert_eq!(plan_page_ids(&plan), ["c", "a", "b"]);
    assert_eq!(plan_page_kinds(&plan), ["strokes", "blank", "strokes"]);
    assert_eq!(plan["pages"][2]["number"], 3);
    assert!(output.issues.is_empty(), "{:?}", output.issues);
    assert_eq!(output.summary.exit_code(), 0);
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let x = Xochitl::new();
    let folder = id(1);
    x.folder(&folder, "Work", "");
    for n in 2..6 {
        let pages: Vec<PageSpec> = (0..n).map(|p| PageSpec::strokes(&format!("p{p}"))).collect();
        x.document(&id(n), &format!("Doc {n}"), &folder, &pages);
    }
    let config = ConversionConfig {
        concurrency: 3,
        page_concurrency: 2,
        ..fake_config()
    };

    let first = convert(x.source(), x.dest(), &config).await.unwrap();
    let files_first = x.written_files();
    let plans_first: Vec<_> = files_first
        .iter()
        .map(|f| read_plan(&x.output(f)))
        .collect();

    let second = convert(x.source(), x.dest(), &config).await.unwrap();
    let plans_second: Vec<_> = x
        .written_files()
        .iter()
        .map(|f| read_plan(&x.output(f)))
        .collect();

    assert_eq!(files_first, x.written_files());
    assert_eq!(plans_first, plans_second);
    let order = |o: &rmtree::ConversionOutput| -> Vec<_> {
        o.documents
            .iter()
            .map(|d| (d.output.clone(), d.pages_written))
            .collect()
    };
    assert_eq!(order(&first), order(&second));
}

// ── Incompatible stroke formats ──────────────────────────────────────────────

fn five_pages_two_legacy(x: &Xochitl, doc: &str) {
    x.document(
        doc,
        "Mixed",
        "",
        &[
            PageSpec::strokes("p1"),
            PageSpec::with_lines("p2", 5),
            PageSpec::strokes("p3"),
            PageSpec::with_lines("p4", 5),
            PageSpec::strokes("p5"),
        ],
    );
}

#[tokio::test]
async fn legacy_pages_are_dropped_by_default() {
    let x = Xochitl::new();
    let doc = id(1);
    five_pages_two_legacy(&x, &doc);

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    let o = outcome(&output, &doc);
    assert_eq!(o.state, DocumentState::Assembled);
    assert_eq!(o.pages_total, 5);
    assert_eq!(o.pages_written, 3);
    assert_eq!(plan_page_ids(&read_plan(&x.output("Mixed.pdf"))), ["p1", "p3", "p5"]);

    let compat: Vec<_> = output
        .issues
        .issues()
        .iter()
        .filter(|i| i.kind == IssueKind::Compatibility)
        .collect();
    assert_eq!(compat.len(), 2);
    assert!(compat.iter().all(|i| i.severity == Severity::Error));
    assert_eq!(compat[0].page, Some(2));
    assert_eq!(compat[1].page, Some(4));
    assert_eq!(output.summary.exit_code(), 0);
}

#[tokio::test]
async fn legacy_pages_become_placeholders_when_included() {
    let x = Xochitl::new();
    let doc = id(1);
    five_pages_two_legacy(&x, &doc);
    let config = ConversionConfig {
        include_incompatible: true,
        ..fake_config()
    };

    let output = convert(x.source(), x.dest(), &config).await.unwrap();

    let o = outcome(&output, &doc);
    assert_eq!(o.state, DocumentState::PartiallyAssembled);
    assert_eq!(o.pages_written, 5);
    assert_eq!(o.placeholders, 2);
    assert_eq!(
        plan_page_kinds(&read_plan(&x.output("Mixed.pdf"))),
        ["strokes", "placeholder", "strokes", "placeholder", "strokes"]
    );
    assert!(output
        .issues
        .issues()
        .iter()
        .filter(|i| i.kind == IssueKind::Compatibility)
        .all(|i| i.severity == Severity::Warning));
}

#[tokio::test]
async fn unknown_stroke_version_drops_only_that_page() {
    let x = Xochitl::new();
    let doc = id(1);
    x.document(
        &doc,
        "Future",
        "",
        &[
            PageSpec::strokes("p1"),
            PageSpec::with_lines("p2", 7),
            PageSpec::strokes("p3"),
        ],
    );

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    let o = outcome(&output, &doc);
    assert_eq!(o.state, DocumentState::Assembled);
    assert_eq!(o.pages_written, 2);
    assert_eq!(plan_page_ids(&read_plan(&x.output("Future.pdf"))), ["p1", "p3"]);
    let issues: Vec<_> = output.issues.for_entry(&doc).collect();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Compatibility);
    assert_eq!(issues[0].page_id.as_deref(), Some("p2"));
    assert_eq!(output.summary.exit_code(), 0);
}

#[tokio::test]
async fn unsupported_content_version_is_skipped() {
    let x = Xochitl::new();
    let doc = id(1);
    x.metadata(&doc, "DocumentType", "Future", "");
    x.write(
        &format!("{doc}.content"),
        r#"{"formatVersion":3,"pageCount":1,"cPages":{"pages":[{"id":"p1"}]}}"#,
    );
    x.write(&format!("{doc}/p1.rm"), lines_file(6));

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    let o = outcome(&output, &doc);
    assert_eq!(o.state, DocumentState::Skipped);
    assert!(o.reason.as_deref().unwrap().contains("version 3"));
    assert!(!x.output("Future.pdf").exists());
    assert_eq!(output.issues.count(IssueKind::Compatibility), 1);
    assert_eq!(output.summary.skipped, 1);
    assert_eq!(output.summary.exit_code(), 0);
}

// ── Broken entries ───────────────────────────────────────────────────────────

#[tokio::test]
async fn entry_without_content_is_excluded() {
    let x = Xochitl::new();
    let good = id(1);
    let broken = id(2);
    x.document(&good, "Good", "", &[PageSpec::strokes("p1")]);
    x.document(&broken, "Broken", "", &[PageSpec::strokes("p1")]);
    x.remove(&format!("{broken}.content"));

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    assert_eq!(output.summary.documents, 1);
    assert_eq!(x.written_files(), ["Good.pdf"]);
    let issues: Vec<_> = output.issues.for_entry(&broken).collect();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Assertion);
    assert!(issues[0].message.contains(".content"));
}

#[tokio::test]
async fn structural_assertion_fails_the_document_unless_ignored() {
    let x = Xochitl::new();
    let doc = id(1);
    x.document(
        &doc,
        "Edited",
        "",
        &[PageSpec::strokes("p1"), PageSpec::strokes("p2").deleted()],
    );

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();
    let o = outcome(&output, &doc);
    assert_eq!(o.state, DocumentState::Failed);
    assert!(o.reason.as_deref().unwrap().contains("p2"));
    assert!(!x.output("Edited.pdf").exists());
    // The only attempted document failed.
    assert_eq!(output.summary.exit_code(), 3);

    let lenient = ConversionConfig {
        ignore_assertions: true,
        ..fake_config()
    };
    let output = convert(x.source(), x.dest(), &lenient).await.unwrap();
    assert_eq!(outcome(&output, &doc).state, DocumentState::Assembled);
    let assertion = output
        .issues
        .issues()
        .iter()
        .find(|i| i.kind == IssueKind::Assertion)
        .unwrap();
    assert_eq!(assertion.severity, Severity::Warning);
    assert_eq!(output.summary.exit_code(), 0);
}

#[tokio::test]
async fn one_failure_among_successes_exits_two() {
    let x = Xochitl::new();
    x.document(&id(1), "Fine", "", &[PageSpec::strokes("p1")]);
    x.document(
        &id(2),
        "Broken",
        "",
        &[PageSpec::strokes("p1"), PageSpec::strokes("p1")],
    );

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    assert_eq!(output.summary.assembled, 1);
    assert_eq!(output.summary.failed, 1);
    assert_eq!(output.summary.exit_code(), 2);
}

// ── Tree shape ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn folders_are_mirrored_and_orphans_reattached() {
    let x = Xochitl::new();
    let work = id(1);
    let empty = id(2);
    let plan = id(3);
    let orphan = id(4);
    x.folder(&work, "Work", "");
    x.folder(&empty, "Empty", &work);
    x.document(&plan, "Plan", &work, &[PageSpec::strokes("p1")]);
    x.document(&orphan, "Orphan", &id(99), &[PageSpec::strokes("p1")]);

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    assert_eq!(x.written_files(), ["Orphan.pdf", "Work/Plan.pdf"]);
    assert!(x.output("Work/Empty").is_dir());
    assert_eq!(output.summary.folders, 2);

    let issues: Vec<_> = output.issues.for_entry(&orphan).collect();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].message.contains("reattached to root"));
}

#[tokio::test]
async fn sibling_name_collisions_get_suffixes() {
    let x = Xochitl::new();
    x.document(&id(1), "Notes", "", &[PageSpec::strokes("a")]);
    x.document(&id(2), "notes", "", &[PageSpec::strokes("b")]);
    x.document(&id(3), "Notes/Draft", "", &[PageSpec::strokes("c")]);

    convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    assert_eq!(
        x.written_files(),
        ["Notes.pdf", "NotesDraft.pdf", "notes (2).pdf"]
    );
    assert_eq!(plan_page_ids(&read_plan(&x.output("notes (2).pdf"))), ["b"]);
}

#[tokio::test]
async fn trash_is_converted_unless_skipped() {
    let x = Xochitl::new();
    x.document(&id(1), "Current", "", &[PageSpec::strokes("p1")]);
    x.document(&id(2), "Old", "trash", &[PageSpec::strokes("p1")]);

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();
    assert_eq!(x.written_files(), ["Current.pdf", "_trash/Old.pdf"]);
    assert_eq!(output.summary.documents, 2);

    let x = Xochitl::new();
    x.document(&id(1), "Current", "", &[PageSpec::strokes("p1")]);
    x.document(&id(2), "Old", "trash", &[PageSpec::strokes("p1")]);
    let config = ConversionConfig {
        include_trash: false,
        ..fake_config()
    };
    let output = convert(x.source(), x.dest(), &config).await.unwrap();
    assert_eq!(x.written_files(), ["Current.pdf"]);
    assert_eq!(output.summary.documents, 1);
}

// ── Backgrounds ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_template_is_reported_and_page_kept() {
    let x = Xochitl::new();
    let templates = x.source().parent().unwrap().join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    std::fs::write(templates.join("P Grid medium.pdf"), b"%PDF-1.7").unwrap();

    let doc = id(1);
    x.document(
        &doc,
        "Lined",
        "",
        &[
            PageSpec::strokes("p1").template("P Grid medium"),
            PageSpec::strokes("p2").template("P Does not exist"),
            PageSpec::strokes("p3").template("Blank"),
        ],
    );
    let config = ConversionConfig {
        templates_dir: Some(templates.clone()),
        ..fake_config()
    };

    let output = convert(x.source(), x.dest(), &config).await.unwrap();

    assert_eq!(outcome(&output, &doc).state, DocumentState::Assembled);
    let plan = read_plan(&x.output("Lined.pdf"));
    let pages = plan["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0]["background"]["source"]["kind"], "template");
    assert_eq!(pages[0]["background"]["source"]["name"], "P Grid medium");
    assert!(pages[1]["background"].is_null());
    assert!(pages[2]["background"].is_null());

    let template_issues: Vec<_> = output
        .issues
        .issues()
        .iter()
        .filter(|i| i.kind == IssueKind::Template)
        .collect();
    assert_eq!(template_issues.len(), 1);
    assert_eq!(template_issues[0].page, Some(2));
    assert!(template_issues[0].message.contains("P Does not exist"));
}

#[tokio::test]
async fn stock_templates_need_no_templates_folder() {
    let x = Xochitl::new();
    let doc = id(1);
    x.document_v1(
        &doc,
        "Lined",
        "",
        &[
            PageSpec::strokes("p1").template("P Lines small"),
            PageSpec::blank("p2").template("Grid medium"),
        ],
    );

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    assert!(output.issues.is_empty(), "{:?}", output.issues);
    let plan = read_plan(&x.output("Lined.pdf"));
    let pages = plan["pages"].as_array().unwrap();
    assert_eq!(pages[0]["background"]["file"]["kind"], "bundled");
    assert_eq!(pages[0]["background"]["file"]["filename"], "P Lines small");
    assert_eq!(pages[1]["background"]["file"]["filename"], "P Grid medium");
    assert_eq!(pages[1]["background"]["source"]["name"], "Grid medium");
}

#[tokio::test]
async fn version_one_pages_map_onto_the_document_pdf() {
    let x = Xochitl::new();
    let doc = id(1);
    x.document_v1(
        &doc,
        "Annotated",
        "",
        &[PageSpec::blank("p1"), PageSpec::strokes("p2")],
    );
    x.background_pdf(&doc);

    convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    let plan = read_plan(&x.output("Annotated.pdf"));
    assert_eq!(plan["pages"][0]["background"]["page"], 0);
    assert_eq!(plan["pages"][1]["background"]["page"], 1);
    assert_eq!(plan["pages"][1]["background"]["source"]["kind"], "document");
}

#[tokio::test]
async fn redir_beyond_the_pdf_fails_the_document() {
    let x = Xochitl::new();
    let doc = id(1);
    x.document(&doc, "Paper", "", &[PageSpec::strokes("p1").redir(3)]);
    x.background_pdf(&doc);
    let renderer = Arc::new(FakeRenderer::default());
    let config = config_with(
        renderer,
        FakeBackend::with_page_count(&format!("{doc}.pdf"), 2),
    );

    let output = convert(x.source(), x.dest(), &config).await.unwrap();

    let o = outcome(&output, &doc);
    assert_eq!(o.state, DocumentState::Failed);
    assert!(o.reason.as_deref().unwrap().contains("2 pages"));
    assert!(!x.output("Paper.pdf").exists());
}

#[tokio::test]
async fn pdf_without_strokes_is_copied_verbatim() {
    let x = Xochitl::new();
    let doc = id(1);
    x.document(
        &doc,
        "Imported",
        "",
        &[PageSpec::blank("p1").redir(0), PageSpec::blank("p2").redir(1)],
    );
    let pdf = x.background_pdf(&doc);
    let renderer = Arc::new(FakeRenderer::default());
    let config = config_with(Arc::clone(&renderer), FakeBackend::default());

    let output = convert(x.source(), x.dest(), &config).await.unwrap();

    assert_eq!(outcome(&output, &doc).state, DocumentState::Assembled);
    assert_eq!(
        std::fs::read(x.output("Imported.pdf")).unwrap(),
        std::fs::read(pdf).unwrap()
    );
    assert_eq!(renderer.calls(), 0);
}

// ── Render failures ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Events {
    started: AtomicUsize,
    page_errors: AtomicUsize,
    completed: AtomicUsize,
}

impl ConversionProgressCallback for Events {
    fn on_conversion_start(&self, total_documents: usize) {
        self.started.store(total_documents, Ordering::SeqCst);
    }

    fn on_page_error(&self, _uuid: &str, _page_num: usize, _error: &str) {
        self.page_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_document_complete(&self, _outcome: &DocumentOutcome) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn render_failure_keeps_a_placeholder_page() {
    let x = Xochitl::new();
    let doc = id(1);
    x.document(
        &doc,
        "Sketch",
        "",
        &[
            PageSpec::strokes("ok1"),
            PageSpec::strokes("bad"),
            PageSpec::strokes("ok2"),
        ],
    );
    x.document(&id(2), "Other", "", &[PageSpec::strokes("p1")]);
    let events = Arc::new(Events::default());
    let config = ConversionConfig {
        progress_callback: Some(events.clone() as Arc<dyn ConversionProgressCallback>),
        ..config_with(
            Arc::new(FakeRenderer::failing_on(&["bad"])),
            FakeBackend::default(),
        )
    };

    let output = convert(x.source(), x.dest(), &config).await.unwrap();

    let o = outcome(&output, &doc);
    assert_eq!(o.state, DocumentState::PartiallyAssembled);
    assert_eq!(o.pages_written, 3);
    assert_eq!(o.placeholders, 1);
    assert_eq!(
        plan_page_kinds(&read_plan(&x.output("Sketch.pdf"))),
        ["strokes", "placeholder", "strokes"]
    );

    let render: Vec<_> = output.issues.for_entry(&doc).collect();
    assert_eq!(render.len(), 1);
    assert_eq!(render[0].kind, IssueKind::Render);
    assert_eq!(render[0].page_id.as_deref(), Some("bad"));

    assert_eq!(events.started.load(Ordering::SeqCst), 2);
    assert_eq!(events.page_errors.load(Ordering::SeqCst), 1);
    assert_eq!(events.completed.load(Ordering::SeqCst), 2);
    assert_eq!(output.summary.exit_code(), 0);
}

#[tokio::test]
async fn debug_mode_keeps_rendered_svgs() {
    let x = Xochitl::new();
    x.document(
        &id(1),
        "Notes",
        "",
        &[PageSpec::strokes("p1"), PageSpec::blank("p2")],
    );
    let config = ConversionConfig {
        keep_svg: true,
        ..fake_config()
    };

    convert(x.source(), x.dest(), &config).await.unwrap();

    assert_eq!(x.written_files(), ["Notes.1.svg", "Notes.pdf"]);
    let svg = std::fs::read_to_string(x.output("Notes.1.svg")).unwrap();
    assert!(svg.contains("<title>p1</title>"));
}

// ── Run control ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_run_skips_remaining_documents() {
    let x = Xochitl::new();
    x.folder(&id(9), "Kept", "");
    for n in 1..4 {
        x.document(&id(n), &format!("Doc {n}"), "", &[PageSpec::strokes("p1")]);
    }
    let flag = CancellationFlag::new();
    flag.cancel();
    let config = ConversionConfig {
        cancellation: Some(flag),
        ..fake_config()
    };

    let output = convert(x.source(), x.dest(), &config).await.unwrap();

    assert!(output.summary.cancelled);
    assert_eq!(output.summary.skipped, 3);
    assert!(output
        .documents
        .iter()
        .all(|d| d.reason.as_deref() == Some("cancelled")));
    assert!(x.written_files().is_empty());
    assert_eq!(output.summary.exit_code(), 0);
}

#[tokio::test]
async fn compatibility_check_writes_nothing() {
    let x = Xochitl::new();
    let mixed = id(1);
    let clean = id(2);
    five_pages_two_legacy(&x, &mixed);
    x.document(&clean, "Clean", "", &[PageSpec::strokes("p1")]);

    let report = check_compatibility(x.source(), &ConversionConfig::default())
        .await
        .unwrap();

    assert!(!x.dest().exists());
    assert_eq!(report.documents.len(), 2);
    let m = report.documents.iter().find(|d| d.uuid == mixed).unwrap();
    assert_eq!(m.status, CheckStatus::Ok);
    assert_eq!((m.pages, m.kept_pages), (5, 3));
    assert_eq!(report.count(CheckStatus::Ok), 2);
    assert_eq!(report.exit_code(), 2);

    let lenient = ConversionConfig {
        include_incompatible: true,
        ..Default::default()
    };
    let report = check_compatibility(x.source(), &lenient).await.unwrap();
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn stream_yields_every_document() {
    let x = Xochitl::new();
    for n in 1..5 {
        x.document(&id(n), &format!("Doc {n}"), "", &[PageSpec::strokes("p1")]);
    }
    let sketch = id(5);
    x.document(
        &sketch,
        "Sketch",
        "",
        &[PageSpec::strokes("ok"), PageSpec::strokes("bad")],
    );
    let config = config_with(
        Arc::new(FakeRenderer::failing_on(&["bad"])),
        FakeBackend::default(),
    );

    let stream = convert_stream(x.source(), x.dest(), &config).await.unwrap();
    assert!(stream.issues.is_empty());
    let mut runs: Vec<DocumentRun> = stream.documents.collect().await;
    runs.sort_by(|a, b| a.outcome.output.cmp(&b.outcome.output));

    assert_eq!(runs.len(), 5);
    assert_eq!(x.written_files().len(), 5);
    let partial = runs.iter().find(|r| r.outcome.uuid == sketch).unwrap();
    assert_eq!(partial.outcome.state, DocumentState::PartiallyAssembled);
    let render: Vec<_> = partial.issues.issues().iter().collect();
    assert_eq!(render.len(), 1);
    assert_eq!(render[0].kind, IssueKind::Render);
    assert_eq!(render[0].page_id.as_deref(), Some("bad"));
    assert!(runs
        .iter()
        .filter(|r| r.outcome.uuid != sketch)
        .all(|r| r.outcome.state == DocumentState::Assembled && r.issues.is_empty()));
}

#[tokio::test]
async fn finished_stream_merges_scan_and_document_issues() {
    let x = Xochitl::new();
    let doc = id(1);
    x.document(&doc, "Sketch", "", &[PageSpec::strokes("bad")]);
    // Metadata without content: excluded at scan time.
    let orphan = id(2);
    x.metadata(&orphan, "DocumentType", "Lost", "");
    let config = config_with(
        Arc::new(FakeRenderer::failing_on(&["bad"])),
        FakeBackend::default(),
    );

    let stream = convert_stream(x.source(), x.dest(), &config).await.unwrap();
    assert_eq!(stream.issues.for_entry(&orphan).count(), 1);
    let output = stream.finish().await;

    assert_eq!(output.documents.len(), 1);
    assert_eq!(output.summary.partially_assembled, 1);
    assert_eq!(output.issues.for_entry(&orphan).count(), 1);
    assert_eq!(output.issues.count(IssueKind::Render), 1);
    assert_eq!(output.summary.exit_code(), 0);
}

#[tokio::test]
async fn unmirrorable_folder_is_reported() {
    let x = Xochitl::new();
    let folder = id(9);
    x.folder(&folder, "Kept", "");
    x.document(&id(1), "Notes", "", &[PageSpec::strokes("p1")]);
    std::fs::create_dir_all(x.dest()).unwrap();
    // A regular file where the folder should go.
    std::fs::write(x.output("Kept"), b"").unwrap();

    let output = convert(x.source(), x.dest(), &fake_config()).await.unwrap();

    assert_eq!(output.summary.folders, 0);
    let issues: Vec<_> = output.issues.for_entry(&folder).collect();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Output);
    assert_eq!(issues[0].severity, Severity::Error);
    assert_eq!(outcome(&output, &id(1)).state, DocumentState::Assembled);
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_source_is_fatal() {
    let x = Xochitl::new();
    let err = convert(x.source().join("nope"), x.dest(), &fake_config())
        .await
        .unwrap_err();
    assert!(matches!(err, RmTreeError::SourceNotFound { .. }), "{err}");
}

#[tokio::test]
async fn missing_renderer_is_fatal() {
    let x = Xochitl::new();
    x.document(&id(1), "Notes", "", &[PageSpec::strokes("p1")]);
    let config = ConversionConfig {
        rmc_path: Some(x.source().join("no-rmc")),
        pdf_backend: Some(Arc::new(FakeBackend::default())),
        ..Default::default()
    };

    let err = convert(x.source(), x.dest(), &config).await.unwrap_err();
    assert!(matches!(err, RmTreeError::RendererUnavailable(_)), "{err}");
}
