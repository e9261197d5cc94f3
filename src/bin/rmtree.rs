//! CLI binary for rmtree.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig`, prints the report and sets the exit code.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rmtree::{
    check_compatibility, convert, CancellationFlag, CheckStatus, CompatibilityReport,
    ConversionConfig, ConversionOutput, ConversionProgressCallback, DocumentOutcome,
    DocumentState, IssueReport, ProgressCallback, RunSummary, Severity,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar counting finished documents, plus a
/// log line for every document that did not assemble cleanly.
struct CliProgressCallback {
    bar: ProgressBar,
    page_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Scanning");
        bar.set_message("reading sidecars…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_errors: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_documents: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>4}/{len} documents  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_documents as u64);
        self.bar.set_prefix("Converting");
        self.bar.set_message("");
        self.bar.reset_eta();
    }

    fn on_document_start(&self, _uuid: &str, name: &str, _total_pages: usize) {
        self.bar.set_message(name.to_string());
    }

    fn on_page_error(&self, _uuid: &str, _page_num: usize, _error: &str) {
        self.page_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn on_document_complete(&self, outcome: &DocumentOutcome) {
        let path = outcome.output.display().to_string();
        let reason = outcome.reason.as_deref().unwrap_or_default();
        match outcome.state {
            DocumentState::Failed => self
                .bar
                .println(format!("  {} {}  {}", red("✗"), path, red(reason))),
            DocumentState::PartiallyAssembled => self.bar.println(format!(
                "  {} {}  {}",
                yellow("◐"),
                path,
                dim(&format!(
                    "{}/{} pages are placeholders",
                    outcome.placeholders, outcome.pages_written
                ))
            )),
            DocumentState::Skipped => self
                .bar
                .println(format!("  {} {}  {}", dim("–"), dim(&path), dim(reason))),
            _ => {}
        }
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
        let page_errors = self.page_errors.load(Ordering::Relaxed);
        if page_errors > 0 {
            eprintln!(
                "{} {} pages could not be rendered and were kept as placeholders",
                yellow("⚠"),
                page_errors
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a backup of the tablet's xochitl folder
  rmtree convert ~/remarkable/xochitl ~/Documents/remarkable

  # Dry run: report what would be skipped or fail, write nothing
  rmtree convert --test-compatibility ~/remarkable/xochitl

  # Use the tablet's templates, keep legacy pages as placeholders
  rmtree convert --templates ~/remarkable/templates --include-incompatible xochitl out

  # Machine-readable report
  rmtree convert --json xochitl out > report.json

EXIT CODES:
  0  every document assembled, partially assembled or skipped
  1  fatal error (source unreadable, destination not writable, rmc missing)
  2  some documents failed
  3  every attempted document failed
  With --test-compatibility: 0 when no error was found, 2 otherwise.

ENVIRONMENT VARIABLES:
  RMC_PATH                Path to the rmc executable (default: looked up on PATH)
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Override the log filter (e.g. rmtree=debug)
  Every flag also reads RMTREE_<FLAG>, e.g. RMTREE_SKIP_TRASH=true.
"#;

/// Rebuild a reMarkable xochitl folder as a tree of PDF files.
#[derive(Parser, Debug)]
#[command(
    name = "rmtree",
    version,
    about = "Rebuild a reMarkable xochitl folder as a tree of PDF files",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert every notebook under SOURCE_DIR into DEST_DIR.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// The tablet's xochitl folder (or a copy of it).
    source_dir: PathBuf,

    /// Root of the PDF tree to write. Not needed with --test-compatibility.
    #[arg(required_unless_present = "test_compatibility")]
    dest_dir: Option<PathBuf>,

    /// Treat structural deviations in documents as warnings and convert anyway.
    #[arg(long, env = "RMTREE_IGNORE_ASSERTION")]
    ignore_assertion: bool,

    /// Only check compatibility and print the report; write nothing.
    #[arg(long, env = "RMTREE_TEST_COMPATIBILITY")]
    test_compatibility: bool,

    /// Keep pages in unsupported stroke formats (not v6) as blank placeholders.
    #[arg(long, env = "RMTREE_INCLUDE_INCOMPATIBLE")]
    include_incompatible: bool,

    /// Do not convert documents in the trash.
    #[arg(long, env = "RMTREE_SKIP_TRASH")]
    skip_trash: bool,

    /// Folder with template PDFs (and optionally templates.json); overrides
    /// the bundled stock templates.
    #[arg(long, env = "RMTREE_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Path to the rmc executable.
    #[arg(long, env = "RMC_PATH")]
    rmc: Option<PathBuf>,

    /// Also write each rendered page as <name>.<page>.svg.
    #[arg(long, env = "RMTREE_DEBUG")]
    debug: bool,

    /// Documents converted at the same time.
    #[arg(short, long, env = "RMTREE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Pages of one document rendered at the same time.
    #[arg(long, env = "RMTREE_PAGE_CONCURRENCY", default_value_t = 4)]
    page_concurrency: usize,

    /// Print the report as JSON on stdout.
    #[arg(long, env = "RMTREE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "RMTREE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RMTREE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RMTREE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Command::Convert(args) = Cli::parse().command;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !args.quiet && !args.no_progress && !args.json && !args.test_compatibility;
    let filter = if args.verbose {
        "debug"
    } else if args.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&args, None)?;

    // ── Dry run ──────────────────────────────────────────────────────────
    if args.test_compatibility {
        let report = check_compatibility(&args.source_dir, &config)
            .await
            .context("Compatibility check failed")?;
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else if !args.quiet {
            print_check_report(&report);
        }
        std::process::exit(report.exit_code());
    }

    let Some(dest_dir) = args.dest_dir.clone() else {
        anyhow::bail!("DEST_DIR is required unless --test-compatibility is given");
    };

    // ── Ensure PDFium engine is available ───────────────────────────────────
    // First run downloads the library (~30 MB); later runs only check the cache.
    #[cfg(feature = "pdfium")]
    ensure_pdfium(args.quiet)?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let mut config = build_config(&args, progress_cb)?;

    // ── Ctrl-C: stop starting new documents ──────────────────────────────
    let cancel = CancellationFlag::new();
    config.cancellation = Some(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} interrupted, finishing documents in progress…", yellow("⚠"));
            cancel.cancel();
        }
    });

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert(&args.source_dir, &dest_dir, &config)
        .await
        .context("Conversion failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !args.quiet {
        print_conversion_report(&output, &dest_dir);
    }

    std::process::exit(output.summary.exit_code());
}

/// Map CLI args to `ConversionConfig`.
fn build_config(args: &ConvertArgs, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .ignore_assertions(args.ignore_assertion)
        .include_incompatible(args.include_incompatible)
        .include_trash(!args.skip_trash)
        .keep_svg(args.debug)
        .concurrency(args.concurrency)
        .page_concurrency(args.page_concurrency);

    if let Some(ref dir) = args.templates {
        builder = builder.templates_dir(dir);
    }
    if let Some(ref rmc) = args.rmc {
        builder = builder.rmc_path(rmc);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(feature = "pdfium")]
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

// ── Reports ──────────────────────────────────────────────────────────────────

fn print_issues(issues: &IssueReport) {
    if issues.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("{}", bold(&format!("Issues ({})", issues.len())));
    for issue in issues.issues() {
        let marker = match issue.severity {
            Severity::Error => red("●"),
            Severity::Warning => yellow("●"),
        };
        eprintln!("  {marker} {issue}");
    }
}

fn print_check_report(report: &CompatibilityReport) {
    for doc in &report.documents {
        let status = match doc.status {
            CheckStatus::Ok => green("ok  "),
            CheckStatus::Skip => dim("skip"),
            CheckStatus::Fail => red("fail"),
        };
        let pages = if doc.kept_pages == doc.pages {
            format!("{} pages", doc.pages)
        } else {
            format!("{}/{} pages", doc.kept_pages, doc.pages)
        };
        let reason = doc.reason.as_deref().map(|r| format!("  {r}")).unwrap_or_default();
        println!("{status}  {}  {}{}", doc.path.display(), dim(&pages), dim(&reason));
    }
    print_issues(&report.issues);

    eprintln!();
    eprintln!(
        "{} {} documents: {} ok, {} skipped, {} failing",
        if report.exit_code() == 0 { green("✔") } else { red("✘") },
        bold(&report.documents.len().to_string()),
        report.count(CheckStatus::Ok),
        report.count(CheckStatus::Skip),
        report.count(CheckStatus::Fail),
    );
}

fn print_conversion_report(output: &ConversionOutput, dest: &std::path::Path) {
    let s = &output.summary;
    print_issues(&output.issues);

    eprintln!();
    let marker = match s.exit_code() {
        0 if s.partially_assembled == 0 => green("✔"),
        0 | 2 => cyan("⚠"),
        _ => red("✘"),
    };
    eprintln!(
        "{marker} {} documents  →  {}",
        bold(&s.documents.to_string()),
        bold(&dest.display().to_string())
    );
    eprintln!(
        "   {} assembled, {} partial, {} skipped, {} failed  {}",
        green(&s.assembled.to_string()),
        yellow(&s.partially_assembled.to_string()),
        s.skipped,
        red(&s.failed.to_string()),
        dim(&format!(
            "{} pages, {} folders, {}ms",
            s.pages_written, s.folders, s.duration_ms
        )),
    );
    if s.cancelled {
        eprintln!("   {}", yellow("interrupted: documents not started were skipped"));
    }
}
