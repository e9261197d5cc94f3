//! # rmc-bridge
//!
//! The narrow boundary between rmtree and the external stroke renderer.
//!
//! reMarkable pages are stored as `.rm` "lines" files. Parsing them is not
//! done here: the [rmc](https://github.com/ricklupton/rmc) command-line tool
//! already converts a v6 page into SVG, and this crate only
//!
//! 1. sniffs the ASCII header of a `.rm` file to learn its format version,
//! 2. finds the `rmc` executable (`RMC_PATH`, then `PATH`),
//! 3. runs `rmc -t svg <file>` and captures the SVG from stdout,
//! 4. classifies a failed run into a [`FailureKind`] so callers never have
//!    to pattern-match on Python tracebacks themselves.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rmc_bridge::{read_header, LinesHeader, Rmc};
//! use std::path::Path;
//!
//! let page = Path::new("xochitl/0c7e.../5b1f....rm");
//! if read_header(page)? == LinesHeader::Version(6) {
//!     let rmc = Rmc::locate()?;
//!     let svg = rmc.render_svg(page)?;
//!     println!("{} bytes of SVG", svg.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Environment variable overrides
//!
//! - `RMC_PATH` — path to the `rmc` executable; skips the `PATH` search.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

// ── Public constants ─────────────────────────────────────────────────────────

/// Every `.rm` file starts with this ASCII prefix followed by the version digit.
pub const HEADER_PREFIX: &[u8] = b"reMarkable .lines file, version=";

/// Length of the fixed header block (prefix, version, space padding).
pub const HEADER_LEN: usize = 43;

/// Screen geometry of the tablet, in device pixels.
pub const SCREEN_WIDTH: u32 = 1404;
pub const SCREEN_HEIGHT: u32 = 1872;
pub const SCREEN_DPI: u32 = 226;

/// Page size rmc uses for its SVG output, in PDF points.
pub const PAGE_WIDTH_PT: f32 = SCREEN_WIDTH as f32 * 72.0 / SCREEN_DPI as f32;
pub const PAGE_HEIGHT_PT: f32 = SCREEN_HEIGHT as f32 * 72.0 / SCREEN_DPI as f32;

/// Environment variable naming an explicit `rmc` executable.
pub const RMC_PATH_ENV: &str = "RMC_PATH";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by rmc-bridge operations.
#[derive(Error, Debug)]
pub enum RmcError {
    /// No `rmc` executable could be found.
    #[error("rmc executable not found (set {RMC_PATH_ENV} or install with `pipx install rmc`)")]
    NotFound,

    /// The executable exists but could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// rmc ran and exited unsuccessfully.
    #[error("rmc failed ({kind}, exit status {status:?}): {detail}")]
    Failed {
        kind: FailureKind,
        status: Option<i32>,
        detail: String,
    },

    /// rmc exited successfully but did not print an SVG document.
    #[error("rmc produced invalid output: {0}")]
    InvalidOutput(String),
}

/// Broad classification of an rmc failure, derived from its stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The scene contains a block type the parser does not know.
    UnknownBlock,
    /// The parser hit an internal consistency assertion.
    Assertion,
    /// The file is not a lines format the parser accepts.
    Unsupported,
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::UnknownBlock => "unknown block",
            FailureKind::Assertion => "assertion",
            FailureKind::Unsupported => "unsupported format",
            FailureKind::Other => "error",
        };
        f.write_str(s)
    }
}

// ── Header sniffing ──────────────────────────────────────────────────────────

/// The version announced by a `.rm` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinesHeader {
    Version(u8),
    /// The prefix is missing or not followed by a version number.
    Unrecognized,
}

impl LinesHeader {
    pub fn version(self) -> Option<u8> {
        match self {
            LinesHeader::Version(v) => Some(v),
            LinesHeader::Unrecognized => None,
        }
    }
}

/// Parse the header at the start of `bytes`.
pub fn sniff_header(bytes: &[u8]) -> LinesHeader {
    let Some(rest) = bytes.strip_prefix(HEADER_PREFIX) else {
        return LinesHeader::Unrecognized;
    };
    let digits: Vec<u8> = rest
        .iter()
        .copied()
        .take_while(u8::is_ascii_digit)
        .collect();
    std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse::<u8>().ok())
        .map_or(LinesHeader::Unrecognized, LinesHeader::Version)
}

/// Read the first bytes of a `.rm` file and sniff its header.
pub fn read_header(path: &Path) -> std::io::Result<LinesHeader> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    std::fs::File::open(path)?
        .take(HEADER_LEN as u64)
        .read_to_end(&mut buf)?;
    Ok(sniff_header(&buf))
}

// ── SVG geometry ─────────────────────────────────────────────────────────────

/// The `viewBox` of an rmc SVG: the origin shift and the drawing size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

static RE_VIEW_BOX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<svg\b[^>]*\bviewBox="\s*(-?[\d.]+)[\s,]+(-?[\d.]+)[\s,]+(-?[\d.]+)[\s,]+(-?[\d.]+)\s*""#,
    )
    .unwrap()
});

/// Extract the root element's `viewBox`, if any.
pub fn parse_view_box(svg: &str) -> Option<ViewBox> {
    let caps = RE_VIEW_BOX.captures(svg)?;
    let num = |i: usize| caps[i].parse::<f32>().ok();
    Some(ViewBox {
        x: num(1)?,
        y: num(2)?,
        width: num(3)?,
        height: num(4)?,
    })
}

// ── The rmc executable ───────────────────────────────────────────────────────

/// A located `rmc` executable.
#[derive(Debug, Clone)]
pub struct Rmc {
    program: PathBuf,
}

impl Rmc {
    /// Find `rmc` via `RMC_PATH`, then by searching `PATH`.
    pub fn locate() -> Result<Self, RmcError> {
        if let Some(p) = std::env::var_os(RMC_PATH_ENV) {
            let p = PathBuf::from(p);
            if p.is_file() {
                return Ok(Self::from_path(p));
            }
            debug!("{RMC_PATH_ENV} '{}' does not exist; searching PATH", p.display());
        }

        let path = std::env::var_os("PATH").unwrap_or_default();
        find_in_path(&path, executable_name())
            .map(Self::from_path)
            .ok_or(RmcError::NotFound)
    }

    /// Use an explicit executable without any lookup.
    pub fn from_path(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run `rmc -t svg <input>` and return the SVG text.
    ///
    /// Blocks until rmc exits.
    pub fn render_svg(&self, input: &Path) -> Result<String, RmcError> {
        debug!("rmc: rendering {}", input.display());
        let output = Command::new(&self.program)
            .arg("-t")
            .arg("svg")
            .arg(input)
            .output()
            .map_err(|source| RmcError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RmcError::Failed {
                kind: classify_failure(&stderr),
                status: output.status.code(),
                detail: summarise(&stderr),
            });
        }

        let svg = String::from_utf8(output.stdout)
            .map_err(|e| RmcError::InvalidOutput(format!("stdout is not UTF-8: {e}")))?;
        if !svg.contains("<svg") {
            return Err(RmcError::InvalidOutput(format!(
                "no <svg> element in {} bytes of output",
                svg.len()
            )));
        }
        Ok(svg)
    }
}

fn executable_name() -> &'static str {
    if cfg!(windows) {
        "rmc.exe"
    } else {
        "rmc"
    }
}

fn find_in_path(path: &OsString, name: &str) -> Option<PathBuf> {
    std::env::split_paths(path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

static RE_ASSERTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bAssertionError\b").unwrap());
static RE_UNKNOWN_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)unknown block|unexpected block|BlockOverflowError").unwrap());
static RE_UNSUPPORTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(unsupported|unknown|invalid) (file )?(version|header)").unwrap());

/// Map rmc's stderr to a [`FailureKind`].
pub fn classify_failure(stderr: &str) -> FailureKind {
    if RE_UNKNOWN_BLOCK.is_match(stderr) {
        FailureKind::UnknownBlock
    } else if RE_ASSERTION.is_match(stderr) {
        FailureKind::Assertion
    } else if RE_UNSUPPORTED.is_match(stderr) {
        FailureKind::Unsupported
    } else {
        FailureKind::Other
    }
}

/// Keep the last meaningful stderr line: for a traceback that is the exception.
fn summarise(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no diagnostic output");
    if line.chars().count() > 200 {
        let cut: String = line.chars().take(199).collect();
        format!("{cut}\u{2026}")
    } else {
        line.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
