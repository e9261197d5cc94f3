//! Stroke rendering: one `.rm` page to SVG, through an external tool.
//!
//! The pipeline only knows the [`StrokeRenderer`] trait. The production
//! implementation, [`RmcRenderer`], shells out to `rmc` via
//! [`rmc_bridge::Rmc`] and translates every [`RmcError`] into the local
//! [`RenderError`] taxonomy right here, so nothing downstream ever sees an
//! rmc-specific failure.
//!
//! Rendering blocks (it waits for a child process), so callers invoke it
//! from `tokio::task::spawn_blocking`.

use crate::error::RenderError;
use rmc_bridge::{FailureKind, Rmc, RmcError, ViewBox};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// SVG produced for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPage {
    pub svg: String,
    /// Root `viewBox`; rmc shifts the origin so strokes left of the page edge stay visible.
    #[serde(skip_serializing)]
    pub view_box: Option<ViewBox>,
}

impl RenderedPage {
    pub fn new(svg: impl Into<String>) -> Self {
        let svg = svg.into();
        let view_box = rmc_bridge::parse_view_box(&svg);
        Self { svg, view_box }
    }
}

/// Turns a v6 stroke file into SVG.
///
/// Implementations must be `Send + Sync`: pages of several documents are
/// rendered concurrently on the blocking pool.
pub trait StrokeRenderer: Send + Sync {
    fn render(&self, stroke: &Path) -> Result<RenderedPage, RenderError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "renderer"
    }
}

/// [`StrokeRenderer`] backed by the `rmc` command-line tool.
#[derive(Debug, Clone)]
pub struct RmcRenderer {
    rmc: Rmc,
}

impl RmcRenderer {
    /// Locate `rmc` via `RMC_PATH` or `PATH`.
    pub fn locate() -> Result<Self, RenderError> {
        Rmc::locate().map(|rmc| Self { rmc }).map_err(translate)
    }

    /// Use an explicit `rmc` executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            rmc: Rmc::from_path(program),
        }
    }

    pub fn program(&self) -> &Path {
        self.rmc.program()
    }
}

impl StrokeRenderer for RmcRenderer {
    fn render(&self, stroke: &Path) -> Result<RenderedPage, RenderError> {
        // The page may have been removed or locked since the scan.
        std::fs::File::open(stroke).map_err(|e| RenderError::Io {
            detail: format!("{}: {e}", stroke.display()),
        })?;
        let svg = self.rmc.render_svg(stroke).map_err(translate)?;
        let page = RenderedPage::new(svg);
        debug!(
            "rendered {} → {} bytes of SVG, viewBox {:?}",
            stroke.display(),
            page.svg.len(),
            page.view_box
        );
        Ok(page)
    }

    fn name(&self) -> &str {
        "rmc"
    }
}

/// The single place where rmc failures become [`RenderError`]s.
fn translate(e: RmcError) -> RenderError {
    match e {
        RmcError::NotFound => RenderError::Unavailable {
            detail: e.to_string(),
        },
        RmcError::Spawn { program, source } => RenderError::Unavailable {
            detail: format!("{}: {source}", program.display()),
        },
        RmcError::Failed { kind, detail, .. } => match kind {
            FailureKind::UnknownBlock => RenderError::UnknownBlock { detail },
            FailureKind::Assertion => RenderError::Assertion { detail },
            FailureKind::Unsupported | FailureKind::Other => RenderError::Other { detail },
        },
        RmcError::InvalidOutput(detail) => RenderError::Other { detail },
    }
}
