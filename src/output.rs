//! Result types returned by the conversion entry points.

use crate::report::IssueReport;
use serde::Serialize;
use std::path::PathBuf;

/// Lifecycle of one document through the pipeline.
///
/// ```text
/// Discovered ─▶ CompatibilityChecked ─┬─▶ Skipped
///                                     └─▶ Rendering ─┬─▶ Assembled
///                                                    ├─▶ PartiallyAssembled
///                                                    └─▶ Failed
/// ```
///
/// A structural failure found by the checker goes straight from
/// `CompatibilityChecked` to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Discovered,
    CompatibilityChecked,
    Rendering,
    Skipped,
    Assembled,
    /// Written, but some pages are placeholders.
    PartiallyAssembled,
    Failed,
}

impl DocumentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DocumentState::Skipped
                | DocumentState::Assembled
                | DocumentState::PartiallyAssembled
                | DocumentState::Failed
        )
    }

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, next),
            (Discovered, CompatibilityChecked)
                | (Discovered, Skipped)
                | (CompatibilityChecked, Skipped)
                | (CompatibilityChecked, Rendering)
                | (CompatibilityChecked, Failed)
                | (Rendering, Assembled)
                | (Rendering, PartiallyAssembled)
                | (Rendering, Failed)
                | (Rendering, Skipped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentState::Discovered => "discovered",
            DocumentState::CompatibilityChecked => "checked",
            DocumentState::Rendering => "rendering",
            DocumentState::Skipped => "skipped",
            DocumentState::Assembled => "assembled",
            DocumentState::PartiallyAssembled => "partial",
            DocumentState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result for one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub uuid: String,
    pub name: String,
    /// Output path relative to the destination root.
    pub output: PathBuf,
    pub state: DocumentState,
    /// Live pages declared by the document.
    pub pages_total: usize,
    /// Pages in the written PDF (0 unless assembled).
    pub pages_written: usize,
    pub placeholders: usize,
    /// Why the document was skipped or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
}

impl DocumentOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(
            self.state,
            DocumentState::Assembled | DocumentState::PartiallyAssembled
        )
    }
}

/// Aggregate counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub documents: usize,
    pub assembled: usize,
    pub partially_assembled: usize,
    pub skipped: usize,
    pub failed: usize,
    pub folders: usize,
    pub pages_written: usize,
    /// The run was interrupted before every document started.
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &DocumentOutcome) {
        self.documents += 1;
        self.pages_written += outcome.pages_written;
        match outcome.state {
            DocumentState::Assembled => self.assembled += 1,
            DocumentState::PartiallyAssembled => self.partially_assembled += 1,
            DocumentState::Failed => self.failed += 1,
            _ => self.skipped += 1,
        }
    }

    /// Documents that went past the checker (written or failed).
    pub fn attempted(&self) -> usize {
        self.assembled + self.partially_assembled + self.failed
    }

    /// Process exit code for a conversion run.
    ///
    /// | Code | Meaning |
    /// |------|---------|
    /// | 0 | no document failed (skips and partial documents included) |
    /// | 2 | some documents failed |
    /// | 3 | every attempted document failed |
    pub fn exit_code(&self) -> i32 {
        match self.failed {
            0 => 0,
            n if n == self.attempted() => 3,
            _ => 2,
        }
    }
}

/// Everything a conversion run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// Outcomes ordered by output path.
    pub documents: Vec<DocumentOutcome>,
    pub issues: IssueReport,
    pub summary: RunSummary,
}

// ── Dry run ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Skip,
    Fail,
}

/// Verdict summary of one document in a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckedDocument {
    pub uuid: String,
    pub name: String,
    pub path: PathBuf,
    pub status: CheckStatus,
    pub pages: usize,
    pub kept_pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Output of a compatibility check. Nothing is written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompatibilityReport {
    pub documents: Vec<CheckedDocument>,
    pub issues: IssueReport,
}

impl CompatibilityReport {
    pub fn count(&self, status: CheckStatus) -> usize {
        self.documents.iter().filter(|d| d.status == status).count()
    }

    /// 0 when no error-severity issue was found, 2 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.issues.has_errors() {
            2
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Issue, IssueKind, Severity};

    fn outcome(state: DocumentState) -> DocumentOutcome {
        DocumentOutcome {
            uuid: "u".into(),
            name: "n".into(),
            output: PathBuf::from("n.pdf"),
            state,
            pages_total: 2,
            pages_written: if state == DocumentState::Assembled { 2 } else { 0 },
            placeholders: 0,
            reason: None,
            duration_ms: 1,
        }
    }

    fn summary(states: &[DocumentState]) -> RunSummary {
        let mut s = RunSummary::default();
        for st in states {
            s.record(&outcome(*st));
        }
        s
    }

    #[test]
    fn exit_codes() {
        use DocumentState::*;
        assert_eq!(summary(&[]).exit_code(), 0);
        assert_eq!(summary(&[Assembled, Skipped, PartiallyAssembled]).exit_code(), 0);
        assert_eq!(summary(&[Assembled, Failed]).exit_code(), 2);
        assert_eq!(summary(&[Failed, Failed, Skipped]).exit_code(), 3);
    }

    #[test]
    fn summary_counts() {
        use DocumentState::*;
        let s = summary(&[Assembled, Assembled, Skipped, Failed]);
        assert_eq!(s.documents, 4);
        assert_eq!(s.assembled, 2);
        assert_eq!(s.pages_written, 4);
        assert_eq!(s.attempted(), 3);
    }

    #[test]
    fn state_machine_edges() {
        use DocumentState::*;
        assert!(Discovered.can_transition_to(CompatibilityChecked));
        assert!(CompatibilityChecked.can_transition_to(Rendering));
        assert!(Rendering.can_transition_to(PartiallyAssembled));
        assert!(!Assembled.can_transition_to(Rendering));
        assert!(!Discovered.can_transition_to(Assembled));
        assert!(Failed.is_terminal());
        assert!(!Rendering.is_terminal());
    }

    #[test]
    fn check_exit_code_follows_errors() {
        let mut report = CompatibilityReport::default();
        assert_eq!(report.exit_code(), 0);
        report.issues.push(Issue::new(
            IssueKind::Template,
            Severity::Warning,
            "u",
            "n",
            "missing",
        ));
        assert_eq!(report.exit_code(), 0);
        report.issues.push(Issue::new(
            IssueKind::Compatibility,
            Severity::Error,
            "u",
            "n",
            "v5",
        ));
        assert_eq!(report.exit_code(), 2);
    }
}
