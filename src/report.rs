//! The run-wide issue report.
//!
//! Every stage receives an `&mut IssueReport` (or returns its own) instead
//! of writing to shared state. Per-document reports are merged once the
//! document finishes, so concurrent documents never contend on it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What went wrong, independent of how bad it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The input uses a format version this tool does not support.
    Compatibility,
    /// The input deviates from the expected structure.
    Assertion,
    /// The external stroke renderer failed on a page.
    Render,
    /// A background template could not be resolved.
    Template,
    /// Something could not be written under the destination root.
    Output,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::Compatibility => "compatibility",
            IssueKind::Assertion => "assertion",
            IssueKind::Render => "render",
            IssueKind::Template => "template",
            IssueKind::Output => "output",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// One recorded problem, attributed to an entry and optionally a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    /// UUID of the offending entry.
    pub uuid: String,
    /// Display name of the entry (may be empty when metadata was unreadable).
    pub name: String,
    /// 1-indexed page number within the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn new(
        kind: IssueKind,
        severity: Severity,
        uuid: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            uuid: uuid.into(),
            name: name.into(),
            page: None,
            page_id: None,
            message: message.into(),
        }
    }

    /// Attribute the issue to a page.
    pub fn on_page(mut self, page_num: usize, page_id: impl Into<String>) -> Self {
        self.page = Some(page_num);
        self.page_id = Some(page_id.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}/{}] ", self.kind, level)?;
        if self.name.is_empty() {
            write!(f, "{}", self.uuid)?;
        } else {
            write!(f, "{} ({})", self.name, self.uuid)?;
        }
        if let Some(page) = self.page {
            write!(f, " page {page}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Append-only collection of [`Issue`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueReport {
    issues: Vec<Issue>,
}

impl IssueReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        tracing::debug!("{issue}");
        self.issues.push(issue);
    }

    /// Move every issue of `other` into `self`.
    pub fn merge(&mut self, other: IssueReport) {
        self.issues.extend(other.issues);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn for_entry<'a>(&'a self, uuid: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues.iter().filter(move |i| i.uuid == uuid)
    }

    /// Order issues by entry name, UUID and page for stable output.
    ///
    /// The sort is stable, so issues on the same page keep recording order.
    pub fn sort(&mut self) {
        self.issues
            .sort_by(|a, b| (&a.name, &a.uuid, a.page).cmp(&(&b.name, &b.uuid, b.page)));
    }
}

impl IntoIterator for IssueReport {
    type Item = Issue;
    type IntoIter = std::vec::IntoIter<Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.into_iter()
    }
}

impl<'a> IntoIterator for &'a IssueReport {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.iter()
    }
}
