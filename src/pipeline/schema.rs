//! Typed schemas for the `.metadata`, `.content` and `.pagedata` sidecars.
//!
//! The tablet writes loosely-typed JSON whose shape changed between firmware
//! releases. Instead of poking at `serde_json::Value` throughout the code,
//! each sidecar is parsed exactly once into an explicit Rust type here:
//!
//! * `.metadata` → [`MetadataSidecar`]. Any deviation is an error and the
//!   entry is excluded from the tree.
//! * `.content` → [`ContentSidecar`]. Invalid JSON is an error, but a
//!   schema deviation becomes [`ContentSidecar::Malformed`] so the
//!   compatibility checker can report it against the document (and salvage
//!   what it can when assertions are ignored).
//!
//! ## Content format versions
//!
//! | `formatVersion` | Page list | Per-page template |
//! |-----------------|-----------|-------------------|
//! | 1 | `pages: [uuid, …]` | `<uuid>.pagedata`, one name per line |
//! | 2 | `cPages.pages: [{id, deleted?, template?, redir?}, …]` | `template.value` |

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Why a sidecar could not be used at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("unexpected schema: {0}")]
    Schema(String),

    #[error("unknown entry type '{0}'")]
    UnknownType(String),
}

// ── .metadata ────────────────────────────────────────────────────────────────

/// Folder or document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Folder,
    Document,
}

impl EntryKind {
    /// Map the tablet's `type` string.
    pub fn from_type_str(s: &str) -> Option<Self> {
        match s {
            "CollectionType" => Some(EntryKind::Folder),
            "DocumentType" => Some(EntryKind::Document),
            _ => None,
        }
    }
}

/// Where an entry lives, as declared by its `parent` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParentRef {
    Root,
    Trash,
    Entry(String),
}

impl ParentRef {
    pub fn parse(s: &str) -> Self {
        match s {
            "" => ParentRef::Root,
            "trash" => ParentRef::Trash,
            uuid => ParentRef::Entry(uuid.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(rename = "type")]
    entry_type: String,
    visible_name: String,
    parent: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    pinned: bool,
}

/// A validated `.metadata` sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSidecar {
    pub kind: EntryKind,
    pub visible_name: String,
    pub parent: ParentRef,
    /// The tablet marks entries deleted before it writes a tombstone.
    pub deleted: bool,
    pub pinned: bool,
}

pub fn parse_metadata(bytes: &[u8]) -> Result<MetadataSidecar, SchemaError> {
    let raw: RawMetadata = serde_json::from_slice(bytes).map_err(|e| {
        if e.is_data() {
            SchemaError::Schema(e.to_string())
        } else {
            SchemaError::Json(e.to_string())
        }
    })?;
    let kind = EntryKind::from_type_str(&raw.entry_type)
        .ok_or_else(|| SchemaError::UnknownType(raw.entry_type.clone()))?;
    Ok(MetadataSidecar {
        kind,
        visible_name: raw.visible_name,
        parent: ParentRef::parse(&raw.parent),
        deleted: raw.deleted,
        pinned: raw.pinned,
    })
}

// ── .content ─────────────────────────────────────────────────────────────────

/// A last-writer-wins register as stored by format version 2.
#[derive(Debug, Clone, Deserialize)]
pub struct Lww<T> {
    pub value: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentV1 {
    pub page_count: usize,
    pub pages: Vec<String>,
    #[serde(default)]
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CPage {
    pub id: String,
    #[serde(default)]
    pub deleted: Option<Value>,
    #[serde(default)]
    pub template: Option<Lww<String>>,
    #[serde(default)]
    pub redir: Option<Lww<usize>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CPages {
    pub pages: Vec<CPage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentV2 {
    pub page_count: usize,
    pub c_pages: CPages,
    #[serde(default)]
    pub file_type: Option<String>,
}

/// One entry of the declared page list, independent of format version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDef {
    pub id: String,
    pub deleted: bool,
    pub template: Option<String>,
    /// Index into the document's background PDF.
    pub redir: Option<usize>,
}

impl PageDef {
    fn live(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            deleted: false,
            template: None,
            redir: None,
        }
    }
}

/// A parsed `.content` sidecar of a document.
#[derive(Debug, Clone)]
pub enum ContentSidecar {
    V1(ContentV1),
    V2(ContentV2),
    /// A `formatVersion` this tool does not handle.
    Unsupported { format_version: i64 },
    /// A supported (or missing) version whose body breaks the schema.
    Malformed {
        format_version: Option<i64>,
        reason: String,
        /// Pages recovered by a lenient walk of the JSON.
        salvaged: Vec<PageDef>,
    },
}

impl ContentSidecar {
    pub fn format_version(&self) -> Option<i64> {
        match self {
            ContentSidecar::V1(_) => Some(1),
            ContentSidecar::V2(_) => Some(2),
            ContentSidecar::Unsupported { format_version } => Some(*format_version),
            ContentSidecar::Malformed { format_version, .. } => *format_version,
        }
    }

    /// `pageCount` as declared, for supported versions.
    pub fn declared_page_count(&self) -> Option<usize> {
        match self {
            ContentSidecar::V1(c) => Some(c.page_count),
            ContentSidecar::V2(c) => Some(c.page_count),
            _ => None,
        }
    }

    pub fn file_type(&self) -> Option<&str> {
        match self {
            ContentSidecar::V1(c) => c.file_type.as_deref(),
            ContentSidecar::V2(c) => c.file_type.as_deref(),
            _ => None,
        }
    }

    /// Declared page list in order, deleted entries included.
    pub fn page_defs(&self) -> Vec<PageDef> {
        match self {
            ContentSidecar::V1(c) => c.pages.iter().map(PageDef::live).collect(),
            ContentSidecar::V2(c) => c
                .c_pages
                .pages
                .iter()
                .map(|p| PageDef {
                    id: p.id.clone(),
                    deleted: p.deleted.is_some(),
                    template: p.template.as_ref().map(|t| t.value.clone()),
                    redir: p.redir.as_ref().map(|r| r.value),
                })
                .collect(),
            ContentSidecar::Unsupported { .. } => Vec::new(),
            ContentSidecar::Malformed { salvaged, .. } => salvaged.clone(),
        }
    }
}

/// Parse a document's `.content`.
///
/// Only invalid JSON is an `Err`; everything else is classified.
pub fn parse_content(bytes: &[u8]) -> Result<ContentSidecar, SchemaError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| SchemaError::Json(e.to_string()))?;

    let format_version = match value.get("formatVersion") {
        Some(v) => match v.as_i64() {
            Some(n) => n,
            None => {
                return Ok(malformed(&value, None, format!("formatVersion is not an integer: {v}")))
            }
        },
        None => return Ok(malformed(&value, None, "missing field `formatVersion`".into())),
    };

    let parsed = match format_version {
        1 => serde_json::from_value::<ContentV1>(value.clone()).map(ContentSidecar::V1),
        2 => serde_json::from_value::<ContentV2>(value.clone()).map(ContentSidecar::V2),
        other => {
            return Ok(ContentSidecar::Unsupported {
                format_version: other,
            })
        }
    };

    Ok(parsed.unwrap_or_else(|e| malformed(&value, Some(format_version), e.to_string())))
}

fn malformed(value: &Value, format_version: Option<i64>, reason: String) -> ContentSidecar {
    ContentSidecar::Malformed {
        format_version,
        reason,
        salvaged: salvage_pages(value),
    }
}

/// Recover whatever page ids a broken `.content` still carries.
fn salvage_pages(value: &Value) -> Vec<PageDef> {
    if let Some(pages) = value.pointer("/cPages/pages").and_then(Value::as_array) {
        return pages
            .iter()
            .filter_map(|p| {
                let id = p.get("id")?.as_str()?;
                Some(PageDef {
                    id: id.to_string(),
                    deleted: p.get("deleted").is_some(),
                    template: p
                        .pointer("/template/value")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    redir: p
                        .pointer("/redir/value")
                        .and_then(Value::as_u64)
                        .map(|v| v as usize),
                })
            })
            .collect();
    }
    value
        .get("pages")
        .and_then(Value::as_array)
        .map(|pages| {
            pages
                .iter()
                .filter_map(Value::as_str)
                .map(PageDef::live)
                .collect()
        })
        .unwrap_or_default()
}

// ── .pagedata ────────────────────────────────────────────────────────────────

/// Per-page template names of a version 1 document, in page order.
pub fn parse_pagedata(text: &str) -> Vec<String> {
    text.lines().map(|l| l.trim().to_string()).collect()
}
