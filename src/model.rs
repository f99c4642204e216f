//! Project, snapshot, file, document and query records

use crate::language::Language;
use crate::pipeline::state::PipelineState;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type SnapshotId = Uuid;
pub type RunId = Uuid;

/// A registered repository and its pipeline bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub source_location: String,
    pub state: PipelineState,
    /// Sequence number of the published graph version
    pub current_version: Option<u64>,
    pub last_error: Option<String>,
    /// Set when the last run finished with degraded synthesis
    pub warning: Option<String>,
    pub active_snapshot: Option<SnapshotId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(source_location: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_location: source_location.into(),
            state: PipelineState::Registered,
            current_version: None,
            last_error: None,
            warning: None,
            active_snapshot: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One file in a snapshot manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub path: String,
    pub content_hash: String,
    pub size: u64,
}

/// An immutable local copy of a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub project_id: ProjectId,
    pub fetched_at: DateTime<Utc>,
    /// blake3 over the sorted `(path, hash)` manifest
    pub content_hash: String,
    pub root: PathBuf,
    pub head_commit: Option<String>,
    pub files: Vec<SnapshotFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStatus {
    Ok,
    Partial,
    Failed,
    Skipped,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Ok => "ok",
            ParseStatus::Partial => "partial",
            ParseStatus::Failed => "failed",
            ParseStatus::Skipped => "skipped",
        }
    }

    /// Whether symbols from this file made it into the graph
    pub fn has_symbols(&self) -> bool {
        matches!(self, ParseStatus::Ok | ParseStatus::Partial)
    }
}

impl FromStr for ParseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ok" => Ok(ParseStatus::Ok),
            "partial" => Ok(ParseStatus::Partial),
            "failed" => Ok(ParseStatus::Failed),
            "skipped" => Ok(ParseStatus::Skipped),
            _ => Err(Error::Corrupt(format!("Unknown parse status: {}", s))),
        }
    }
}

/// Per-file extraction outcome inside a graph version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: Language,
    pub content_hash: String,
    pub status: ParseStatus,
    pub reason: Option<String>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, language: Language, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language,
            content_hash: content_hash.into(),
            status: ParseStatus::Ok,
            reason: None,
        }
    }

    pub fn with_status(mut self, status: ParseStatus, reason: impl Into<String>) -> Self {
        self.status = status;
        self.reason = Some(reason.into());
        self
    }
}

/// What a document describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentTarget {
    File(String),
    Module(String),
    Project,
}

impl DocumentTarget {
    pub fn as_key(&self) -> String {
        match self {
            DocumentTarget::File(path) => format!("file:{path}"),
            DocumentTarget::Module(name) => format!("module:{name}"),
            DocumentTarget::Project => "project".to_string(),
        }
    }

    pub fn parse(key: &str) -> std::result::Result<Self, crate::ValidationError> {
        let invalid = |reason: &str| crate::ValidationError::InvalidField {
            field: "target",
            reason: reason.to_string(),
        };
        if key == "project" {
            return Ok(DocumentTarget::Project);
        }
        match key.split_once(':') {
            Some(("file", path)) if !path.is_empty() => Ok(DocumentTarget::File(path.to_string())),
            Some(("module", name)) if !name.is_empty() => Ok(DocumentTarget::Module(name.to_string())),
            _ => Err(invalid("expected `project`, `file:<path>` or `module:<name>`")),
        }
    }
}

impl std::fmt::Display for DocumentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

impl Serialize for DocumentTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_key())
    }
}

impl<'de> Deserialize<'de> for DocumentTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DocumentTarget::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Model-written prose
    Summary,
    /// Rendered symbol listing, no model involved
    Reference,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Summary => "summary",
            DocumentKind::Reference => "reference",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = crate::ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "summary" => Ok(DocumentKind::Summary),
            "reference" => Ok(DocumentKind::Reference),
            _ => Err(crate::ValidationError::InvalidField {
                field: "type",
                reason: format!("unknown document type '{s}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Generated,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Generated => "generated",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "generated" => Ok(DocumentStatus::Generated),
            "failed" => Ok(DocumentStatus::Failed),
            _ => Err(Error::Corrupt(format!("Unknown document status: {}", s))),
        }
    }
}

/// A generated document row. Rows are appended, never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub project_id: ProjectId,
    pub target: DocumentTarget,
    pub kind: DocumentKind,
    /// Graph version the context was taken from
    pub version: u64,
    pub status: DocumentStatus,
    pub content: Option<String>,
    pub source_fingerprint: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit row for one question put to the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub project_id: ProjectId,
    pub version: u64,
    pub question: String,
    pub subgraph_fingerprint: Option<String>,
    /// `None` stands for the no-context outcome
    pub answer: Option<String>,
    pub asked_at: DateTime<Utc>,
}
