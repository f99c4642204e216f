//! Graph versions
//!
//! A `GraphVersion` is the immutable output of one pipeline run. The
//! fingerprint is blake3 over the canonical edge lines, so two builds of the
//! same snapshot compare equal by fingerprint alone.

use super::{BuildOutput, SymbolGraph};
use crate::model::{FileRecord, ProjectId, SnapshotId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct GraphVersion {
    pub project_id: ProjectId,
    /// Monotonic per project, starting at 1
    pub version: u64,
    pub snapshot_id: SnapshotId,
    pub snapshot_hash: String,
    pub created_at: DateTime<Utc>,
    /// File records in path order
    pub files: Vec<FileRecord>,
    pub graph: SymbolGraph,
    pub fingerprint: String,
}

impl GraphVersion {
    pub fn new(
        project_id: ProjectId,
        version: u64,
        snapshot_id: SnapshotId,
        snapshot_hash: impl Into<String>,
        build: BuildOutput,
    ) -> Self {
        let fingerprint = edge_fingerprint(&build.graph);
        Self {
            project_id,
            version,
            snapshot_id,
            snapshot_hash: snapshot_hash.into(),
            created_at: Utc::now(),
            files: build.files,
            graph: build.graph,
            fingerprint,
        }
    }

    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.files[i])
    }
}

/// blake3 over the canonical edge list, one line per edge
pub fn edge_fingerprint(graph: &SymbolGraph) -> String {
    let mut hasher = blake3::Hasher::new();
    for edge in graph.all_edges() {
        hasher.update(edge.canonical_line().as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// File-level difference between two versions, by content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl VersionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Whether the file at `path` needs new derived output
    pub fn touches(&self, path: &str) -> bool {
        self.added.iter().chain(&self.changed).any(|p| p == path)
    }
}

/// Compare `b` against an older version `a`. Output lists are sorted.
pub fn diff_versions(a: &GraphVersion, b: &GraphVersion) -> VersionDiff {
    let old: BTreeMap<&str, &str> = a.files.iter().map(|f| (f.path.as_str(), f.content_hash.as_str())).collect();
    let new: BTreeMap<&str, &str> = b.files.iter().map(|f| (f.path.as_str(), f.content_hash.as_str())).collect();

    let mut diff = VersionDiff::default();
    for (path, hash) in &new {
        match old.get(path) {
            None => diff.added.push(path.to_string()),
            Some(previous) if previous != hash => diff.changed.push(path.to_string()),
            Some(_) => {}
        }
    }
    diff.removed = old.keys().filter(|p| !new.contains_key(*p)).map(|p| p.to_string()).collect();
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{extract_file, registry};
    use crate::config::ExtractConfig;
    use crate::graph::build_graph;
    use uuid::Uuid;

    fn version(project: ProjectId, seq: u64, files: &[(&str, &str)]) -> GraphVersion {
        let extractions = files
            .iter()
            .map(|(path, src)| extract_file(registry(), &project.to_string(), path, src.as_bytes(), &ExtractConfig::default()))
            .collect();
        GraphVersion::new(project, seq, Uuid::new_v4(), "hash", build_graph(extractions))
    }

    #[test]
    fn test_fingerprint_stable_across_builds() {
        let project = Uuid::new_v4();
        let files = [("a.py", "def f():\n    pass\n"), ("b.py", "from a import f\nf()\n")];
        let first = version(project, 1, &files);
        let second = version(project, 2, &files);
        assert_eq!(first.fingerprint, second.fingerprint);

        let edited = version(project, 3, &[("a.py", "def f():\n    pass\n"), ("b.py", "from a import f\n")]);
        assert_ne!(first.fingerprint, edited.fingerprint);
    }

    #[test]
    fn test_diff_versions() {
        let project = Uuid::new_v4();
        let a = version(project, 1, &[("keep.py", "x = 1\n"), ("edit.py", "y = 1\n"), ("gone.py", "z = 1\n")]);
        let b = version(project, 2, &[("keep.py", "x = 1\n"), ("edit.py", "y = 2\n"), ("new.py", "w = 1\n")]);

        let diff = diff_versions(&a, &b);
        assert_eq!(diff.added, vec!["new.py"]);
        assert_eq!(diff.removed, vec!["gone.py"]);
        assert_eq!(diff.changed, vec!["edit.py"]);
        assert!(diff.touches("edit.py"));
        assert!(!diff.touches("keep.py"));
        assert!(diff_versions(&a, &a).is_empty());
        assert!(b.file("edit.py").is_some());
    }
}
