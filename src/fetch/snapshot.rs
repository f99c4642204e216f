//! Snapshot capture
//!
//! Enumerates a fetched working tree with gitignore semantics plus a default
//! exclude list, hashes every file, and hashes the sorted manifest.

use crate::model::{ProjectId, Snapshot, SnapshotFile, SnapshotId};
use chrono::Utc;
use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_EXCLUDES: &[&str] = &[
    // Noise directories
    ".git/", "target/", "node_modules/", "venv/", ".venv/", "vendor/",
    "dist/", "build/", "out/", "coverage/", "__pycache__/", "*.egg-info/",
    ".archintel/", ".vscode/", ".idea/",

    // Database files
    "*.db", "*.sqlite", "*.sqlite3", "*.wal", "*.shm",

    // Lock files and binaries
    "*.lock", "package-lock.json", "*.log", "*.pyc", "*.pyo", "*.pyd", "*.class", "*.jar",
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.ico", "*.svg", "*.webp", "*.avif",
    "*.mp4", "*.webm", "*.mp3", "*.wav",
    "*.exe", "*.dll", "*.so", "*.dylib", "*.o", "*.a", "*.lib", "*.bin",
    "*.pdf", "*.zip", "*.tar", "*.gz", "*.7z", "*.rar", "*.wasm", "*.node",
];

pub struct IgnoreFilter {
    inner: Gitignore,
}

impl IgnoreFilter {
    pub fn new(root: &Path, extra_excludes: &[String]) -> Self {
        let mut builder = GitignoreBuilder::new(root);

        // 1. Repository .gitignore and .ignore
        builder.add(root.join(".gitignore"));
        builder.add(root.join(".ignore"));

        // 2. Defaults
        for pattern in DEFAULT_EXCLUDES {
            builder.add_line(None, pattern).ok();
        }

        // 3. Configured excludes
        for pattern in extra_excludes {
            if let Err(e) = builder.add_line(None, pattern) {
                warn!(pattern = %pattern, error = %e, "ignoring invalid exclude pattern");
            }
        }

        Self {
            inner: builder.build().unwrap_or_else(|_| Gitignore::empty()),
        }
    }

    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.inner.matched_path_or_any_parents(path, is_dir).is_ignore()
    }
}

/// `/`-separated path relative to `root`
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// blake3 over the sorted `(path, hash)` list
pub fn manifest_hash(files: &[SnapshotFile]) -> String {
    let mut entries: Vec<(&str, &str)> = files.iter().map(|f| (f.path.as_str(), f.content_hash.as_str())).collect();
    entries.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for (path, hash) in entries {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// Enumerate and hash every non-excluded file under `root`. Blocking.
pub fn scan_files(root: &Path, excludes: &[String]) -> std::io::Result<Vec<SnapshotFile>> {
    let filter = Arc::new(IgnoreFilter::new(root, excludes));
    let walk_root = root.to_path_buf();
    let entry_filter = Arc::clone(&filter);

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            match entry.path().strip_prefix(&walk_root) {
                Ok(rel) if !rel.as_os_str().is_empty() => !entry_filter.is_ignored(rel, is_dir),
                _ => true,
            }
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Some(path) = relative_path(root, entry.path()) else { continue };
        let bytes = std::fs::read(entry.path())?;
        files.push(SnapshotFile {
            path,
            content_hash: blake3::hash(&bytes).to_hex().to_string(),
            size: bytes.len() as u64,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(root = %root.display(), files = files.len(), "snapshot scanned");
    Ok(files)
}

/// Build the `Snapshot` for a tree that has already been materialized at `root`.
pub fn capture(
    id: SnapshotId,
    project_id: ProjectId,
    root: PathBuf,
    head_commit: Option<String>,
    excludes: &[String],
) -> std::io::Result<Snapshot> {
    let files = scan_files(&root, excludes)?;
    Ok(Snapshot {
        id,
        project_id,
        fetched_at: Utc::now(),
        content_hash: manifest_hash(&files),
        root,
        head_commit,
        files,
    })
}

/// Remove a snapshot directory, treating "already gone" as success.
pub fn remove_snapshot_dir(root: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(root) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
