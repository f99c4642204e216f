//! Shallow git clone with retry
//!
//! The transfer itself sits behind [`Transport`] so the retry and cleanup
//! policy can be exercised without a network.

use super::location::{redact, validate_location};
use super::snapshot::{capture, remove_snapshot_dir};
use super::{FetchRequest, RepositoryFetcher};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::model::Snapshot;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const TRANSIENT_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection was reset",
    "could not resolve host",
    "temporary failure in name resolution",
    "the remote end hung up unexpectedly",
    "early eof",
    "rpc failed",
    "http 500", "http 502", "http 503", "http 504",
    "error: 500", "error: 502", "error: 503", "error: 504",
    "the requested url returned error: 5",
];

/// Classify git's stderr. Anything not recognisably transient is permanent
/// (authentication failures, missing repositories, bad refs).
pub fn classify_git_failure(stderr: &str) -> FetchError {
    let lower = stderr.to_ascii_lowercase();
    let message = stderr.trim().lines().last().unwrap_or("git clone failed").to_string();
    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        FetchError::Transient(message)
    } else {
        FetchError::Permanent(message)
    }
}

/// Moves repository contents onto local disk.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Shallow-clone `url` into `dest`, which does not exist yet.
    async fn clone_shallow(&self, url: &str, dest: &Path, timeout: Duration) -> Result<(), FetchError>;

    /// HEAD commit of a cloned tree, when it can be read.
    async fn head_commit(&self, dir: &Path) -> Option<String>;
}

/// The `git` executable.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

#[async_trait]
impl Transport for GitCli {
    async fn clone_shallow(&self, url: &str, dest: &Path, timeout: Duration) -> Result<(), FetchError> {
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--depth", "1", "--single-branch", "--no-tags", "--quiet"])
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "")
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(FetchError::Permanent(format!("could not run git: {e}"))),
            Err(_) => return Err(FetchError::Transient(format!("clone timed out after {}s", timeout.as_secs()))),
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(classify_git_failure(&String::from_utf8_lossy(&output.stderr)))
        }
    }

    async fn head_commit(&self, dir: &Path) -> Option<String> {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir)
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Fetcher that clones into `<workspace>/<project>/<snapshot>`.
pub struct GitFetcher {
    workspace: PathBuf,
    config: FetchConfig,
    transport: Arc<dyn Transport>,
}

impl GitFetcher {
    pub fn new(workspace: impl Into<PathBuf>, config: FetchConfig) -> Self {
        Self::with_transport(workspace, config, Arc::new(GitCli))
    }

    pub fn with_transport(workspace: impl Into<PathBuf>, config: FetchConfig, transport: Arc<dyn Transport>) -> Self {
        Self { workspace: workspace.into(), config, transport }
    }

    fn redact_error(err: FetchError, secret: Option<&str>) -> FetchError {
        match err {
            FetchError::Transient(m) => FetchError::Transient(redact(&m, secret)),
            FetchError::Permanent(m) => FetchError::Permanent(redact(&m, secret)),
            other => other,
        }
    }

    async fn clone_with_retry(&self, url: &str, dest: &Path, secret: Option<&str>) -> Result<(), FetchError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if let Err(e) = remove_snapshot_dir(dest) {
                return Err(FetchError::Snapshot(e));
            }
            let err = match self.transport.clone_shallow(url, dest, self.config.attempt_timeout()).await {
                Ok(()) => return Ok(()),
                Err(e) => Self::redact_error(e, secret),
            };

            if !err.is_transient() {
                return Err(err);
            }
            if attempt >= max_attempts {
                return Err(FetchError::Permanent(format!("gave up after {attempt} attempts: {err}")));
            }

            let delay = self.config.backoff(attempt);
            warn!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %err, "transient fetch failure, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl RepositoryFetcher for GitFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot, FetchError> {
        let location = validate_location(&request.location, &self.config.allowed_hosts)?;
        let secret = request.credential.as_deref();
        let dest = self
            .workspace
            .join(request.project_id.to_string())
            .join(request.snapshot_id.to_string());

        info!(project = %request.project_id, location = %redact(location.as_str(), secret), "fetching repository");
        let url = location.clone_url(secret);
        if let Err(e) = self.clone_with_retry(&url, &dest, secret).await {
            remove_snapshot_dir(&dest).ok();
            return Err(e);
        }

        let head = self.transport.head_commit(&dest).await;
        let excludes = self.config.exclude.clone();
        let (id, project_id, root) = (request.snapshot_id, request.project_id, dest.clone());
        let captured = tokio::task::spawn_blocking(move || capture(id, project_id, root, head, &excludes)).await;

        match captured {
            Ok(Ok(snapshot)) => {
                debug!(project = %project_id, files = snapshot.files.len(), hash = %snapshot.content_hash, "snapshot captured");
                Ok(snapshot)
            }
            Ok(Err(e)) => {
                remove_snapshot_dir(&dest).ok();
                Err(FetchError::Snapshot(e))
            }
            Err(e) => {
                remove_snapshot_dir(&dest).ok();
                Err(FetchError::Permanent(format!("snapshot task failed: {e}")))
            }
        }
    }
}
