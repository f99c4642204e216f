//! Repository fetching
//!
//! A fetcher turns a validated source location into an immutable local
//! snapshot. Locations are checked before any transfer starts.

pub mod git;
pub mod location;
pub mod snapshot;

pub use git::{GitCli, GitFetcher, Transport, classify_git_failure};
pub use location::{Location, TransferForm, redact, validate_location};
pub use snapshot::{IgnoreFilter, manifest_hash, remove_snapshot_dir};

use crate::error::FetchError;
use crate::model::{ProjectId, Snapshot, SnapshotId};
use async_trait::async_trait;

/// One fetch of one project.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub project_id: ProjectId,
    pub snapshot_id: SnapshotId,
    pub location: String,
    pub credential: Option<String>,
}

/// Produces snapshots from remote repositories.
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Fetch into a fresh directory. On error nothing is left on disk.
    async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot, FetchError>;
}
