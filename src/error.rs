//! Error taxonomy
//!
//! File-level parse problems and resolution ambiguity are data (recorded on
//! the `FileRecord` and on unresolved edges). Everything here is raised.

use uuid::Uuid;

/// Result type alias for archintel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for archintel operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("No graph version has been published for project {0}")]
    NoPublishedGraph(Uuid),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("pipeline workers are not running")]
    WorkersStopped,
}

/// Rejected input. Raised before any work is done.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("source location is empty")]
    EmptyLocation,

    #[error("source location exceeds {max} characters")]
    LocationTooLong { max: usize },

    #[error("source location is not an accepted repository form: {0}")]
    UnsupportedForm(String),

    #[error("host '{0}' is not in the allowed host list")]
    HostNotAllowed(String),

    #[error("source location contains a forbidden pattern: {0}")]
    ForbiddenPattern(&'static str),

    #[error("source location must not embed a password")]
    EmbeddedPassword,

    #[error("repository path has more than {max} segments")]
    PathTooDeep { max: usize },

    #[error("question is empty")]
    EmptyQuestion,

    #[error("question exceeds {max} characters")]
    QuestionTooLong { max: usize },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Failure to obtain a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Worth retrying: timeouts, dropped connections, remote 5xx.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Retrying will not help, or the attempt ceiling was reached.
    #[error("fetch failed: {0}")]
    Permanent(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] std::io::Error),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Language-model provider failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider timed out: {0}")]
    Timeout(String),

    #[error("provider rate limited: {0}")]
    RateLimited(String),

    #[error("provider rejected input: {0}")]
    Invalid(String),
}

impl ProviderError {
    /// Timeouts and rate limits are retried; invalid input never is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Timeout(_) | ProviderError::RateLimited(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Timeout(_) => "timeout",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Invalid(_) => "invalid",
        }
    }
}

/// Fatal for one pipeline run. The prior published version stays visible.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("extraction stage failed: {0}")]
    Extract(String),

    #[error("graph build failed: {0}")]
    Build(String),

    #[error("storage failed: {0}")]
    Storage(String),

    #[error("run exceeded its {0} second limit")]
    TimedOut(u64),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

impl From<Error> for PipelineError {
    fn from(err: Error) -> Self {
        match err {
            Error::Fetch(e) => PipelineError::Fetch(e),
            Error::Pipeline(e) => e,
            other => PipelineError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_retry_classification() {
        assert!(ProviderError::Timeout("slow".into()).is_retryable());
        assert!(ProviderError::RateLimited("429".into()).is_retryable());
        assert!(!ProviderError::Invalid("too long".into()).is_retryable());
    }

    #[test]
    fn test_pipeline_error_from_nested_fetch() {
        let err: PipelineError = Error::Fetch(FetchError::Permanent("not found".into())).into();
        assert!(matches!(err, PipelineError::Fetch(FetchError::Permanent(_))));
    }
}
