//! Centralized error types for gitctx using thiserror.
//!
//! Mirrors the error taxonomy named in the specification (§7): each
//! top-level variant of [`GitCtxError`] corresponds to one named kind and
//! wraps a focused sub-enum, the way a mature Rust CLI keeps "what went
//! wrong" (the variant) separate from "why" (the message).
use thiserror::Error;

/// Top-level error type. The process exit code is derived from the variant
/// via [`GitCtxError::exit_code`].
#[derive(Error, Debug)]
pub enum GitCtxError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(#[from] DimensionMismatchError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("walker error: {0}")]
    Walker(#[from] WalkerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("OpenAI API key not configured\nSet with: export OPENAI_API_KEY=sk-...\nOr add api_keys.openai to {0}")]
    MissingApiKey(String),

    #[error("unknown embedding model '{name}', available models: {available}")]
    UnknownModel { name: String, available: String },

    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("failed to parse configuration file '{path}': {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("config file '{path}' has insecure permissions ({mode:o}), expected 0600")]
    InsecurePermissions { path: String, mode: u32 },
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("path does not exist: {0}")]
    PathNotFound(String),

    #[error("not a git repository: {0}")]
    NotAGitRepository(String),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("embedding provider returned an error: {0}")]
    ProviderError(String),
}

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("rate limited after {attempts} attempts (retry-after honored: {retry_after_honored})")]
    Exhausted {
        attempts: u32,
        retry_after_honored: bool,
    },
}

#[derive(Error, Debug)]
#[error("expected {expected}-dimensional vector, got {actual}")]
pub struct DimensionMismatchError {
    pub expected: usize,
    pub actual: usize,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to open vector store at '{path}': {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("failed to write to table '{table}': {reason}")]
    WriteFailed { table: String, reason: String },

    #[error("failed to search table '{table}': {reason}")]
    SearchFailed { table: String, reason: String },

    #[error("failed to acquire exclusive lock on '{path}': {reason}")]
    LockFailed { path: String, reason: String },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

#[derive(Error, Debug)]
pub enum WalkerError {
    #[error("repository has no HEAD and no refs")]
    NoHead,

    #[error("failed to open repository at '{0}'")]
    RepoNotFound(String),

    #[error("failed to read object {0}")]
    ObjectReadFailed(String),
}

impl From<anyhow::Error> for GitCtxError {
    fn from(err: anyhow::Error) -> Self {
        GitCtxError::Other(format!("{err:#}"))
    }
}

impl GitCtxError {
    pub fn other(msg: impl Into<String>) -> Self {
        GitCtxError::Other(msg.into())
    }

    /// Process exit code per spec §6: 0 success, 1 fatal, 2 usage error,
    /// 130 cancellation. Cancellation is signalled out of band (SIGINT
    /// handling in `main`), so this only distinguishes 1 vs 2 here.
    pub fn exit_code(&self) -> i32 {
        match self {
            GitCtxError::Validation(_) => 2,
            _ => 1,
        }
    }

    /// Whether the failure is one the embedder/orchestrator already retried
    /// internally and is now reporting as exhausted (used to decide whether
    /// to skip-and-continue at the blob level vs abort).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GitCtxError::Network(_) | GitCtxError::RateLimit(_) | GitCtxError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_validation_is_two() {
        let err = GitCtxError::Validation(ValidationError::EmptyQuery);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn exit_code_other_is_one() {
        let err = GitCtxError::Storage(StorageError::SchemaMismatch("bad".into()));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn dimension_mismatch_message() {
        let err = DimensionMismatchError {
            expected: 3072,
            actual: 1536,
        };
        assert_eq!(err.to_string(), "expected 3072-dimensional vector, got 1536");
    }

    #[test]
    fn is_retryable_network() {
        let err = GitCtxError::Network(NetworkError::Timeout(30));
        assert!(err.is_retryable());
        let err = GitCtxError::Validation(ValidationError::EmptyQuery);
        assert!(!err.is_retryable());
    }

    #[test]
    fn missing_api_key_hint() {
        let err = ConfigurationError::MissingApiKey("~/.gitctx/config.yml".into());
        let msg = err.to_string();
        assert!(msg.contains("OPENAI_API_KEY"));
    }
}
