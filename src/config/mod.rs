//! Settings for gitctx.
//!
//! Precedence (highest first): environment variables (`GITCTX_*`, plus bare
//! `OPENAI_API_KEY`) > repo config file (`${repo}/.gitctx/config.yml`) > user
//! config file (`${HOME}/.gitctx/config.yml`) > built-in defaults.
use crate::error::{ConfigurationError, GitCtxError};
use crate::models;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings as they appear on the wire at any one layer. Every field is
/// optional so a partial YAML document (or an env-only layer) merges
/// cleanly with the layers below it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawSettings {
    pub openai_api_key: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_batch_size: Option<usize>,
    pub embedding_concurrency: Option<usize>,
    pub embedding_timeout_secs: Option<u64>,
    pub chunk_max_tokens: Option<usize>,
    pub vector_store_path: Option<PathBuf>,
    pub search_default_limit: Option<usize>,
    pub search_default_format: Option<String>,
    pub ann_index_threshold: Option<usize>,
}

impl RawSettings {
    fn merge(self, lower: RawSettings) -> RawSettings {
        RawSettings {
            openai_api_key: self.openai_api_key.or(lower.openai_api_key),
            embedding_model: self.embedding_model.or(lower.embedding_model),
            embedding_batch_size: self.embedding_batch_size.or(lower.embedding_batch_size),
            embedding_concurrency: self.embedding_concurrency.or(lower.embedding_concurrency),
            embedding_timeout_secs: self.embedding_timeout_secs.or(lower.embedding_timeout_secs),
            chunk_max_tokens: self.chunk_max_tokens.or(lower.chunk_max_tokens),
            vector_store_path: self.vector_store_path.or(lower.vector_store_path),
            search_default_limit: self.search_default_limit.or(lower.search_default_limit),
            search_default_format: self.search_default_format.or(lower.search_default_format),
            ann_index_threshold: self.ann_index_threshold.or(lower.ann_index_threshold),
        }
    }

    fn from_env() -> RawSettings {
        fn env(key: &str) -> Option<String> {
            std::env::var(key).ok()
        }
        fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            env(key).and_then(|v| v.parse().ok())
        }

        RawSettings {
            openai_api_key: env("OPENAI_API_KEY").or_else(|| env("GITCTX_OPENAI_API_KEY")),
            embedding_model: env("GITCTX_EMBEDDING_MODEL"),
            embedding_batch_size: env_parsed("GITCTX_EMBEDDING_BATCH_SIZE"),
            embedding_concurrency: env_parsed("GITCTX_EMBEDDING_CONCURRENCY"),
            embedding_timeout_secs: env_parsed("GITCTX_EMBEDDING_TIMEOUT_SECS"),
            chunk_max_tokens: env_parsed("GITCTX_CHUNK_MAX_TOKENS"),
            vector_store_path: env("GITCTX_VECTOR_STORE_PATH").map(PathBuf::from),
            search_default_limit: env_parsed("GITCTX_SEARCH_DEFAULT_LIMIT"),
            search_default_format: env("GITCTX_SEARCH_DEFAULT_FORMAT"),
            ann_index_threshold: env_parsed("GITCTX_ANN_INDEX_THRESHOLD"),
        }
    }

    fn from_file(path: &Path) -> Result<RawSettings, GitCtxError> {
        if !path.exists() {
            return Ok(RawSettings::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| {
            ConfigurationError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Fully resolved, validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub embedding_model: String,
    pub embedding_batch_size: usize,
    pub embedding_concurrency: usize,
    pub embedding_timeout_secs: u64,
    pub chunk_max_tokens: usize,
    pub vector_store_path: PathBuf,
    pub search_default_limit: usize,
    pub search_default_format: String,
    pub ann_index_threshold: usize,
}

impl Settings {
    /// Load and merge all four layers for the given repo root, validating
    /// the result. `repo_root` is used for both the repo-scoped config file
    /// and the default vector store path.
    pub fn load(repo_root: &Path) -> Result<Settings, GitCtxError> {
        check_user_config_permissions(&crate::paths::user_config_path())?;

        let env = RawSettings::from_env();
        let repo_file = RawSettings::from_file(&crate::paths::repo_config_path(repo_root))?;
        let user_file = RawSettings::from_file(&crate::paths::user_config_path())?;

        let merged = env.merge(repo_file).merge(user_file);
        Settings::resolve(merged, repo_root)
    }

    fn resolve(raw: RawSettings, repo_root: &Path) -> Result<Settings, GitCtxError> {
        let embedding_model = raw
            .embedding_model
            .unwrap_or_else(|| models::DEFAULT_MODEL.to_string());
        let model_spec = models::lookup(&embedding_model)?;

        let settings = Settings {
            openai_api_key: raw.openai_api_key,
            embedding_model,
            embedding_batch_size: raw.embedding_batch_size.unwrap_or(100),
            embedding_concurrency: raw.embedding_concurrency.unwrap_or(8),
            embedding_timeout_secs: raw.embedding_timeout_secs.unwrap_or(60),
            chunk_max_tokens: raw.chunk_max_tokens.unwrap_or(model_spec.max_tokens),
            vector_store_path: raw
                .vector_store_path
                .unwrap_or_else(|| crate::paths::repo_db_path(repo_root)),
            search_default_limit: raw.search_default_limit.unwrap_or(10),
            search_default_format: raw.search_default_format.unwrap_or_else(|| "terse".into()),
            ann_index_threshold: raw.ann_index_threshold.unwrap_or(256),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), GitCtxError> {
        if self.embedding_batch_size == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "embedding_batch_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.embedding_concurrency == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "embedding_concurrency".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.chunk_max_tokens == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "chunk_max_tokens".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.search_default_limit == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "search_default_limit".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Resolved API key, erroring with a remediation hint if unset.
    pub fn require_api_key(&self) -> Result<&str, GitCtxError> {
        self.openai_api_key.as_deref().ok_or_else(|| {
            ConfigurationError::MissingApiKey(
                crate::paths::user_config_path().display().to_string(),
            )
            .into()
        })
    }
}

#[cfg(unix)]
fn check_user_config_permissions(path: &Path) -> Result<(), GitCtxError> {
    use std::os::unix::fs::PermissionsExt;

    if !path.exists() {
        return Ok(());
    }
    let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
    if mode != 0o600 {
        tracing::warn!(
            path = %path.display(),
            mode = format!("{mode:o}"),
            "user config file has insecure permissions, expected 0600"
        );
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_user_config_permissions(_path: &Path) -> Result<(), GitCtxError> {
    Ok(())
}
