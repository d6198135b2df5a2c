//! Error types shared across the orchestrator.
//!
//! Compaction has its own typed taxonomy in [`crate::memory::errors`]; the
//! enums here cover configuration, the context store, the collaborators and
//! the facade.

use thiserror::Error;

use crate::context::ContextStatus;
use crate::memory::CompactionError;

/// Invalid or missing configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("model registry is empty")]
    EmptyRegistry,

    #[error("default model {0} is not registered")]
    MissingDefaultModel(String),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Context store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("context not found: {0}")]
    NotFound(String),

    #[error("context already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ContextStatus,
        to: ContextStatus,
    },

    #[error("context {id} is {status} and cannot accept messages")]
    Closed { id: String, status: ContextStatus },

    #[error("compaction in progress for context {0}")]
    CompactionInProgress(String),

    #[error("cannot merge context {0} into itself")]
    SelfMerge(String),
}

/// Persistence collaborator failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Generation collaborator failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("model {model} failed: {reason}")]
    ModelFailed { model: String, reason: String },

    #[error("summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("generation timed out after {0}s")]
    Timeout(u64),
}

/// Task source collaborator failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskSourceError {
    #[error("task source unavailable: {0}")]
    Unavailable(String),
}

/// Facade error.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compaction(#[from] CompactionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    TaskSource(#[from] TaskSourceError),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::InvalidTransition {
            id: "ctx-1".into(),
            from: ContextStatus::Archived,
            to: ContextStatus::Active,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for ctx-1: archived -> active"
        );
        assert!(StoreError::CompactionInProgress("ctx-2".into())
            .to_string()
            .contains("compaction in progress"));
    }

    #[test]
    fn test_orchestrator_error_from_store() {
        let err: OrchestratorError = StoreError::NotFound("x".into()).into();
        assert!(matches!(err, OrchestratorError::Store(StoreError::NotFound(_))));
        assert_eq!(err.to_string(), "context not found: x");
    }

    #[test]
    fn test_config_error_from_toml() {
        let parse_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: ConfigError = parse_err.into();
        assert!(err.to_string().starts_with("failed to parse config"));
    }
}
