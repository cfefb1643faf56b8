//! Error types for the knowledge base.

use cadkb_rs_config::ConfigError;
use cadkb_rs_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Failures of an embedding provider.
///
/// These never escape `KnowledgeBase::record`; the record is stored with the
/// missing-embedding sentinel instead.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider is unreachable or returned an error.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider did not answer within the configured bound.
    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),
    /// Provider returned a vector of the wrong width.
    #[error("embedding dimension mismatch (expected={expected}, actual={actual})")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors returned by knowledge base operations.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Malformed input to a public call.
    #[error("validation error: {0}")]
    Validation(String),
    /// Record store unreachable or write rejected.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    /// Import file is not a JSON array of records.
    #[error("import format error: {0}")]
    ImportFormat(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Configuration could not be resolved.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Embedding provider could not be constructed.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Background recording task did not complete.
    #[error("recording task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Detached recording was requested outside a tokio runtime.
    #[error("no async runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

impl KnowledgeError {
    /// Stable taxonomy label for structured outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            KnowledgeError::Validation(_) => "validation",
            KnowledgeError::Storage(_) => "storage",
            KnowledgeError::ImportFormat(_) => "import_format",
            KnowledgeError::Io(_) => "io",
            KnowledgeError::Serde(_) => "serialization",
            KnowledgeError::Config(_) => "config",
            KnowledgeError::Embedding(_) => "embedding",
            KnowledgeError::Task(_) | KnowledgeError::Runtime(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::KnowledgeError;
    use cadkb_rs_store::StoreError;
    use pretty_assertions::assert_eq;

    #[test]
    fn kinds_are_stable_labels() {
        assert_eq!(
            KnowledgeError::Validation("empty".to_string()).kind(),
            "validation"
        );
        assert_eq!(KnowledgeError::from(StoreError::Closed).kind(), "storage");
        assert_eq!(
            KnowledgeError::ImportFormat("object".to_string()).kind(),
            "import_format"
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(KnowledgeError::from(io).kind(), "io");
    }

    #[test]
    fn missing_runtime_is_internal() {
        let err = tokio::runtime::Handle::try_current().expect_err("no runtime in a plain test");
        assert_eq!(KnowledgeError::from(err).kind(), "internal");
    }
}
