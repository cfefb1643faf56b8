//! Error types for record store operations.

use uuid::Uuid;

/// Errors returned by record stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A record with the same id is already stored.
    #[error("duplicate record id: {0}")]
    DuplicateId(Uuid),
    /// No record exists for the id.
    #[error("record not found: {0}")]
    NotFound(Uuid),
    /// The record already carries a vector embedding.
    #[error("record already indexed: {0}")]
    AlreadyIndexed(Uuid),
    /// The store was closed and no longer accepts reads or writes.
    #[error("record store is closed")]
    Closed,
    /// A blocking database task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Persisted data could not be decoded.
    #[error("corrupt record store: {0}")]
    Corrupt(String),
}
