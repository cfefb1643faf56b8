//! Durable storage for operation records and their embeddings.
//!
//! This crate owns the record model, the `RecordStore` abstraction and the
//! SQLite and in-memory implementations used by the knowledge base.

pub mod error;
pub mod model;
pub mod similarity;
pub mod store;

/// Record store error type.
pub use error::StoreError;
/// Operation record model.
pub use model::{Embedding, ErrorSolution, OperationParameters, OperationRecord, ParamValue};
/// Similarity helpers.
pub use similarity::{
    ScoredRecord, ScoredSolution, SimilarityFilter, cosine_similarity, rank_records,
    rank_solutions,
};
/// Record store interface and implementations.
pub use store::{InMemoryRecordStore, RecordStore, SqliteRecordStore};
