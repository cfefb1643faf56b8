//! Record store abstraction and implementations.

use crate::error::StoreError;
use crate::model::{ErrorSolution, OperationRecord};
use crate::similarity::{
    ScoredRecord, ScoredSolution, SimilarityFilter, rank_records, rank_solutions,
};
use async_trait::async_trait;
use uuid::Uuid;

mod memory;
mod sqlite;

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

#[async_trait]
/// Durable storage for operation records; no business semantics.
pub trait RecordStore: Send + Sync {
    /// Append a record. Fails with `DuplicateId` if the id is already stored.
    async fn insert(&self, record: OperationRecord) -> Result<(), StoreError>;

    /// Full consistent snapshot of all records in storage order.
    async fn scan_all(&self) -> Result<Vec<OperationRecord>, StoreError>;

    /// Fetch one record by id.
    async fn get(&self, id: Uuid) -> Result<Option<OperationRecord>, StoreError>;

    /// Nearest neighbours of `embedding` by cosine similarity.
    async fn query_similar(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: &SimilarityFilter,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let records = self.scan_all().await?;
        Ok(rank_records(records, embedding, n_results, filter))
    }

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.scan_all().await?.len())
    }

    /// Attach an embedding to a record stored with the missing sentinel.
    async fn set_embedding(&self, id: Uuid, embedding: Vec<f32>) -> Result<(), StoreError>;

    /// Append an error solution. Ids are shared with records, so a collision
    /// with either kind fails with `DuplicateId`.
    async fn insert_solution(&self, solution: ErrorSolution) -> Result<(), StoreError>;

    /// Full snapshot of all error solutions in storage order.
    async fn scan_solutions(&self) -> Result<Vec<ErrorSolution>, StoreError>;

    /// Nearest error solutions to `embedding` by cosine similarity.
    async fn query_similar_solutions(
        &self,
        embedding: &[f32],
        n_results: usize,
    ) -> Result<Vec<ScoredSolution>, StoreError> {
        let solutions = self.scan_solutions().await?;
        Ok(rank_solutions(solutions, embedding, n_results))
    }

    /// Attach an embedding to an error solution stored with the missing sentinel.
    async fn set_solution_embedding(
        &self,
        id: Uuid,
        embedding: Vec<f32>,
    ) -> Result<(), StoreError>;

    /// Irreversibly delete every record and error solution. Returns the
    /// number of entries removed.
    async fn delete_all(&self) -> Result<usize, StoreError>;

    /// Flush and release underlying resources.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
