use async_trait::async_trait;
use cadkb_rs_store::{ErrorSolution, OperationRecord, RecordStore, StoreError};
use uuid::Uuid;

/// Store whose every call fails, as if the database were unreachable.
#[derive(Debug, Clone, Default)]
pub struct FailingStore;

impl FailingStore {
    pub fn new() -> Self {
        Self
    }
}

fn offline() -> StoreError {
    StoreError::Io(std::io::Error::other("store offline"))
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn insert(&self, _record: OperationRecord) -> Result<(), StoreError> {
        Err(offline())
    }

    async fn scan_all(&self) -> Result<Vec<OperationRecord>, StoreError> {
        Err(offline())
    }

    async fn get(&self, _id: Uuid) -> Result<Option<OperationRecord>, StoreError> {
        Err(offline())
    }

    async fn set_embedding(&self, _id: Uuid, _embedding: Vec<f32>) -> Result<(), StoreError> {
        Err(offline())
    }

    async fn insert_solution(&self, _solution: ErrorSolution) -> Result<(), StoreError> {
        Err(offline())
    }

    async fn scan_solutions(&self) -> Result<Vec<ErrorSolution>, StoreError> {
        Err(offline())
    }

    async fn set_solution_embedding(
        &self,
        _id: Uuid,
        _embedding: Vec<f32>,
    ) -> Result<(), StoreError> {
        Err(offline())
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        Err(offline())
    }
}
