//! In-process record store for tests and ephemeral sessions.

use super::RecordStore;
use crate::error::StoreError;
use crate::model::{Embedding, ErrorSolution, OperationRecord};
use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<OperationRecord>,
    solutions: Vec<ErrorSolution>,
    /// Every id ever stored, including wiped ones.
    ids: HashSet<Uuid>,
    closed: bool,
}

/// Record store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<MemoryState>,
}

impl InMemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: OperationRecord) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(StoreError::Closed);
        }
        if !state.ids.insert(record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        debug!(
            "stored operation record (id={}, operation_type={})",
            record.id, record.operation_type
        );
        state.records.push(record);
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<OperationRecord>, StoreError> {
        let state = self.state.read();
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.records.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<OperationRecord>, StoreError> {
        let state = self.state.read();
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.records.iter().find(|record| record.id == id).cloned())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let state = self.state.read();
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.records.len())
    }

    async fn set_embedding(&self, id: Uuid, embedding: Vec<f32>) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(StoreError::Closed);
        }
        let record = state
            .records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if !record.is_unindexed() {
            return Err(StoreError::AlreadyIndexed(id));
        }
        record.embedding = Embedding::from(embedding);
        Ok(())
    }

    async fn insert_solution(&self, solution: ErrorSolution) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(StoreError::Closed);
        }
        if !state.ids.insert(solution.id) {
            return Err(StoreError::DuplicateId(solution.id));
        }
        debug!("stored error solution (id={})", solution.id);
        state.solutions.push(solution);
        Ok(())
    }

    async fn scan_solutions(&self) -> Result<Vec<ErrorSolution>, StoreError> {
        let state = self.state.read();
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.solutions.clone())
    }

    async fn set_solution_embedding(
        &self,
        id: Uuid,
        embedding: Vec<f32>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(StoreError::Closed);
        }
        let solution = state
            .solutions
            .iter_mut()
            .find(|solution| solution.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if !solution.is_unindexed() {
            return Err(StoreError::AlreadyIndexed(id));
        }
        solution.embedding = Embedding::from(embedding);
        Ok(())
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(StoreError::Closed);
        }
        let removed = state.records.len() + state.solutions.len();
        state.records.clear();
        state.solutions.clear();
        Ok(removed)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.state.write().closed = true;
        Ok(())
    }
}
