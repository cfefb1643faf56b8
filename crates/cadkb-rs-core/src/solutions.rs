//! Error solutions: fixes for known failures, retrieved by the similarity of
//! a new error message to the stored ones.

use crate::error::KnowledgeError;
use crate::knowledge::KnowledgeBase;
use crate::operation::error_summary;
use cadkb_rs_store::{Embedding, ErrorSolution, OperationParameters, ScoredSolution, StoreError};
use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

/// Ranked answer to `find_error_solutions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarSolutions {
    pub error_message: String,
    /// Best match first.
    pub matches: Vec<ScoredSolution>,
    /// The query could not be answered; `matches` is empty.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl SimilarSolutions {
    fn degraded(error_message: &str, reason: String) -> Self {
        Self {
            error_message: error_message.to_string(),
            matches: Vec::new(),
            degraded: true,
            degraded_reason: Some(reason),
        }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl KnowledgeBase {
    /// Store a fix for `error_message`.
    ///
    /// The entry is keyed by the embedding of the error message and its
    /// context. Blank steps are dropped. Embedding failures store the entry
    /// without a vector, as for operation records.
    pub async fn record_error_solution(
        &self,
        error_message: &str,
        error_context: OperationParameters,
        solution: &str,
        solution_steps: Vec<String>,
    ) -> Result<ErrorSolution, KnowledgeError> {
        let error_message = required(error_message, "error_message")?;
        let solution = required(solution, "solution")?;
        let solution_steps = solution_steps
            .into_iter()
            .map(|step| step.trim().to_string())
            .filter(|step| !step.is_empty())
            .collect::<Vec<_>>();

        let timestamp = self.next_timestamp();
        let summary = error_summary(&error_message, &error_context);
        let embedding = match self.embed(&summary).await {
            Ok(vector) => Embedding::Vector(vector),
            Err(err) => {
                warn!("storing error solution without embedding (error={err})");
                Embedding::Missing
            }
        };
        let entry = ErrorSolution {
            id: Uuid::new_v4(),
            error_message,
            error_context,
            solution,
            solution_steps,
            timestamp,
            embedding,
        };
        self.store().insert_solution(entry.clone()).await?;
        info!(
            "recorded error solution (id={}, steps={}, indexed={})",
            entry.id,
            entry.solution_steps.len(),
            !entry.is_unindexed()
        );
        Ok(entry)
    }

    /// Stored solutions whose error is most similar to `error_message`.
    ///
    /// Embedding or store failures produce an empty, degraded result.
    pub async fn find_error_solutions(
        &self,
        error_message: &str,
        n_results: usize,
    ) -> Result<SimilarSolutions, KnowledgeError> {
        let error_message = required(error_message, "error_message")?;
        if n_results == 0 {
            return Err(KnowledgeError::Validation(
                "n_results must be at least 1".to_string(),
            ));
        }
        let query = error_summary(&error_message, &OperationParameters::new());
        let vector = match self.embed(&query).await {
            Ok(vector) => vector,
            Err(err) => {
                warn!("solution query degraded (reason=embedding, error={err})");
                return Ok(SimilarSolutions::degraded(&error_message, err.to_string()));
            }
        };
        let mut matches = match self
            .store()
            .query_similar_solutions(&vector, n_results)
            .await
        {
            Ok(matches) => matches,
            Err(err) => {
                warn!("solution query degraded (reason=storage, error={err})");
                return Ok(SimilarSolutions::degraded(&error_message, err.to_string()));
            }
        };
        if let Some(min_score) = self.options().min_score {
            matches.retain(|scored| scored.score >= min_score);
        }
        debug!(
            "solution query answered (n_results={}, returned={})",
            n_results,
            matches.len()
        );
        Ok(SimilarSolutions {
            error_message,
            matches,
            degraded: false,
            degraded_reason: None,
        })
    }

    pub(crate) async fn reindex_solutions(&self) -> Result<usize, KnowledgeError> {
        let solutions = self.store().scan_solutions().await?;
        let mut updated = 0;
        for entry in solutions.into_iter().filter(ErrorSolution::is_unindexed) {
            let summary = error_summary(&entry.error_message, &entry.error_context);
            let vector = match self.embed(&summary).await {
                Ok(vector) => vector,
                Err(err) => {
                    warn!("reindex skipped error solution (id={}, error={})", entry.id, err);
                    continue;
                }
            };
            match self.store().set_solution_embedding(entry.id, vector).await {
                Ok(()) => updated += 1,
                Err(StoreError::AlreadyIndexed(id)) => {
                    debug!("error solution indexed concurrently (id={id})");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(updated)
    }
}

fn required(value: &str, field: &str) -> Result<String, KnowledgeError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(KnowledgeError::Validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use crate::embedding::HashingEmbeddingProvider;
    use crate::error::KnowledgeError;
    use crate::knowledge::{KnowledgeBase, KnowledgeOptions};
    use cadkb_rs_store::{InMemoryRecordStore, OperationParameters};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn knowledge_base() -> KnowledgeBase {
        KnowledgeBase::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(HashingEmbeddingProvider::new(64)),
            KnowledgeOptions::default(),
        )
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let kb = knowledge_base();
        let err = kb
            .record_error_solution(" ", OperationParameters::new(), "retry", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Validation(_)));
        let err = kb
            .record_error_solution("file not found", OperationParameters::new(), "", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Validation(_)));
        assert!(matches!(
            kb.find_error_solutions("file not found", 0).await,
            Err(KnowledgeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn steps_are_trimmed_and_blank_ones_dropped() {
        let kb = knowledge_base();
        let entry = kb
            .record_error_solution(
                " dimension not found ",
                OperationParameters::new(),
                "Use the full dimension name",
                vec![" Open the sketch ".to_string(), "  ".to_string()],
            )
            .await
            .expect("record");
        assert_eq!(entry.error_message, "dimension not found");
        assert_eq!(entry.solution_steps, vec!["Open the sketch".to_string()]);
        assert!(!entry.is_unindexed());
    }
}
