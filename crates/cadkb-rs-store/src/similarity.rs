//! Cosine similarity ranking over stored records.

use crate::model::{ErrorSolution, OperationRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Record paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub record: OperationRecord,
    /// Cosine similarity in [-1, 1]; higher is closer.
    pub score: f32,
}

/// Error solution paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSolution {
    pub solution: ErrorSolution,
    pub score: f32,
}

/// Optional constraints applied before ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityFilter {
    /// Only consider records of this operation type.
    #[serde(default)]
    pub operation_type: Option<String>,
    /// Only consider successful (or failed) records.
    #[serde(default)]
    pub success: Option<bool>,
}

impl SimilarityFilter {
    /// Whether a record passes the filter.
    pub fn matches(&self, record: &OperationRecord) -> bool {
        if let Some(operation_type) = &self.operation_type
            && record.operation_type != *operation_type
        {
            return false;
        }
        if let Some(success) = self.success
            && record.success != success
        {
            return false;
        }
        true
    }
}

/// Cosine similarity of two vectors.
///
/// Returns `None` when dimensions differ; zero-norm vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Rank records against a query vector.
///
/// Records without an embedding, with a different dimension, or rejected by
/// the filter are skipped. Ordering is score descending, then newest first.
pub fn rank_records(
    records: impl IntoIterator<Item = OperationRecord>,
    query: &[f32],
    n_results: usize,
    filter: &SimilarityFilter,
) -> Vec<ScoredRecord> {
    let mut scored = records
        .into_iter()
        .filter(|record| filter.matches(record))
        .filter_map(|record| {
            let score = cosine_similarity(record.vector()?, query)?;
            Some(ScoredRecord { record, score })
        })
        .collect::<Vec<_>>();
    scored.sort_by(compare_scored);
    scored.truncate(n_results);
    scored
}

/// Rank error solutions against a query vector, with the same ordering as
/// [`rank_records`].
pub fn rank_solutions(
    solutions: impl IntoIterator<Item = ErrorSolution>,
    query: &[f32],
    n_results: usize,
) -> Vec<ScoredSolution> {
    let mut scored = solutions
        .into_iter()
        .filter_map(|solution| {
            let score = cosine_similarity(solution.vector()?, query)?;
            Some(ScoredSolution { solution, score })
        })
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| {
        best_first(
            (a.score, a.solution.timestamp),
            (b.score, b.solution.timestamp),
        )
    });
    scored.truncate(n_results);
    scored
}

fn compare_scored(a: &ScoredRecord, b: &ScoredRecord) -> Ordering {
    best_first((a.score, a.record.timestamp), (b.score, b.record.timestamp))
}

fn best_first(a: (f32, DateTime<Utc>), b: (f32, DateTime<Utc>)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1))
}
