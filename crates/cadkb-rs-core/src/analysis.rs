//! Aggregate statistics over a snapshot of operation records.

use cadkb_rs_store::OperationRecord;
use serde::Serialize;
use std::collections::HashMap;

/// Name with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub name: String,
    pub count: usize,
}

/// Result of `KnowledgeBase::analyze_patterns`.
///
/// Count lists are ordered by descending count, ties alphabetically.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PatternAnalysis {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    /// Successes over total; 0 for an empty store.
    pub success_rate: f64,
    pub operation_types: Vec<CountEntry>,
    /// Most frequent tags, capped by `analysis.top_tags`.
    pub common_tags: Vec<CountEntry>,
    /// Operation types ranked by number of failures.
    pub error_hotspots: Vec<CountEntry>,
    /// Records stored without an embedding.
    pub unindexed_operations: usize,
    /// The store could not be read; all counts are zero.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl PatternAnalysis {
    /// Aggregate one snapshot.
    pub fn from_records(records: &[OperationRecord], top_tags: usize) -> Self {
        let total_operations = records.len();
        let successful_operations = records.iter().filter(|record| record.success).count();
        let mut type_counts: HashMap<&str, usize> = HashMap::new();
        let mut tag_counts: HashMap<&str, usize> = HashMap::new();
        let mut failure_counts: HashMap<&str, usize> = HashMap::new();
        for record in records {
            *type_counts.entry(record.operation_type.as_str()).or_default() += 1;
            if !record.success {
                *failure_counts.entry(record.operation_type.as_str()).or_default() += 1;
            }
            for tag in &record.tags {
                *tag_counts.entry(tag.as_str()).or_default() += 1;
            }
        }
        let mut common_tags = ranked(tag_counts);
        common_tags.truncate(top_tags);

        Self {
            total_operations,
            successful_operations,
            failed_operations: total_operations - successful_operations,
            success_rate: if total_operations == 0 {
                0.0
            } else {
                successful_operations as f64 / total_operations as f64
            },
            operation_types: ranked(type_counts),
            common_tags,
            error_hotspots: ranked(failure_counts),
            unindexed_operations: records.iter().filter(|r| r.is_unindexed()).count(),
            degraded: false,
            degraded_reason: None,
        }
    }

    /// Empty analysis flagged as degraded.
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            degraded: true,
            degraded_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Count recorded for one operation type.
    pub fn operation_type_count(&self, operation_type: &str) -> usize {
        self.operation_types
            .iter()
            .find(|entry| entry.name == operation_type)
            .map_or(0, |entry| entry.count)
    }
}

fn ranked(counts: HashMap<&str, usize>) -> Vec<CountEntry> {
    let mut entries = counts
        .into_iter()
        .map(|(name, count)| CountEntry {
            name: name.to_string(),
            count,
        })
        .collect::<Vec<_>>();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    entries
}
