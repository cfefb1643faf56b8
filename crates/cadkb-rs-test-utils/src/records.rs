use cadkb_rs_store::{Embedding, OperationParameters, OperationRecord};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Well-formed record with a fresh id and no embedding.
pub fn sample_record(
    operation_type: &str,
    success: bool,
    timestamp: DateTime<Utc>,
) -> OperationRecord {
    OperationRecord {
        id: Uuid::new_v4(),
        operation_type: operation_type.to_string(),
        parameters: OperationParameters::new(),
        success,
        error_message: (!success).then(|| format!("{operation_type} failed")),
        timestamp,
        context_summary: format!("operation: {operation_type}"),
        embedding: Embedding::Missing,
        tags: vec![operation_type.to_string()],
    }
}
