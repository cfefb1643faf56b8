//! JSON export and import of the whole knowledge base.

use crate::error::KnowledgeError;
use crate::knowledge::KnowledgeBase;
use cadkb_rs_store::{ErrorSolution, OperationRecord, StoreError};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Field marking an exported error solution; records carry no `kind`.
const KIND_FIELD: &str = "kind";
const ERROR_SOLUTION_KIND: &str = "error_solution";

/// Outcome of `export_knowledge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    /// Records and error solutions written.
    pub exported: usize,
    /// How many of `exported` are error solutions.
    pub error_solutions: usize,
}

/// Outcome of `import_knowledge`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Records and error solutions inserted.
    pub imported: usize,
    /// How many of `imported` are error solutions.
    pub error_solutions: usize,
    /// Elements that failed decoding or validation.
    pub skipped: usize,
    /// Elements whose id is already stored (or was retired).
    pub duplicates: usize,
    /// One message per skipped element.
    pub errors: Vec<String>,
}

impl KnowledgeBase {
    /// Write every record and error solution to `destination` as one
    /// pretty-printed JSON array. Error solutions carry
    /// `"kind": "error_solution"`.
    ///
    /// The file is written next to the destination and renamed into place.
    pub async fn export_knowledge(
        &self,
        destination: impl AsRef<Path>,
    ) -> Result<ExportSummary, KnowledgeError> {
        let destination = destination.as_ref();
        let records = self.store().scan_all().await?;
        let solutions = self.store().scan_solutions().await?;
        let mut entries = Vec::with_capacity(records.len() + solutions.len());
        for record in &records {
            entries.push(serde_json::to_value(record)?);
        }
        for solution in &solutions {
            let mut entry = serde_json::to_value(solution)?;
            if let Value::Object(map) = &mut entry {
                map.insert(
                    KIND_FIELD.to_string(),
                    Value::String(ERROR_SOLUTION_KIND.to_string()),
                );
            }
            entries.push(entry);
        }
        let payload = serde_json::to_vec_pretty(&entries)?;
        write_atomically(destination, &payload)?;
        info!(
            "exported knowledge (path={}, records={}, error_solutions={})",
            destination.display(),
            records.len(),
            solutions.len()
        );
        Ok(ExportSummary {
            path: destination.to_path_buf(),
            exported: entries.len(),
            error_solutions: solutions.len(),
        })
    }

    /// Load records and error solutions exported by `export_knowledge`.
    ///
    /// A file that is not a JSON array (including one that is not UTF-8) is
    /// rejected before anything is inserted. Malformed elements are skipped
    /// and reported in the summary.
    pub async fn import_knowledge(
        &self,
        source: impl AsRef<Path>,
    ) -> Result<ImportSummary, KnowledgeError> {
        let source = source.as_ref();
        let contents = fs::read(source)?;
        let document: Value = serde_json::from_slice(&contents)
            .map_err(|err| KnowledgeError::ImportFormat(format!("invalid JSON: {err}")))?;
        let Value::Array(elements) = document else {
            return Err(KnowledgeError::ImportFormat(
                "top level must be an array of records".to_string(),
            ));
        };

        let dimension = self.dimension();
        let mut summary = ImportSummary::default();
        for (index, element) in elements.into_iter().enumerate() {
            match entry_kind(&element) {
                Ok(None) => {}
                Ok(Some(_)) => {
                    self.import_solution(index, element, dimension, &mut summary)
                        .await?;
                    continue;
                }
                Err(reason) => {
                    warn!("skipping imported entry (index={index}, reason={reason})");
                    summary.skipped += 1;
                    summary.errors.push(format!("entry {index}: {reason}"));
                    continue;
                }
            }
            let record = match serde_json::from_value::<OperationRecord>(element)
                .map_err(|err| err.to_string())
                .and_then(|record| validate_imported(record, dimension))
            {
                Ok(record) => record,
                Err(reason) => {
                    warn!("skipping imported record (index={index}, reason={reason})");
                    summary.skipped += 1;
                    summary.errors.push(format!("record {index}: {reason}"));
                    continue;
                }
            };
            match self.store().insert(record).await {
                Ok(()) => summary.imported += 1,
                Err(StoreError::DuplicateId(id)) => {
                    warn!("skipping duplicate imported record (index={index}, id={id})");
                    summary.duplicates += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        info!(
            "imported knowledge (path={}, imported={}, error_solutions={}, skipped={}, duplicates={})",
            source.display(),
            summary.imported,
            summary.error_solutions,
            summary.skipped,
            summary.duplicates
        );
        Ok(summary)
    }

    async fn import_solution(
        &self,
        index: usize,
        mut element: Value,
        dimension: usize,
        summary: &mut ImportSummary,
    ) -> Result<(), KnowledgeError> {
        if let Value::Object(map) = &mut element {
            map.remove(KIND_FIELD);
        }
        let solution = match serde_json::from_value::<ErrorSolution>(element)
            .map_err(|err| err.to_string())
            .and_then(|solution| validate_imported_solution(solution, dimension))
        {
            Ok(solution) => solution,
            Err(reason) => {
                warn!("skipping imported error solution (index={index}, reason={reason})");
                summary.skipped += 1;
                summary.errors.push(format!("error solution {index}: {reason}"));
                return Ok(());
            }
        };
        match self.store().insert_solution(solution).await {
            Ok(()) => {
                summary.imported += 1;
                summary.error_solutions += 1;
            }
            Err(StoreError::DuplicateId(id)) => {
                warn!("skipping duplicate imported error solution (index={index}, id={id})");
                summary.duplicates += 1;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}

/// `None` for an operation record, the kind name for other entries.
fn entry_kind(element: &Value) -> Result<Option<&str>, String> {
    let Some(kind) = element.get(KIND_FIELD) else {
        return Ok(None);
    };
    match kind.as_str() {
        Some(ERROR_SOLUTION_KIND) => Ok(Some(ERROR_SOLUTION_KIND)),
        _ => Err(format!("unknown entry kind {kind}")),
    }
}

fn validate_imported_solution(
    solution: ErrorSolution,
    dimension: usize,
) -> Result<ErrorSolution, String> {
    if solution.error_message.trim().is_empty() {
        return Err("error_message is empty".to_string());
    }
    if solution.solution.trim().is_empty() {
        return Err("solution is empty".to_string());
    }
    check_dimension(solution.embedding.dimension(), dimension)?;
    Ok(solution)
}

fn check_dimension(actual: Option<usize>, dimension: usize) -> Result<(), String> {
    match actual {
        Some(actual) if actual != dimension => Err(format!(
            "embedding dimension {actual} does not match provider dimension {dimension}"
        )),
        _ => Ok(()),
    }
}

fn validate_imported(record: OperationRecord, dimension: usize) -> Result<OperationRecord, String> {
    if record.operation_type.trim().is_empty() {
        return Err("operation_type is empty".to_string());
    }
    let has_message = record
        .error_message
        .as_deref()
        .is_some_and(|message| !message.trim().is_empty());
    if record.success && has_message {
        return Err("successful record carries an error_message".to_string());
    }
    if !record.success && !has_message {
        return Err("failed record has no error_message".to_string());
    }
    check_dimension(record.embedding.dimension(), dimension)?;
    Ok(record)
}

fn write_atomically(destination: &Path, payload: &[u8]) -> Result<(), KnowledgeError> {
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "knowledge.json".to_string());
    let temp_path = destination.with_file_name(format!(".{file_name}.tmp"));
    {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)?;
        file.write_all(payload)?;
        file.sync_all()?;
    }
    if let Err(err) = fs::rename(&temp_path, destination) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{entry_kind, validate_imported, validate_imported_solution};
    use cadkb_rs_store::{Embedding, ErrorSolution, OperationParameters, OperationRecord};
    use serde_json::json;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(success: bool, error_message: Option<&str>, embedding: Embedding) -> OperationRecord {
        OperationRecord {
            id: Uuid::new_v4(),
            operation_type: "export_model".to_string(),
            parameters: OperationParameters::new(),
            success,
            error_message: error_message.map(str::to_string),
            timestamp: Utc::now(),
            context_summary: "operation: export_model".to_string(),
            embedding,
            tags: Vec::new(),
        }
    }

    #[test]
    fn accepts_missing_embedding_and_matching_width() {
        assert!(validate_imported(record(true, None, Embedding::Missing), 3).is_ok());
        let vector = Embedding::Vector(vec![0.1, 0.2, 0.3]);
        assert!(validate_imported(record(true, None, vector), 3).is_ok());
    }

    #[test]
    fn rejects_inconsistent_outcome_and_wrong_width() {
        assert!(validate_imported(record(false, None, Embedding::Missing), 3).is_err());
        assert!(validate_imported(record(true, Some("boom"), Embedding::Missing), 3).is_err());
        let vector = Embedding::Vector(vec![0.1, 0.2]);
        let err = validate_imported(record(true, None, vector), 3).unwrap_err();
        assert!(err.contains("dimension"));
    }

    #[test]
    fn entry_kind_separates_records_and_solutions() {
        assert_eq!(entry_kind(&json!({ "operation_type": "open_model" })), Ok(None));
        assert_eq!(
            entry_kind(&json!({ "kind": "error_solution" })),
            Ok(Some("error_solution"))
        );
        assert!(entry_kind(&json!({ "kind": "macro" })).is_err());
        assert_eq!(entry_kind(&json!(42)), Ok(None));
    }

    #[test]
    fn solutions_need_error_and_fix() {
        let solution = |error: &str, fix: &str| ErrorSolution {
            id: Uuid::new_v4(),
            error_message: error.to_string(),
            error_context: OperationParameters::new(),
            solution: fix.to_string(),
            solution_steps: Vec::new(),
            timestamp: Utc::now(),
            embedding: Embedding::Missing,
        };
        assert!(validate_imported_solution(solution("disk full", "free space"), 3).is_ok());
        assert!(validate_imported_solution(solution(" ", "free space"), 3).is_err());
        assert!(validate_imported_solution(solution("disk full", ""), 3).is_err());
    }
}
