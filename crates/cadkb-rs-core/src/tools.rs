//! The assistant-facing tool surface: exactly three tools over one
//! knowledge base, with structured JSON outcomes.

use crate::error::KnowledgeError;
use crate::knowledge::KnowledgeBase;
use crate::prompt::{format_for_prompt, format_solutions_for_prompt};
use async_trait::async_trait;
use cadkb_rs_store::{OperationParameters, SimilarityFilter};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const RECORD_OPERATION: &str = "record_operation";
pub const FIND_SIMILAR_OPERATIONS: &str = "find_similar_operations";
pub const ANALYZE_OPERATION_PATTERNS: &str = "analyze_operation_patterns";

/// Tool metadata for discovery by the protocol layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub args_schema: Value,
}

/// Structured result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok { result: Value },
    Error { kind: String, message: String },
}

impl ToolOutcome {
    fn failure(kind: &str, message: impl Into<String>) -> Self {
        ToolOutcome::Error {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok { .. })
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            json!({ "status": "error", "kind": "serialization", "message": err.to_string() })
        })
    }
}

#[async_trait]
/// One tool backed by the knowledge base.
pub trait KnowledgeTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema for the tool arguments.
    fn args_schema(&self) -> Value;

    async fn call(&self, kb: &KnowledgeBase, args: Value) -> Result<Value, KnowledgeError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            args_schema: self.args_schema(),
        }
    }
}

/// Router over the three knowledge tools.
#[derive(Clone)]
pub struct KnowledgeTools {
    kb: KnowledgeBase,
    tools: Arc<BTreeMap<String, Arc<dyn KnowledgeTool>>>,
}

impl KnowledgeTools {
    pub fn new(kb: KnowledgeBase) -> Self {
        let builtin: [Arc<dyn KnowledgeTool>; 3] = [
            Arc::new(RecordOperationTool),
            Arc::new(FindSimilarOperationsTool),
            Arc::new(AnalyzeOperationPatternsTool),
        ];
        let mut tools = BTreeMap::new();
        for tool in builtin {
            debug!("registering knowledge tool (name={})", tool.name());
            tools.insert(tool.name().to_string(), tool);
        }
        Self {
            kb,
            tools: Arc::new(tools),
        }
    }

    /// Tool names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec()).collect()
    }

    /// Invoke a tool by name. Failures become `ToolOutcome::Error`.
    pub async fn call(&self, name: &str, args: Value) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutcome::failure("unknown_tool", format!("unknown tool: {name}"));
        };
        match tool.call(&self.kb, args).await {
            Ok(result) => ToolOutcome::Ok { result },
            Err(err) => {
                debug!("tool call failed (name={name}, kind={}, error={err})", err.kind());
                ToolOutcome::failure(err.kind(), err.to_string())
            }
        }
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, KnowledgeError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|err| KnowledgeError::Validation(format!("invalid arguments: {err}")))
}

#[derive(Deserialize)]
struct RecordOperationArgs {
    operation_type: String,
    #[serde(default)]
    parameters: OperationParameters,
    success: bool,
    #[serde(default)]
    error_message: Option<String>,
}

struct RecordOperationTool;

#[async_trait]
impl KnowledgeTool for RecordOperationTool {
    fn name(&self) -> &str {
        RECORD_OPERATION
    }

    fn description(&self) -> &str {
        "Record the outcome of an automation operation for later retrieval; \
         failed operations also return known solutions for their error"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation_type": { "type": "string" },
                "parameters": {
                    "type": "object",
                    "additionalProperties": { "type": ["string", "number", "boolean"] }
                },
                "success": { "type": "boolean" },
                "error_message": { "type": "string" }
            },
            "required": ["operation_type", "success"]
        })
    }

    async fn call(&self, kb: &KnowledgeBase, args: Value) -> Result<Value, KnowledgeError> {
        let args: RecordOperationArgs = parse_args(args)?;
        let record = kb
            .record(
                &args.operation_type,
                args.parameters,
                args.success,
                args.error_message,
            )
            .await?;
        let mut result = json!({
            "id": record.id,
            "operation_type": record.operation_type,
            "timestamp": record.timestamp,
            "tags": record.tags,
            "indexed": !record.is_unindexed(),
        });
        if let (Some(error), Value::Object(map)) = (record.error_message.as_deref(), &mut result) {
            let solutions = kb
                .find_error_solutions(error, kb.options().default_results)
                .await?;
            map.insert(
                "prompt_context".to_string(),
                Value::String(format_solutions_for_prompt(&solutions)),
            );
            map.insert(
                "suggested_solutions".to_string(),
                serde_json::to_value(&solutions.matches)?,
            );
        }
        Ok(result)
    }
}

#[derive(Deserialize)]
struct FindSimilarArgs {
    query: String,
    #[serde(default)]
    n_results: Option<usize>,
    #[serde(default)]
    operation_type: Option<String>,
    #[serde(default)]
    success: Option<bool>,
}

struct FindSimilarOperationsTool;

#[async_trait]
impl KnowledgeTool for FindSimilarOperationsTool {
    fn name(&self) -> &str {
        FIND_SIMILAR_OPERATIONS
    }

    fn description(&self) -> &str {
        "Find previously recorded operations similar to a description"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "n_results": { "type": "integer", "minimum": 1 },
                "operation_type": { "type": "string" },
                "success": { "type": "boolean" }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, kb: &KnowledgeBase, args: Value) -> Result<Value, KnowledgeError> {
        let args: FindSimilarArgs = parse_args(args)?;
        let filter = SimilarityFilter {
            operation_type: args.operation_type,
            success: args.success,
        };
        let n_results = args.n_results.unwrap_or(kb.options().default_results);
        let similar = kb
            .find_similar_filtered(&args.query, n_results, &filter)
            .await?;
        let mut result = serde_json::to_value(&similar)?;
        if let Value::Object(map) = &mut result {
            map.insert(
                "prompt_context".to_string(),
                Value::String(format_for_prompt(&similar)),
            );
        }
        Ok(result)
    }
}

struct AnalyzeOperationPatternsTool;

#[async_trait]
impl KnowledgeTool for AnalyzeOperationPatternsTool {
    fn name(&self) -> &str {
        ANALYZE_OPERATION_PATTERNS
    }

    fn description(&self) -> &str {
        "Summarize recorded operations: totals, success rate and frequent types"
    }

    fn args_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, kb: &KnowledgeBase, _args: Value) -> Result<Value, KnowledgeError> {
        Ok(serde_json::to_value(kb.analyze_patterns().await)?)
    }
}
