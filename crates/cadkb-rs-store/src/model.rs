//! Operation record model persisted by record stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Persisted record of one attempted automation operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Operation type tag, e.g. `modify_dimension`.
    pub operation_type: String,
    /// Parameters passed to the operation.
    #[serde(default)]
    pub parameters: OperationParameters,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error reported by a failed operation.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Text the embedding was derived from.
    pub context_summary: String,
    /// Embedding of `context_summary`, or the missing sentinel.
    pub embedding: Embedding,
    /// Derived labels used for aggregation.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl OperationRecord {
    /// Vector embedding if the record was indexed.
    pub fn vector(&self) -> Option<&[f32]> {
        self.embedding.as_vector()
    }

    /// Whether the record is still waiting for an embedding.
    pub fn is_unindexed(&self) -> bool {
        self.embedding.is_missing()
    }
}

/// A known fix for an error, retrieved by similarity to new errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorSolution {
    /// Entry identifier; shares the id space with operation records.
    pub id: Uuid,
    /// Error text the solution applies to.
    pub error_message: String,
    /// Where the error occurred, e.g. the operation type and its arguments.
    #[serde(default)]
    pub error_context: OperationParameters,
    /// One-line description of the fix.
    pub solution: String,
    /// Ordered steps that apply the fix.
    #[serde(default)]
    pub solution_steps: Vec<String>,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Embedding of the error message and context, or the missing sentinel.
    pub embedding: Embedding,
}

impl ErrorSolution {
    pub fn vector(&self) -> Option<&[f32]> {
        self.embedding.as_vector()
    }

    pub fn is_unindexed(&self) -> bool {
        self.embedding.is_missing()
    }
}

/// Embedding vector with an explicit "not computed" sentinel.
///
/// Serialized as a plain numeric array; the sentinel is the empty array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub enum Embedding {
    /// Computed embedding vector.
    Vector(Vec<f32>),
    /// The embedding provider was unavailable when the record was created.
    #[default]
    Missing,
}

impl Embedding {
    /// Borrow the vector, if present.
    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Embedding::Vector(values) => Some(values),
            Embedding::Missing => None,
        }
    }

    /// True for the missing sentinel.
    pub fn is_missing(&self) -> bool {
        matches!(self, Embedding::Missing)
    }

    /// Vector length, if present.
    pub fn dimension(&self) -> Option<usize> {
        self.as_vector().map(<[f32]>::len)
    }

    /// Encode as little-endian f32 bytes (empty for the sentinel).
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Embedding::Vector(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            Embedding::Missing => Vec::new(),
        }
    }

    /// Decode little-endian f32 bytes; `None` if the length is not a multiple of 4.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect::<Vec<_>>();
        Some(Self::from(values))
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        if values.is_empty() {
            Embedding::Missing
        } else {
            Embedding::Vector(values)
        }
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        match embedding {
            Embedding::Vector(values) => values,
            Embedding::Missing => Vec::new(),
        }
    }
}

/// Scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Integer(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Flat, key-ordered parameter mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationParameters(BTreeMap<String, ParamValue>);

impl OperationParameters {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Look up a text parameter.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ParamValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, ParamValue>> for OperationParameters {
    fn from(map: BTreeMap<String, ParamValue>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for OperationParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
