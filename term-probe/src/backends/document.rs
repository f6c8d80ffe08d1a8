//! Record-level access to document stores.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Record predicate understood by every [`DocumentSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFilter {
    /// Every record.
    All,
    /// Records where any of the fields is null or the empty string.
    AnyNullOrEmpty(Vec<String>),
    /// Records without the field.
    MissingField(String),
    /// Records whose field equals the value.
    FieldEquals(String, Value),
}

impl RecordFilter {
    /// Evaluates the filter against an in-memory record.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::AnyNullOrEmpty(fields) => fields.iter().any(|f| {
                matches!(record.get(f), Some(Value::Null))
                    || matches!(record.get(f), Some(Value::String(s)) if s.is_empty())
            }),
            RecordFilter::MissingField(field) => !record.contains_key(field),
            RecordFilter::FieldEquals(field, value) => record.get(field) == Some(value),
        }
    }
}

/// Size statistics for one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub count: u64,
    /// Data size in bytes.
    pub size: u64,
    /// Average record size in bytes.
    pub avg_obj_size: f64,
}

/// Size statistics for the whole database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub collections: u64,
    pub data_size: u64,
    pub storage_size: u64,
    pub indexes: u64,
    pub index_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub keys: Value,
    pub unique: bool,
}

/// One sampled record with its shallow field types.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledDocument {
    /// `(field, type name)` pairs, one per top-level field.
    pub field_types: Vec<(String, String)>,
    pub body: Value,
}

impl SampledDocument {
    /// Builds a sample from a JSON object, typing each top-level field.
    pub fn from_object(body: Map<String, Value>) -> Self {
        let field_types = body
            .iter()
            .map(|(k, v)| (k.clone(), json_type_name(v).to_string()))
            .collect();
        Self {
            field_types,
            body: Value::Object(body),
        }
    }
}

/// Aggregate over a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl FieldSummary {
    /// Summarizes a set of values. Returns `None` when empty.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0u64;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| FieldSummary {
            count,
            sum,
            mean: sum / count as f64,
            min,
            max,
        })
    }
}

/// Shallow type name of a JSON value.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Data access used by the document-store analysis procedures.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn database_name(&self) -> Option<String>;

    async fn collection_names(&self) -> Result<Vec<String>>;

    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats>;

    /// The first `limit` records in natural order.
    async fn sample(&self, collection: &str, limit: usize) -> Result<Vec<SampledDocument>>;

    async fn count(&self, collection: &str, filter: &RecordFilter) -> Result<u64>;

    async fn database_stats(&self) -> Result<DatabaseStats>;

    async fn indexes(&self, collection: &str) -> Result<Vec<IndexInfo>>;

    /// Numeric summary of `field` over records matching `filter`. Records
    /// where the field is absent or non-numeric are skipped.
    async fn summarize(
        &self,
        collection: &str,
        field: &str,
        filter: &RecordFilter,
    ) -> Result<Option<FieldSummary>>;

    /// Record count per distinct value of `field`.
    async fn group_count(&self, collection: &str, field: &str) -> Result<BTreeMap<String, u64>>;
}

/// Renders a grouping key the way distribution maps store it.
pub fn group_key(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
