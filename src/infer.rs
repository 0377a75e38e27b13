//! Batch-level type inference
//!
//! Each field is treated as a column spanning every record in the batch, and
//! gets exactly one [`DataType`]. Records that lack a field contribute a null
//! to that column.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::value::{Batch, Value};

/// Type tag recorded for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Struct,
    /// Column is entirely null or absent
    Null,
}

impl DataType {
    /// Tag of a single value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::String(_) => DataType::String,
            Value::List(_) => DataType::List,
            Value::Struct(_) => DataType::Struct,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::List => "list",
            DataType::Struct => "struct",
            DataType::Null => "null",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field name to type tag, ordered by field name
pub type FieldMap = BTreeMap<String, DataType>;

/// What to do when a column holds values of irreconcilable types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixedTypes {
    /// Fail with a malformed-batch error
    #[default]
    Reject,
    /// Fall back to `string` for the column
    CoerceToString,
}

/// Inference settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub mixed_types: MixedTypes,
}

/// Infer the field map of a batch using default settings
pub fn infer_schema(batch: &Batch) -> Result<FieldMap> {
    infer_schema_with(batch, &InferenceConfig::default())
}

/// Infer the field map of a batch.
///
/// An empty batch yields an empty field map.
pub fn infer_schema_with(batch: &Batch, config: &InferenceConfig) -> Result<FieldMap> {
    let mut columns: BTreeMap<&str, Option<DataType>> = BTreeMap::new();

    for record in batch.records() {
        for (name, value) in record {
            let column = columns.entry(name.as_str()).or_insert(None);
            if value.is_null() {
                continue;
            }
            let tag = DataType::of(value);
            *column = Some(match *column {
                None => tag,
                Some(current) => merge(name, current, tag, config.mixed_types)?,
            });
        }
    }

    let fields: FieldMap = columns
        .into_iter()
        .map(|(name, tag)| (name.to_string(), tag.unwrap_or(DataType::Null)))
        .collect();

    debug!(
        records = batch.len(),
        fields = fields.len(),
        "Inferred batch schema"
    );
    Ok(fields)
}

fn merge(field: &str, current: DataType, next: DataType, policy: MixedTypes) -> Result<DataType> {
    match (current, next) {
        (a, b) if a == b => Ok(a),
        // Int + Float -> Float
        (DataType::Integer, DataType::Float) | (DataType::Float, DataType::Integer) => {
            Ok(DataType::Float)
        }
        (a, b) => match policy {
            MixedTypes::CoerceToString => Ok(DataType::String),
            MixedTypes::Reject => Err(RegistryError::MalformedBatch(format!(
                "field '{field}' mixes {a} and {b} values"
            ))),
        },
    }
}
