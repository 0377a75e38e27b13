//! Dynamically-typed records handed over by the transform step

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// A single field value inside a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                // u64 beyond i64::MAX and real floats both land here
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Struct(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// One structured record: field name to value
pub type Record = BTreeMap<String, Value>;

/// A batch of records produced by one transform run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build a batch from parsed JSON.
    ///
    /// A single object becomes a one-record batch; an array must contain
    /// only objects.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self::new(vec![object_to_record(map)])),
            serde_json::Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    serde_json::Value::Object(map) => Ok(object_to_record(map)),
                    other => Err(RegistryError::MalformedBatch(format!(
                        "record {i}: expected JSON object, got {}",
                        json_kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::new),
            other => Err(RegistryError::MalformedBatch(format!(
                "expected JSON object or array of objects, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse a batch from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| RegistryError::MalformedBatch(format!("invalid JSON: {e}")))?;
        Self::from_json(value)
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<Record> for Batch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn object_to_record(map: serde_json::Map<String, serde_json::Value>) -> Record {
    map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_object_is_wrapped() {
        let batch = Batch::from_json(json!({"id": "prod-1001", "price": 9.5})).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records()[0]["id"], Value::String("prod-1001".into()));
        assert_eq!(batch.records()[0]["price"], Value::Float(9.5));
    }

    #[test]
    fn test_array_of_objects() {
        let batch = Batch::from_json_str(r#"[{"a": 1}, {"a": 2, "b": [true]}]"#).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records()[0]["a"], Value::Integer(1));
        assert_eq!(
            batch.records()[1]["b"],
            Value::List(vec![Value::Boolean(true)])
        );
    }

    #[test]
    fn test_integral_and_fractional_numbers() {
        assert_eq!(Value::from(json!(1)), Value::Integer(1));
        assert_eq!(Value::from(json!(1.0)), Value::Float(1.0));
        assert_eq!(Value::from(json!(u64::MAX)), Value::Float(u64::MAX as f64));
    }

    #[test]
    fn test_nested_objects_become_structs() {
        let value = Value::from(json!({"meta": {"source": "scraper"}}));
        match value {
            Value::Struct(map) => assert!(matches!(map["meta"], Value::Struct(_))),
            other => panic!("Expected Struct, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_non_object_records() {
        let err = Batch::from_json(json!([{"a": 1}, 42])).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedBatch(msg) if msg.contains("record 1")));

        assert!(matches!(
            Batch::from_json(json!("text")),
            Err(RegistryError::MalformedBatch(_))
        ));
        assert!(matches!(
            Batch::from_json_str("{not json"),
            Err(RegistryError::MalformedBatch(_))
        ));
    }

    #[test]
    fn test_empty_array_is_empty_batch() {
        let batch = Batch::from_json(json!([])).unwrap();
        assert!(batch.is_empty());
    }
}
