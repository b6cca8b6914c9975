//! Records and record keys.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field holding a record's key unless configured otherwise.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// Key identifying a record within a collection.
///
/// Remote sources send keys either as integers or as strings; both are
/// accepted. Other JSON types never match a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    /// Integer key.
    Int(i64),
    /// String key.
    Text(String),
}

impl RecordKey {
    /// Extracts a key from a JSON value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordKey::Int),
            Value::String(s) => Some(RecordKey::Text(s.clone())),
            _ => None,
        }
    }

    /// Converts the key back into a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            RecordKey::Int(n) => Value::from(*n),
            RecordKey::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(n) => write!(f, "{n}"),
            RecordKey::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(value: i64) -> Self {
        RecordKey::Int(value)
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        RecordKey::Text(value.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(value: String) -> Self {
        RecordKey::Text(value)
    }
}

/// A single JSON object kept in sync with a remote source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from a JSON object map.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns the value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Sets a field and returns the record, for building fixtures inline.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns the record's key read from `key_field`.
    pub fn key(&self, key_field: &str) -> Option<RecordKey> {
        self.get(key_field).and_then(RecordKey::from_value)
    }

    /// Returns the record's key, failing when it is absent or unusable.
    pub fn require_key(&self, key_field: &str) -> ProtocolResult<RecordKey> {
        self.key(key_field)
            .ok_or_else(|| ProtocolError::MissingKey(key_field.to_string()))
    }

    /// Copies every field of `other` into this record.
    ///
    /// Fields absent from `other` are left untouched.
    pub fn merge(&mut self, other: &Record) {
        for (field, value) in &other.fields {
            self.fields.insert(field.clone(), value.clone());
        }
    }

    /// Returns the underlying field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts the record into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_fields(fields)
    }
}

impl TryFrom<Value> for Record {
    type Error = ProtocolError;

    fn try_from(value: Value) -> ProtocolResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(ProtocolError::invalid_structure(format!(
                "expected object, found {}",
                json_type(&other)
            ))),
        }
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_from_int_and_text() {
        let record = Record::try_from(json!({"id": 7, "title": "x"})).unwrap();
        assert_eq!(record.key("id"), Some(RecordKey::Int(7)));

        let record = Record::try_from(json!({"id": "A"})).unwrap();
        assert_eq!(record.key("id"), Some(RecordKey::Text("A".into())));
    }

    #[test]
    fn unusable_keys() {
        let record = Record::try_from(json!({"id": 1.5, "uuid": null})).unwrap();
        assert_eq!(record.key("id"), None);
        assert_eq!(record.key("uuid"), None);
        assert!(matches!(
            record.require_key("missing"),
            Err(ProtocolError::MissingKey(field)) if field == "missing"
        ));
    }

    #[test]
    fn int_and_text_keys_differ() {
        assert_ne!(RecordKey::from(1), RecordKey::from("1"));
    }

    #[test]
    fn merge_overwrites_and_keeps() {
        let mut local = Record::new().with("id", 1).with("title", "old").with("done", false);
        let remote = Record::new().with("id", 1).with("title", "new");

        local.merge(&remote);

        assert_eq!(local.get("title"), Some(&json!("new")));
        assert_eq!(local.get("done"), Some(&json!(false)));
        assert_eq!(local.len(), 3);
    }

    #[test]
    fn non_object_rejected() {
        let err = Record::try_from(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn serializes_transparently() {
        let record = Record::new().with("id", "k");
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({"id": "k"}));
        assert_eq!(RecordKey::Text("k".into()).to_value(), json!("k"));
    }
}
