use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use super::{DbError, Result, Value};

/// Unique document identifier.
pub const ID_FIELD: &str = "_id";
/// Engine-maintained auto-increment row number.
pub const ROWID_FIELD: &str = "_rowid";
/// Unix timestamp of the first write.
pub const CREATED_FIELD: &str = "_created";
/// Unix timestamp of the latest write.
pub const UPDATED_FIELD: &str = "_updated";

/// Backend-visible document: a plain key/value map plus the reserved fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, handy when assembling records inline.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Identifier, if the record has been stored (or the caller supplied one).
    pub fn id(&self) -> Option<&str> {
        match self.fields.get(ID_FIELD) {
            Some(Value::Text(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    pub fn row_id(&self) -> Option<i64> {
        self.fields.get(ROWID_FIELD).and_then(Value::as_i64)
    }

    /// Fields that belong in the serialized body: everything except the
    /// identifier and the row number, which live in their own columns.
    pub fn body(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .filter(|(name, _)| name.as_str() != ID_FIELD && name.as_str() != ROWID_FIELD)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn from_json(json: &JsonValue) -> Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| DbError::InvalidArgument("Expected a JSON object".into()))?;

        Ok(Self {
            fields: obj
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect(),
        })
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<Record> for BTreeMap<String, Value> {
    fn from(record: Record) -> Self {
        record.fields
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
