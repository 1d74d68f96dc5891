use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Errors that can occur during Record operations
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
}

/// Loaded association value stored under the relation name.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Box<Record>),
    Many(Vec<Record>),
}

impl Related {
    pub fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            Related::One(record) => vec![record.as_mut()],
            Related::Many(records) => records.iter_mut().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Related::Many(records) if records.is_empty())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Related::One(record) => record.to_json(),
            Related::Many(records) => Value::Array(records.iter().map(Record::to_json).collect()),
        }
    }
}

/// A dynamic row with a persisted flag and slots for loaded associations.
///
/// Field names are column names; the entity schema says which of them persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// False until inserted or loaded
    persisted: bool,
    fields: HashMap<String, Value>,
    relations: HashMap<String, Related>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    pub fn new() -> Self {
        Self {
            persisted: false,
            fields: HashMap::new(),
            relations: HashMap::new(),
        }
    }

    /// Build an unsaved record from a JSON object
    pub fn from_json(json: Value) -> Result<Self, RecordError> {
        match json {
            Value::Object(map) => {
                let mut record = Self::new();
                for (key, value) in map {
                    record.fields.insert(key, value);
                }
                Ok(record)
            }
            _ => Err(RecordError::InvalidJson("Expected JSON object".to_string())),
        }
    }

    /// Build a persisted record from a result row
    pub fn from_row(row: Map<String, Value>) -> Self {
        Self {
            persisted: true,
            fields: row.into_iter().collect(),
            relations: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Missing, null, `""`, `0` and `false` all count as blank.
    pub fn is_blank(&self, key: &str) -> bool {
        match self.fields.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Number(n)) => n.as_f64() == Some(0.0),
            Some(Value::Bool(b)) => !b,
            Some(Value::Array(a)) => a.is_empty(),
            Some(Value::Object(o)) => o.is_empty(),
        }
    }

    /// Set field only if it's currently blank
    pub fn set_if_blank(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        if self.is_blank(&key) {
            self.set(key, value);
        }
        self
    }

    /// Copy values from a freshly loaded row
    pub fn absorb(&mut self, row: &Map<String, Value>) -> &mut Self {
        for (key, value) in row {
            self.fields.insert(key.clone(), value.clone());
        }
        self
    }

    // ========================================
    // Timestamps
    // ========================================

    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn set_timestamp(&mut self, key: impl Into<String>, at: DateTime<Utc>) -> &mut Self {
        self.set(key, Value::String(at.to_rfc3339()))
    }

    /// True until the record has been inserted or loaded
    pub fn is_new_record(&self) -> bool {
        !self.persisted
    }

    pub fn mark_persisted(&mut self) -> &mut Self {
        self.persisted = true;
        self
    }

    // ========================================
    // Associations
    // ========================================

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) -> &mut Self {
        self.relations.insert(name.into(), related);
        self
    }

    pub fn take_relation(&mut self, name: &str) -> Option<Related> {
        self.relations.remove(name)
    }

    /// Unset or empty
    pub fn relation_is_empty(&self, name: &str) -> bool {
        self.relations.get(name).map_or(true, Related::is_empty)
    }

    // ========================================
    // Serialization
    // ========================================

    /// Fields plus loaded relations nested under their names
    pub fn to_json(&self) -> Value {
        let mut map: Map<String, Value> = self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (name, related) in &self.relations {
            map.insert(name.clone(), related.to_json());
        }
        Value::Object(map)
    }
}

// ========================================
// Conversions
// ========================================

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_row(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.to_json()
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Record(fields: {}, relations: {}, new: {})",
            self.fields.len(),
            self.relations.len(),
            self.is_new_record()
        )
    }
}
