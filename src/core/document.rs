//! Payload tree for migrated documents.
//!
//! Legacy files hold arbitrary JSON. Rather than passing `serde_json::Value`
//! around and checking shapes at runtime, payloads are lifted into a closed
//! variant tree so every transform over them is an exhaustive `match`.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<Document>),
    Mapping(BTreeMap<String, Document>),
}

impl Document {
    /// The payload used for ids with no backing file.
    pub fn empty() -> Self {
        Document::Mapping(BTreeMap::new())
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Document::Mapping(_))
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Document>> {
        match self {
            Document::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Value::from(self.clone()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Document::from(value))
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::empty()
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Document::Null,
            Value::Bool(b) => Document::Bool(b),
            Value::Number(n) => Document::Number(n),
            Value::String(s) => Document::String(s),
            Value::Array(items) => Document::Sequence(items.into_iter().map(Document::from).collect()),
            Value::Object(map) => Document::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, Document::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        match doc {
            Document::Null => Value::Null,
            Document::Bool(b) => Value::Bool(b),
            Document::Number(n) => Value::Number(n),
            Document::String(s) => Value::String(s),
            Document::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Document::Mapping(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k, Value::from(v));
                }
                Value::Object(out)
            }
        }
    }
}
