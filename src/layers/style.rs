use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed style value interpreted by the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleValue {
    Str(String),
    Int(i64),
    Float(f64),
}

/// Open key/value styling for a layer.
///
/// Keys are free-form; common ones are `"color"` (hex string) and
/// `"size"` (point diameter) for vector point layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    values: BTreeMap<String, StyleValue>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), StyleValue::Str(value.into()));
    }

    pub fn set_double(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), StyleValue::Float(value));
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), StyleValue::Int(value));
    }

    pub fn get(&self, key: &str) -> Option<&StyleValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
