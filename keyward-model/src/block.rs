use crate::Family;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field values of a managed key, ordered by key.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

/// One declared managed key.
///
/// `name` is the identity within `family`. `fields` holds every other field,
/// including redacted ones the remote will never echo back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedKeyBlock {
    pub family: Family,
    pub name: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl ManagedKeyBlock {
    pub fn new(family: Family, name: impl Into<String>) -> Self {
        Self {
            family,
            name: name.into(),
            fields: FieldMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(|v| v.as_u64())
    }
}
