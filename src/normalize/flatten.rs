// src/normalize/flatten.rs

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Flattened keys of one designated JSON attribute, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    pub attribute: String,
    pub keys: Vec<String>,
}

impl AttributeSchema {
    pub fn new(attribute: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            attribute: attribute.into(),
            keys,
        }
    }

    /// Scan every row's flattened object and record each key the first time it shows up.
    pub fn derive(attribute: &str, objects: &[Map<String, Value>]) -> Self {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for obj in objects {
            for key in obj.keys() {
                if seen.insert(key.as_str()) {
                    keys.push(key.clone());
                }
            }
        }
        debug!(attribute, keys = keys.len(), "derived flatten schema");
        Self::new(attribute, keys)
    }

    /// Output column for `key`: `<attribute>.<key>`.
    pub fn column_name(&self, key: &str) -> String {
        format!("{}.{}", self.attribute, key)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.keys.iter().map(|k| self.column_name(k)).collect()
    }
}

/// The fixed output layout for all designated attributes of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenSchema {
    pub attributes: Vec<AttributeSchema>,
}

impl FlattenSchema {
    pub fn get(&self, attribute: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.attribute == attribute)
    }
}

/// Collapse nested objects into dotted keys: `{"a": {"b": 1}}` → `{"a.b": 1}`.
/// Empty nested objects contribute nothing.
///
/// Fails with the offending key when two paths flatten to the same name,
/// e.g. `{"a": {"b": 1}, "a.b": 2}`.
pub fn flatten_object(obj: &Map<String, Value>) -> Result<Map<String, Value>, String> {
    let mut out = Map::new();
    flatten_into("", obj, &mut out)?;
    Ok(out)
}

fn flatten_into(
    prefix: &str,
    obj: &Map<String, Value>,
    out: &mut Map<String, Value>,
) -> Result<(), String> {
    for (key, value) in obj {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) => flatten_into(&name, inner, out)?,
            other => {
                if out.contains_key(&name) {
                    return Err(name);
                }
                out.insert(name, other.clone());
            }
        }
    }
    Ok(())
}

/// Text form of a flattened leaf. `null` and `""` are missing.
pub fn leaf_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
