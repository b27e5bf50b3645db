//! Request payload building
//!
//! Turns desired-state attributes into the JSON bodies create and update
//! calls expect. Empty values are dropped unless a field is required.

use serde_json::{Map, Value};

/// Null, empty string, empty object and empty array are empty; `false` and `0` are not
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Recursively strip empty values; containers emptied by the strip are dropped too
pub fn remove_empty(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, remove_empty(v)))
                .filter(|(_, v)| !is_empty_value(v))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(remove_empty)
                .filter(|v| !is_empty_value(v))
                .collect(),
        ),
        other => other,
    }
}

/// Strip empty values at every level, keeping the named top-level keys as given
pub fn remove_empty_except(value: Value, required: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter_map(|(k, v)| {
                    if required.contains(&k.as_str()) {
                        return Some((k, v));
                    }
                    let v = remove_empty(v);
                    (!is_empty_value(&v)).then_some((k, v))
                })
                .collect(),
        ),
        other => remove_empty(other),
    }
}

/// Flatten a singleton block written as `[{...}]` into `{...}`
pub fn flatten_block(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Array(items) if items.len() == 1 => items[0].as_object(),
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// `None` for empty values so the field is omitted
pub fn value_ignore_empty(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !is_empty_value(v)).cloned()
}

/// Incremental JSON object builder that omits absent optional fields
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    body: Map<String, Value>,
    required: Vec<String>,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optional field; omitted when absent or empty
    pub fn field(mut self, key: &str, value: Option<Value>) -> Self {
        if let Some(v) = value {
            self.body.insert(key.to_string(), v);
        }
        self
    }

    /// Required field; always present, even when empty
    pub fn required(mut self, key: &str, value: Value) -> Self {
        self.body.insert(key.to_string(), value);
        self.required.push(key.to_string());
        self
    }

    pub fn build(self) -> Value {
        let required: Vec<&str> = self.required.iter().map(String::as_str).collect();
        remove_empty_except(Value::Object(self.body), &required)
    }
}
