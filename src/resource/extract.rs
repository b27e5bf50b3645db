//! Response extraction
//!
//! Tolerant dot-path lookup over raw API responses and the builder that
//! assembles observed state from them.

use crate::error::{FieldError, ProviderError, Result};
use crate::schema::ResourceDescriptor;
use crate::state::{Attributes, ObservedState};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Look up a value by dot path; numeric segments index arrays.
/// Absent and explicit null both yield `None`.
pub fn path_search<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = item;
    for part in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(part)?,
            _ => return None,
        };
    }

    (!current.is_null()).then_some(current)
}

/// Lookup with an explicit default
pub fn path_search_or(item: &Value, path: &str, default: Value) -> Value {
    path_search(item, path).cloned().unwrap_or(default)
}

pub fn path_str(item: &Value, path: &str) -> Option<String> {
    path_search(item, path)
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn path_str_or(item: &Value, path: &str, default: &str) -> String {
    path_str(item, path).unwrap_or_else(|| default.to_string())
}

pub fn path_i64(item: &Value, path: &str) -> Option<i64> {
    let value = path_search(item, path)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

pub fn path_f64(item: &Value, path: &str) -> Option<f64> {
    path_search(item, path).and_then(Value::as_f64)
}

pub fn path_bool(item: &Value, path: &str) -> Option<bool> {
    path_search(item, path).and_then(Value::as_bool)
}

fn epoch_millis_to_datetime(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    DateTime::from_timestamp((millis / 1000.0).trunc() as i64, 0)
}

/// Epoch milliseconds as RFC3339 in UTC, second precision
pub fn format_epoch_millis_rfc3339(millis: f64) -> Option<String> {
    epoch_millis_to_datetime(millis).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Epoch milliseconds as `YYYY-MM-DD HH:MM:SS UTC`
pub fn format_epoch_millis_utc(millis: f64) -> Option<String> {
    epoch_millis_to_datetime(millis).map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

/// RFC3339 timestamp read from an epoch-millisecond field, or null when absent
pub fn rfc3339_at(item: &Value, path: &str) -> Value {
    path_f64(item, path)
        .and_then(format_epoch_millis_rfc3339)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// Collects attribute writes into observed state, keeping every failure
pub struct ObservedStateBuilder<'a> {
    descriptor: &'a ResourceDescriptor,
    state: ObservedState,
    errors: Vec<FieldError>,
}

impl<'a> ObservedStateBuilder<'a> {
    pub fn new(descriptor: &'a ResourceDescriptor) -> Self {
        Self {
            descriptor,
            state: ObservedState::new(),
            errors: Vec::new(),
        }
    }

    /// Write one attribute, type-checked against the descriptor
    pub fn set(&mut self, name: &str, value: Value) -> &mut Self {
        let descriptor = self.descriptor;
        match descriptor.attribute(name) {
            None => self.push_error(FieldError::new(name, "not declared in the schema")),
            Some(def) if !def.attr_type.matches(&value) => {
                let message = format!(
                    "expected {}, got {}",
                    def.attr_type.as_str(),
                    kind_of(&value)
                );
                self.push_error(FieldError::new(name, message))
            }
            Some(_) => {
                self.state.set(name, value);
                self
            }
        }
    }

    /// Copy a path of the raw response into an attribute; absent becomes null
    pub fn copy(&mut self, name: &str, raw: &Value, path: &str) -> &mut Self {
        let value = path_search_or(raw, path, Value::Null);
        self.set(name, value)
    }

    pub fn push_error(&mut self, error: FieldError) -> &mut Self {
        self.errors.push(error);
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.state.get(name).is_some()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Observed state, or every collected failure at once
    pub fn finish(self) -> Result<ObservedState> {
        if self.errors.is_empty() {
            Ok(self.state)
        } else {
            Err(ProviderError::PartialFieldSet {
                kind: self.descriptor.kind.clone(),
                errors: self.errors,
            })
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
