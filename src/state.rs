//! Resource state types
//!
//! Desired and observed attribute maps, remote handles, tag sets and the
//! change set computed between two desired states.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Attribute name to value mapping
pub type AttrMap = Map<String, Value>;

/// Read access shared by desired and observed state
pub trait Attributes {
    fn attrs(&self) -> &AttrMap;

    /// Attribute value; explicit nulls read as absent
    fn get(&self, name: &str) -> Option<&Value> {
        self.attrs().get(name).filter(|v| !v.is_null())
    }

    fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        })
    }

    fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    fn get_list(&self, name: &str) -> Option<&Vec<Value>> {
        self.get(name).and_then(Value::as_array)
    }

    /// Singleton nested block, accepting both `[{...}]` and `{...}`
    fn get_block(&self, name: &str) -> Option<&AttrMap> {
        match self.get(name)? {
            Value::Array(items) => items.first().and_then(Value::as_object),
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    fn tags(&self) -> TagSet {
        self.get("tags").map(TagSet::from_value).unwrap_or_default()
    }
}

/// Caller-declared target values for one resource instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredState(AttrMap);

impl DesiredState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; anything else is rejected
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::default()),
            _ => None,
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl Attributes for DesiredState {
    fn attrs(&self) -> &AttrMap {
        &self.0
    }
}

/// Attribute values last read back from the remote system
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservedState(AttrMap);

impl ObservedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Attributes for ObservedState {
    fn attrs(&self) -> &AttrMap {
        &self.0
    }
}

/// Opaque remote identifier; never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    /// `None` for empty or whitespace-only identifiers
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// `<id>/<name>` handle
    pub fn composite(id: &str, name: &str) -> Option<Self> {
        if id.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self(format!("{}/{}", id, name)))
    }

    /// Split a composite handle into exactly two non-empty segments
    pub fn split_composite(&self) -> Option<(&str, &str)> {
        split_two(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split `a/b` into `(a, b)`; more or fewer segments, or an empty one, fail
pub fn split_two(raw: &str) -> Option<(&str, &str)> {
    let mut parts = raw.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty() => Some((a, b)),
        _ => None,
    }
}

/// Tag key to tag value, keys unique
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a `{key: value}` object; non-string values are stringified
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        Self(
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect(),
        )
    }

    /// Read the API's `[{"key": ..., "value": ...}]` representation
    pub fn from_api_list(value: &Value) -> Self {
        let Some(items) = value.as_array() else {
            return Self::default();
        };
        Self(
            items
                .iter()
                .filter_map(|item| {
                    let key = item.get("key")?.as_str()?;
                    let value = item.get("value").and_then(Value::as_str).unwrap_or("");
                    Some((key.to_string(), value.to_string()))
                })
                .collect(),
        )
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    pub fn to_api_list(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|(k, v)| serde_json::json!({ "key": k, "value": v }))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One changed attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// Field-level difference between two desired states, computed once per update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<AttributeChange>,
}

impl ChangeSet {
    /// Compare two desired states; absent and null are the same value
    pub fn compute(old: &DesiredState, new: &DesiredState) -> Self {
        let fields: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
        let changes = fields
            .into_iter()
            .filter_map(|field| {
                let o = old.get(field).cloned().unwrap_or(Value::Null);
                let n = new.get(field).cloned().unwrap_or(Value::Null);
                (o != n).then(|| AttributeChange {
                    field: field.clone(),
                    old: o,
                    new: n,
                })
            })
            .collect();
        Self { changes }
    }

    pub fn from_changes(changes: Vec<AttributeChange>) -> Self {
        Self { changes }
    }

    pub fn has_change(&self, field: &str) -> bool {
        self.changes.iter().any(|c| c.field == field)
    }

    /// `(old, new)` for a changed field
    pub fn get_change(&self, field: &str) -> Option<(&Value, &Value)> {
        self.changes
            .iter()
            .find(|c| c.field == field)
            .map(|c| (&c.old, &c.new))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.field.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeChange> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
