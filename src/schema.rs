//! Resource schema descriptors
//!
//! A [`ResourceDescriptor`] declares every attribute of a resource kind: its
//! type, whether it is required, optional or computed, whether changing it
//! forces a replacement, which update group carries it, and the validation
//! rule it must satisfy. Descriptors are loaded once from the embedded JSON
//! definitions (see [`crate::resource::registry`]).

use crate::error::{ProviderError, Result};
use crate::state::{Attributes, ChangeSet, DesiredState};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Int,
    Bool,
    List,
    Map,
    /// Singleton nested block, written either as `{...}` or `[{...}]`
    Block,
}

impl AttributeType {
    /// Whether a value has this type; null matches every type
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Int, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (Self::Bool, Value::Bool(_)) => true,
            (Self::List, Value::Array(_)) => true,
            (Self::Map, Value::Object(_)) => true,
            (Self::Block, Value::Object(_)) => true,
            (Self::Block, Value::Array(items)) => items.len() == 1 && items[0].is_object(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Map => "map",
            Self::Block => "block",
        }
    }
}

/// Constraint checked against a present attribute value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Regular expression a string value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Enumerated allowed string values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    /// Maximum string length in characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl ValidationRule {
    /// Every violation of this rule by `value`, as messages without the field name
    pub fn check(&self, value: &Value) -> Vec<String> {
        let mut violations = Vec::new();

        if let Some(s) = value.as_str() {
            if let Some(pattern) = &self.pattern {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(s) => {
                        violations.push(format!("{:?} does not match {}", s, pattern));
                    }
                    Ok(_) => {}
                    Err(e) => violations.push(format!("invalid pattern {}: {}", pattern, e)),
                }
            }
            if !self.one_of.is_empty() && !self.one_of.iter().any(|v| v == s) {
                violations.push(format!(
                    "{:?} is not one of [{}]",
                    s,
                    self.one_of.join(", ")
                ));
            }
            if let Some(max_len) = self.max_length {
                if s.chars().count() > max_len {
                    violations.push(format!("length must be at most {}", max_len));
                }
            }
        }

        if let Some(n) = value.as_i64() {
            if let Some(min) = self.min {
                if n < min {
                    violations.push(format!("{} is less than the minimum {}", n, min));
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    violations.push(format!("{} is greater than the maximum {}", n, max));
                }
            }
        }

        violations
    }
}

/// One declared attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    /// Populated by the remote side; settable too when also `optional`
    #[serde(default)]
    pub computed: bool,
    /// Any change requires destroying and recreating the resource
    #[serde(default)]
    pub force_new: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRule>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Nested attributes of a block, or of every element of a list of blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeDef>,
}

impl AttributeDef {
    /// Computed-only attributes cannot appear in desired state
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    /// Whether the attribute can change in place
    pub fn is_updatable(&self) -> bool {
        !self.force_new && !self.is_computed_only()
    }
}

/// How a resource recognises a missing remote object in an error response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotFoundRule {
    /// Application error codes meaning "gone", whatever the HTTP status
    #[serde(default)]
    pub error_codes: Vec<String>,
    #[serde(default)]
    pub status_codes: Vec<u16>,
}

/// Static description of a resource kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(default)]
    pub kind: String,
    pub display_name: String,
    /// Cloud service whose endpoint serves this resource
    pub service: String,
    /// Import identifier format shown in errors, e.g. `<id>/<name>`
    pub id_format: String,
    #[serde(default)]
    pub not_found: NotFoundRule,
    /// Update groups in dispatch order
    #[serde(default)]
    pub update_groups: Vec<String>,
    pub attributes: Vec<AttributeDef>,
}

impl ResourceDescriptor {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Check desired state, collecting every violation
    pub fn validate(&self, desired: &DesiredState) -> Result<()> {
        let mut violations = Vec::new();

        for key in desired.keys() {
            if !self.has_attribute(key) {
                violations.push(format!("{}: unknown attribute", key));
            }
        }

        for def in &self.attributes {
            check_attribute(def, desired.get(&def.name), &def.name, &mut violations);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::Validation {
                kind: self.kind.clone(),
                violations,
            })
        }
    }

    /// Changed attributes that cannot be updated in place
    pub fn replacement_fields(&self, changes: &ChangeSet) -> Vec<String> {
        changes
            .fields()
            .filter(|f| self.attribute(f).is_some_and(|a| a.force_new))
            .map(str::to_string)
            .collect()
    }

    /// Update groups touched by `changes`, in declared order
    pub fn changed_groups(&self, changes: &ChangeSet) -> Vec<&str> {
        self.update_groups
            .iter()
            .filter(|group| {
                self.attributes.iter().any(|a| {
                    a.update_group.as_deref() == Some(group.as_str()) && changes.has_change(&a.name)
                })
            })
            .map(String::as_str)
            .collect()
    }

    /// Attributes carried by an update group
    pub fn group_attributes(&self, group: &str) -> Vec<&AttributeDef> {
        self.attributes
            .iter()
            .filter(|a| a.update_group.as_deref() == Some(group))
            .collect()
    }
}

/// `[]` for a block reads as unset
fn is_empty_block(def: &AttributeDef, value: &Value) -> bool {
    def.attr_type == AttributeType::Block && value.as_array().is_some_and(Vec::is_empty)
}

fn check_attribute(def: &AttributeDef, value: Option<&Value>, path: &str, out: &mut Vec<String>) {
    let Some(value) = value.filter(|v| !v.is_null() && !is_empty_block(def, v)) else {
        if def.required {
            out.push(format!("{}: is required", path));
        }
        return;
    };

    if def.is_computed_only() {
        out.push(format!("{}: is computed and cannot be set", path));
        return;
    }

    if !def.attr_type.matches(value) {
        out.push(format!("{}: expected {}", path, def.attr_type.as_str()));
        return;
    }

    if let Some(rule) = &def.validation {
        out.extend(
            rule.check(value)
                .into_iter()
                .map(|v| format!("{}: {}", path, v)),
        );
    }

    if def.attributes.is_empty() {
        return;
    }

    // nested blocks
    let elements: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for (idx, element) in elements.iter().enumerate() {
        let Some(map) = element.as_object() else {
            out.push(format!("{}.{}: expected block", path, idx));
            continue;
        };
        let prefix = if def.attr_type == AttributeType::Block {
            path.to_string()
        } else {
            format!("{}.{}", path, idx)
        };
        for key in map.keys() {
            if !def.attributes.iter().any(|a| &a.name == key) {
                out.push(format!("{}.{}: unknown attribute", prefix, key));
            }
        }
        for nested in &def.attributes {
            let nested_path = format!("{}.{}", prefix, nested.name);
            check_attribute(nested, map.get(&nested.name), &nested_path, out);
        }
    }
}
