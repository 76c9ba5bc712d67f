//! Event property filters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied by a [`PropertyFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOperator {
    #[default]
    Exact,
    IsNot,
    Icontains,
    IsSet,
    IsNotSet,
}

/// A filter on one key of an event's properties.
///
/// `value` may be a list for `exact` / `is_not`, meaning "any of" / "none of".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub operator: PropertyOperator,
}

impl PropertyFilter {
    pub fn exact(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            operator: PropertyOperator::Exact,
        }
    }

    pub fn with_operator(mut self, operator: PropertyOperator) -> Self {
        self.operator = operator;
        self
    }

    /// The filter value(s) as text, flattening a list value.
    pub fn values(&self) -> Vec<String> {
        match &self.value {
            Value::Array(items) => items.iter().filter_map(value_text).collect(),
            other => value_text(other).into_iter().collect(),
        }
    }

    /// Evaluate the filter against an event's properties object.
    pub fn matches(&self, properties: &Value) -> bool {
        let actual = properties.get(&self.key).and_then(value_text);
        match self.operator {
            PropertyOperator::Exact => actual.is_some_and(|a| self.values().contains(&a)),
            PropertyOperator::IsNot => {
                let actual = actual.unwrap_or_default();
                !self.values().contains(&actual)
            }
            PropertyOperator::Icontains => {
                let needle = value_text(&self.value).unwrap_or_default().to_lowercase();
                actual.is_some_and(|a| a.to_lowercase().contains(&needle))
            }
            PropertyOperator::IsSet => actual.is_some(),
            PropertyOperator::IsNotSet => actual.is_none(),
        }
    }
}

/// Text form of a JSON scalar as a SQL JSON extraction would return it.
///
/// `null` has no text form.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
