use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::utils::case::camel_to_snake;

/// Entry type recorded for fetched resources.
pub const RESOURCE: &str = "resource";

/// Properties dropped when normalizing an entry.
const EXCLUDED_PROPS: [&str; 3] = ["name", "initiatorType", "entryType"];

/// A raw record from the performance timeline.
///
/// Fields are stored as recorded, camelCase keys and all, so a recorder may
/// attach anything including values that are not numbers or strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceEntry {
    fields: Map<String, Value>,
}

impl PerformanceEntry {
    pub fn new(name: &str, entry_type: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::from(name));
        fields.insert("entryType".to_string(), Value::from(entry_type));
        Self { fields }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn name(&self) -> &str {
        self.fields.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn entry_type(&self) -> &str {
        self.fields
            .get("entryType")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<&ResourceTimingEntry> for PerformanceEntry {
    fn from(entry: &ResourceTimingEntry) -> Self {
        let fields = entry
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Self { fields }
    }
}

/// A primitive timing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimingValue {
    Number(f64),
    Text(String),
}

impl TimingValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(TimingValue::Number),
            Value::String(s) => Some(TimingValue::Text(s.clone())),
            Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            TimingValue::Number(n) => Value::from(*n),
            TimingValue::Text(s) => Value::from(s.as_str()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TimingValue::Number(n) => Some(*n),
            TimingValue::Text(_) => None,
        }
    }
}

/// A normalized timing record: snake_case keys, primitive values only.
pub type ResourceTimingEntry = BTreeMap<String, TimingValue>;

/// Decides whether an observed entry carries usable timing detail.
pub type EntryPredicate = Arc<dyn Fn(&PerformanceEntry) -> bool + Send + Sync>;

/// Default validity rule.
///
/// Rejects entries with a zero `requestStart` (a cross-origin entry without
/// timing detail) and entries whose connect phase has zero length (a reused
/// connection).
pub fn is_valid_entry(entry: &PerformanceEntry) -> bool {
    entry.number("requestStart") != Some(0.0)
        && entry.number("connectStart") != entry.number("connectEnd")
}

pub fn default_entry_predicate() -> EntryPredicate {
    Arc::new(is_valid_entry)
}

/// Convert a raw entry into its canonical form.
pub fn normalize_entry(entry: &PerformanceEntry) -> ResourceTimingEntry {
    entry
        .fields
        .iter()
        .filter(|(key, _)| !EXCLUDED_PROPS.contains(&key.as_str()))
        .filter_map(|(key, value)| {
            TimingValue::from_json(value).map(|v| (camel_to_snake(key), v))
        })
        .collect()
}
