//! JSON-safe capture of runtime values
//!
//! Converts any [`Value`] into a `serde_json::Value`, bounded by recursion
//! depth. Depth, not a visited set, is what breaks cycles: a graph that
//! contains itself is cut off after `max_depth` levels like any other deep
//! structure. Capture never fails; values without a JSON form resolve to one
//! of the marker strings below.

use crate::value::{format_float, Inspect, Value};
use serde_json::{Map, Value as JsonValue};
use std::fmt::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Default recursion limit
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Replaces anything nested deeper than the limit
pub const MAX_DEPTH_MARKER: &str = "[Max Depth Exceeded]";

/// Replaces callables; code is never captured
pub const FUNCTION_MARKER: &str = "[Function]";

/// Replaces values whose display form cannot be produced
pub const UNSERIALIZABLE_MARKER: &str = "[Unserializable]";

/// Depth-bounded value serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSerializer {
    max_depth: usize,
}

impl Default for ValueSerializer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl ValueSerializer {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Serialize a top-level value
    pub fn serialize(&self, value: &Value) -> JsonValue {
        self.serialize_at(value, 0)
    }

    /// Serialize a value found at `depth`
    pub fn serialize_at(&self, value: &Value, depth: usize) -> JsonValue {
        if depth > self.max_depth {
            return JsonValue::from(MAX_DEPTH_MARKER);
        }

        match value {
            Value::None => JsonValue::Null,
            v if v.is_callable() => JsonValue::from(FUNCTION_MARKER),
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(x) => serialize_float(*x),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::List(_) | Value::Tuple(_) => {
                let items = value.sequence_snapshot().unwrap_or_default();
                JsonValue::Array(
                    items
                        .iter()
                        .map(|item| self.serialize_at(item, depth + 1))
                        .collect(),
                )
            }
            Value::Dict(_) => {
                let entries = value.mapping_snapshot().unwrap_or_default();
                let mut map = Map::new();
                for (k, v) in &entries {
                    map.insert(coerce_key(k), self.serialize_at(v, depth + 1));
                }
                JsonValue::Object(map)
            }
            Value::Object(obj) => match obj.attributes() {
                Some(attrs) => {
                    let mut map = Map::new();
                    for (name, v) in attrs.iter().filter(|(name, _)| !name.starts_with('_')) {
                        map.insert(name.clone(), self.serialize_at(v, depth + 1));
                    }
                    JsonValue::Object(map)
                }
                None => describe_or_marker(obj.as_ref()),
            },
            // Plain functions are caught by the callable arm above
            Value::Function(_) => JsonValue::from(FUNCTION_MARKER),
        }
    }
}

/// Serialize with the default depth limit
pub fn serialize(value: &Value) -> JsonValue {
    ValueSerializer::default().serialize(value)
}

fn serialize_float(x: f64) -> JsonValue {
    match serde_json::Number::from_f64(x) {
        Some(n) => JsonValue::Number(n),
        None => JsonValue::String(format_float(x)),
    }
}

/// String form of a dict key
pub fn coerce_key(key: &Value) -> String {
    match key {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Describe<'a>(&'a dyn Inspect);

impl fmt::Display for Describe<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.describe(f)
    }
}

fn describe_or_marker(obj: &dyn Inspect) -> JsonValue {
    let rendered = catch_unwind(AssertUnwindSafe(|| {
        let mut out = String::new();
        write!(out, "{}", Describe(obj)).map(|_| out)
    }));
    match rendered {
        Ok(Ok(text)) => JsonValue::String(text),
        _ => JsonValue::from(UNSERIALIZABLE_MARKER),
    }
}
