//! Document values
//!
//! A tagged tree mirroring what the document store hands back. Objects keep
//! their keys in source order so that discovery walks documents the same way
//! every run.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum DocValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    /// Integer outside the 64-bit range, kept as canonical decimal text
    BigInt(String),
    /// Decimal beyond double precision, kept as canonical decimal text
    BigDecimal(String),
    Text(String),
    Object(DocObject),
    Array(Vec<DocValue>),
}

impl DocValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            DocValue::Null => "null",
            DocValue::Bool(_) => "boolean",
            DocValue::Int64(_) => "int64",
            DocValue::Float64(_) => "float64",
            DocValue::BigInt(_) => "bigint",
            DocValue::BigDecimal(_) => "bigdecimal",
            DocValue::Text(_) => "text",
            DocValue::Object(_) => "object",
            DocValue::Array(_) => "array",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DocValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DocValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&DocObject> {
        match self {
            DocValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DocValue]> {
        match self {
            DocValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self.clone())
    }
}

impl fmt::Display for DocValue {
    /// Renders the value the way it would print as JSON
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for DocValue {
    fn from(s: &str) -> Self {
        DocValue::Text(s.to_string())
    }
}

impl From<String> for DocValue {
    fn from(s: String) -> Self {
        DocValue::Text(s)
    }
}

impl From<i64> for DocValue {
    fn from(i: i64) -> Self {
        DocValue::Int64(i)
    }
}

impl From<bool> for DocValue {
    fn from(b: bool) -> Self {
        DocValue::Bool(b)
    }
}

impl From<serde_json::Value> for DocValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DocValue::Null,
            serde_json::Value::Bool(b) => DocValue::Bool(b),
            serde_json::Value::Number(n) => number_to_value(&n),
            serde_json::Value::String(s) => DocValue::Text(s),
            serde_json::Value::Array(items) => {
                DocValue::Array(items.into_iter().map(DocValue::from).collect())
            }
            serde_json::Value::Object(map) => DocValue::Object(
                map.into_iter().map(|(k, v)| (k, DocValue::from(v))).collect(),
            ),
        }
    }
}

impl From<DocValue> for serde_json::Value {
    fn from(value: DocValue) -> Self {
        match value {
            DocValue::Null => serde_json::Value::Null,
            DocValue::Bool(b) => serde_json::Value::Bool(b),
            DocValue::Int64(i) => serde_json::Value::from(i),
            DocValue::Float64(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DocValue::BigInt(s) | DocValue::BigDecimal(s) => numeric_text_to_json(s),
            DocValue::Text(s) => serde_json::Value::String(s),
            DocValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            DocValue::Object(obj) => serde_json::Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Significant digits a double reproduces exactly through decimal text
const DOUBLE_DIGITS: usize = 15;

// With `arbitrary_precision` the number keeps its source text, so values
// beyond i64 or double precision are not rounded on the way in.
fn number_to_value(n: &serde_json::Number) -> DocValue {
    if let Some(i) = n.as_i64() {
        return DocValue::Int64(i);
    }
    let text = n.to_string();
    if !text.contains(['.', 'e', 'E']) {
        return DocValue::BigInt(text);
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && significant_digits(&text) <= DOUBLE_DIGITS => {
            DocValue::Float64(f)
        }
        _ => DocValue::BigDecimal(text),
    }
}

fn significant_digits(text: &str) -> usize {
    let mantissa = text.split(['e', 'E']).next().unwrap_or(text);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    digits.trim_start_matches('0').trim_end_matches('0').len()
}

// Big numbers go back out as JSON numbers; unparseable text stays a string.
fn numeric_text_to_json(text: String) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Number>(&text) {
        Ok(n) => serde_json::Value::Number(n),
        Err(_) => serde_json::Value::String(text),
    }
}

/// Insertion-ordered key/value map for document objects
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocObject {
    entries: Vec<(String, DocValue)>,
}

impl DocObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key, keeping the original position on replace
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DocValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder form of [`DocObject::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<DocValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&DocValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DocValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<DocObject> for DocValue {
    fn from(obj: DocObject) -> Self {
        DocValue::Object(obj)
    }
}

impl From<Vec<DocValue>> for DocValue {
    fn from(items: Vec<DocValue>) -> Self {
        DocValue::Array(items)
    }
}

impl FromIterator<(String, DocValue)> for DocObject {
    fn from_iter<I: IntoIterator<Item = (String, DocValue)>>(iter: I) -> Self {
        let mut obj = DocObject::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

impl IntoIterator for DocObject {
    type Item = (String, DocValue);
    type IntoIter = std::vec::IntoIter<(String, DocValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for DocObject {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DocValue::Object(self.clone()).to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DocObject {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match DocValue::deserialize(deserializer)? {
            DocValue::Object(obj) => Ok(obj),
            other => Err(serde::de::Error::custom(format!(
                "expected a JSON object, got {}",
                other.kind_name()
            ))),
        }
    }
}
