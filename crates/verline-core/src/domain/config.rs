//! Run configurations and their canonical JSON form.
//!
//! A configuration is a flat JSON object of primitive values. Integer-valued
//! floats are normalised to integers on construction, so `{"lr": 1.0}` and
//! `{"lr": 1}` are the same configuration. Equality is byte equality of the
//! canonical form (keys sorted, compact).

use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::domain::error::{Result, VersioningError};
use crate::domain::fingerprint::VersionFingerprint;

/// Parameter set of one run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Value")]
pub struct Configuration(Map<String, Value>);

impl Configuration {
    /// Validate `value` as a flat object of primitives.
    pub fn from_value(value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(VersioningError::ConfigurationInvalid(format!(
                    "expected a JSON object, got {}",
                    kind(&other)
                )))
            }
        };

        let mut normalized = Map::new();
        for (key, value) in map {
            let value = match value {
                Value::Array(_) | Value::Object(_) => {
                    return Err(VersioningError::ConfigurationInvalid(format!(
                        "parameter {key:?} is {}, only null, bool, number and string are allowed",
                        kind(&value)
                    )))
                }
                Value::Number(n) => Value::Number(normalize_number(n)),
                primitive => primitive,
            };
            normalized.insert(key, value);
        }
        Ok(Configuration(normalized))
    }

    /// Build a configuration from any serializable parameter struct.
    pub fn from_serialize<T: Serialize>(params: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(params)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact JSON with keys in lexicographic order.
    pub fn canonical_json(&self) -> String {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut sorted = Map::new();
        for (key, value) in entries {
            sorted.insert(key.clone(), value.clone());
        }
        Value::Object(sorted).to_string()
    }

    /// Deterministic identifier of this configuration.
    pub fn fingerprint(&self) -> VersionFingerprint {
        VersionFingerprint::of(self)
    }
}

// 2^63 and 2^64, exactly representable; `i64::MAX as f64` rounds up to 2^63.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

/// Integer-valued floats become integers; everything else passes through.
fn normalize_number(n: Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n;
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f) => {
            Number::from(f as i64)
        }
        Some(f) if f.fract() == 0.0 && (0.0..U64_BOUND).contains(&f) => Number::from(f as u64),
        _ => n,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_json() == other.canonical_json()
    }
}

impl Eq for Configuration {}

impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl TryFrom<Value> for Configuration {
    type Error = VersioningError;

    fn try_from(value: Value) -> Result<Self> {
        Configuration::from_value(value)
    }
}

impl FromStr for Configuration {
    type Err = VersioningError;

    fn from_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s).map_err(|e| {
            VersioningError::ConfigurationInvalid(format!("not valid JSON: {e}"))
        })?;
        Configuration::from_value(value)
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_json())
    }
}
