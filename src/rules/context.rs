//! Typed event context passed from the triggering event to rules and actions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{RemediationError, Result};

/// A single value carried by an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ContextValue {
    /// Numeric coercion used by the ordering operators.
    /// Text is parsed, booleans count as 1.0 / 0.0.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ContextValue::Int(i) => Some(*i as f64),
            ContextValue::Float(f) => Some(*f),
            ContextValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ContextValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Integer coercion for identifiers; floats must be integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ContextValue::Int(i) => Some(*i),
            ContextValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            ContextValue::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// String form used by the equality operator.
    /// Integral floats keep one decimal so `4.0` and `4` stay distinguishable.
    pub fn render(&self) -> String {
        match self {
            ContextValue::Bool(b) => b.to_string(),
            ContextValue::Int(i) => i.to_string(),
            ContextValue::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
                    format!("{:.1}", f)
                } else {
                    f.to_string()
                }
            }
            ContextValue::Text(s) => s.clone(),
        }
    }
}

impl std::fmt::Display for ContextValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        ContextValue::Int(v)
    }
}

impl From<i32> for ContextValue {
    fn from(v: i32) -> Self {
        ContextValue::Int(v as i64)
    }
}

impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        ContextValue::Float(v)
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        ContextValue::Bool(v)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        ContextValue::Text(v.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        ContextValue::Text(v)
    }
}

impl std::str::FromStr for ContextValue {
    type Err = std::convert::Infallible;

    /// Values that look numeric or boolean are typed accordingly
    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        Ok(parse_scalar(raw.trim()))
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Bool(b) => ContextValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ContextValue::Int(i),
                None => ContextValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ContextValue::Text(s),
            Value::Null => ContextValue::Text(String::new()),
            other => ContextValue::Text(other.to_string()),
        }
    }
}

/// Field name -> value mapping describing one event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    fields: BTreeMap<String, ContextValue>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<ContextValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ContextValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First key among `keys` that is present, coerced to an integer id
    pub fn require_i64(&self, keys: &[&str]) -> Result<i64> {
        let (key, value) = self.first_of(keys)?;
        value
            .as_i64()
            .ok_or_else(|| RemediationError::invalid(format!("context field '{}' is not an integer: {}", key, value)))
    }

    /// First key among `keys` that is present, coerced to a float
    pub fn require_f64(&self, keys: &[&str]) -> Result<f64> {
        let (key, value) = self.first_of(keys)?;
        value
            .as_f64()
            .ok_or_else(|| RemediationError::invalid(format!("context field '{}' is not numeric: {}", key, value)))
    }

    fn first_of<'a>(&'a self, keys: &[&'a str]) -> Result<(&'a str, &'a ContextValue)> {
        keys.iter()
            .find_map(|k| self.fields.get(*k).map(|v| (*k, v)))
            .ok_or_else(|| RemediationError::invalid(format!("context is missing field '{}'", keys.join("' / '"))))
    }

    /// Build from a JSON object payload
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self {
                fields: map.into_iter().map(|(k, v)| (k, ContextValue::from(v))).collect(),
            }),
            other => Err(RemediationError::invalid(format!("event context must be a JSON object, got {}", other))),
        }
    }

    /// Parse `key=value` pairs; values that look numeric or boolean are typed accordingly
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ctx = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| RemediationError::invalid(format!("expected key=value, got '{}'", pair)))?;
            ctx.insert(key.trim(), parse_scalar(raw.trim()));
        }
        Ok(ctx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContextValue)> {
        self.fields.iter()
    }
}

fn parse_scalar(raw: &str) -> ContextValue {
    if let Ok(i) = raw.parse::<i64>() {
        return ContextValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return ContextValue::Float(f);
    }
    match raw {
        "true" => ContextValue::Bool(true),
        "false" => ContextValue::Bool(false),
        _ => ContextValue::Text(raw.to_string()),
    }
}
