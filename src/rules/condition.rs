//! Condition evaluation
//!
//! A rule carries at most one `{field, operator, value}` test. Evaluation is
//! fail-closed: missing fields, coercion failures, unknown operators and
//! malformed stored conditions all evaluate to `false`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::context::{ContextValue, EventContext};
use crate::error::{RemediationError, Result};

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    /// Any operator this engine does not understand
    #[serde(other)]
    Unknown,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Eq => "==",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Unknown => "?",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "==" => Operator::Eq,
            ">=" => Operator::Ge,
            "<=" => Operator::Le,
            _ => Operator::Unknown,
        }
    }
}

/// A single field/operator/threshold test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: ContextValue,
}

impl Condition {
    pub fn new(field: &str, operator: Operator, value: impl Into<ContextValue>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator.symbol(), self.value)
    }
}

/// Condition attached to a rule, as decoded from storage
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    /// No condition: the rule always matches
    Always,
    Compare(Condition),
    /// Stored text that does not decode into a condition
    Malformed(String),
}

impl RuleCondition {
    /// Decode the stored JSON form. Absent text and empty JSON values
    /// (`null`, an empty object, array or string) mean unconditional.
    pub fn decode(raw: Option<&str>) -> Self {
        let raw = match raw.map(str::trim) {
            None | Some("") => return RuleCondition::Always,
            Some(raw) => raw,
        };
        let value = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => value,
            Err(_) => return RuleCondition::Malformed(raw.to_string()),
        };
        let empty = match &value {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if empty {
            return RuleCondition::Always;
        }
        match serde_json::from_value::<Condition>(value) {
            Ok(cond) => RuleCondition::Compare(cond),
            Err(_) => RuleCondition::Malformed(raw.to_string()),
        }
    }

    /// Stored JSON form; `None` for unconditional rules
    pub fn encode(&self) -> Option<String> {
        match self {
            RuleCondition::Always => None,
            RuleCondition::Compare(cond) => serde_json::to_string(cond).ok(),
            RuleCondition::Malformed(raw) => Some(raw.clone()),
        }
    }
}

impl std::fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleCondition::Always => write!(f, "always"),
            RuleCondition::Compare(cond) => write!(f, "{}", cond),
            RuleCondition::Malformed(raw) => write!(f, "malformed({})", raw),
        }
    }
}

/// Evaluate a rule condition against an event context
pub fn evaluate(condition: &RuleCondition, context: &EventContext) -> bool {
    match condition {
        RuleCondition::Always => true,
        RuleCondition::Compare(cond) => match compare(cond, context) {
            Ok(matched) => matched,
            Err(e) => {
                debug!("Condition '{}' evaluated to false: {}", cond, e);
                false
            }
        },
        RuleCondition::Malformed(raw) => {
            debug!("Malformed condition evaluated to false: {}", raw);
            false
        }
    }
}

/// Strict comparison; coercion problems surface as `InvalidCondition`
pub fn compare(cond: &Condition, context: &EventContext) -> Result<bool> {
    let Some(actual) = context.get(&cond.field) else {
        return Ok(false);
    };

    let numeric = |v: &ContextValue| {
        v.as_f64()
            .ok_or_else(|| RemediationError::InvalidCondition(format!("'{}' is not numeric", v)))
    };

    let matched = match cond.operator {
        Operator::Eq => actual.render() == cond.value.render(),
        Operator::Lt => numeric(actual)? < numeric(&cond.value)?,
        Operator::Gt => numeric(actual)? > numeric(&cond.value)?,
        Operator::Ge => numeric(actual)? >= numeric(&cond.value)?,
        Operator::Le => numeric(actual)? <= numeric(&cond.value)?,
        Operator::Unknown => false,
    };
    Ok(matched)
}
