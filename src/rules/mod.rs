//! Declarative trigger -> condition -> action rules
//!
//! Rules are stored independently and evaluated per event by [`RuleEngine`].
//! A rule reacts to one trigger type, tests at most one condition and runs an
//! ordered list of actions when the condition holds.

pub mod condition;
pub mod context;
pub mod engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use condition::{evaluate, Condition, Operator, RuleCondition};
pub use context::{ContextValue, EventContext};
pub use engine::{RuleEngine, RuleOutcome};

pub type RuleId = i64;

/// Category of event a rule reacts to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    GradeRecorded,
    ExamGraded,
    /// Emitted by the risk-classification pipeline
    RiskFlagged,
    /// Trigger names this engine does not know, kept verbatim
    Other(String),
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::GradeRecorded => "grade_recorded",
            TriggerType::ExamGraded => "exam_graded",
            TriggerType::RiskFlagged => "risk_flagged",
            TriggerType::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for TriggerType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "grade_recorded" => TriggerType::GradeRecorded,
            "exam_graded" => TriggerType::ExamGraded,
            "risk_flagged" => TriggerType::RiskFlagged,
            _ => TriggerType::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for TriggerType {
    fn from(s: String) -> Self {
        TriggerType::from(s.as_str())
    }
}

impl From<TriggerType> for String {
    fn from(t: TriggerType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tag of the remedial-task action in stored rules
pub const CREATE_REMEDIAL_TASK: &str = "CREATE_REMEDIAL_TASK";

/// Work a matched rule performs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredAction", into = "StoredAction")]
pub enum RuleAction {
    /// Generate remedial recommendations from the event's student, task and grade
    CreateRemedialTask {
        params: serde_json::Map<String, serde_json::Value>,
    },
    /// Action types added after this engine was built; executing one is a no-op
    Unknown {
        action_type: String,
        params: serde_json::Map<String, serde_json::Value>,
    },
}

impl RuleAction {
    pub fn create_remedial_task() -> Self {
        RuleAction::CreateRemedialTask {
            params: serde_json::Map::new(),
        }
    }

    /// Action from its stored type tag, without parameters
    pub fn from_tag(tag: &str) -> Self {
        RuleAction::from(StoredAction {
            action_type: tag.trim().to_string(),
            params: serde_json::Map::new(),
        })
    }

    pub fn type_tag(&self) -> &str {
        match self {
            RuleAction::CreateRemedialTask { .. } => CREATE_REMEDIAL_TASK,
            RuleAction::Unknown { action_type, .. } => action_type,
        }
    }
}

/// Wire form: `{"type": "...", "params": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAction {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default)]
    params: serde_json::Map<String, serde_json::Value>,
}

impl From<StoredAction> for RuleAction {
    fn from(raw: StoredAction) -> Self {
        match raw.action_type.as_str() {
            CREATE_REMEDIAL_TASK => RuleAction::CreateRemedialTask { params: raw.params },
            _ => RuleAction::Unknown {
                action_type: raw.action_type,
                params: raw.params,
            },
        }
    }
}

impl From<RuleAction> for StoredAction {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::CreateRemedialTask { params } => StoredAction {
                action_type: CREATE_REMEDIAL_TASK.to_string(),
                params,
            },
            RuleAction::Unknown { action_type, params } => StoredAction { action_type, params },
        }
    }
}

/// A persisted rule
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub trigger: TriggerType,
    pub condition: RuleCondition,
    pub actions: Vec<RuleAction>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Rule definition before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewRule {
    pub name: String,
    pub trigger: TriggerType,
    pub condition: RuleCondition,
    pub actions: Vec<RuleAction>,
    pub active: bool,
}

impl NewRule {
    pub fn new(name: &str, trigger: TriggerType) -> Self {
        Self {
            name: name.to_string(),
            trigger,
            condition: RuleCondition::Always,
            actions: Vec::new(),
            active: true,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = RuleCondition::Compare(condition);
        self
    }

    pub fn then(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_type_round_trip_through_strings() {
        assert_eq!(TriggerType::from("grade_recorded"), TriggerType::GradeRecorded);
        assert_eq!(TriggerType::from("attendance_dropped"), TriggerType::Other("attendance_dropped".into()));
        assert_eq!(TriggerType::RiskFlagged.to_string(), "risk_flagged");
    }

    #[test]
    fn test_actions_decode_into_closed_variants() {
        let actions: Vec<RuleAction> = serde_json::from_value(json!([
            {"type": "CREATE_REMEDIAL_TASK"},
            {"type": "SEND_EMAIL", "params": {"to": "tutor"}}
        ]))
        .unwrap();

        assert_eq!(actions[0], RuleAction::create_remedial_task());
        match &actions[1] {
            RuleAction::Unknown { action_type, params } => {
                assert_eq!(action_type, "SEND_EMAIL");
                assert_eq!(params.get("to"), Some(&json!("tutor")));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_action_encoding_uses_type_tag() {
        let encoded = serde_json::to_value(RuleAction::create_remedial_task()).unwrap();
        assert_eq!(encoded, json!({"type": "CREATE_REMEDIAL_TASK", "params": {}}));
    }
}
