//! Rule evaluation engine
//!
//! Loads the active rules of a trigger, tests each condition and runs the
//! actions of every match. Failures stay inside the rule that caused them.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::condition::{evaluate, RuleCondition};
use super::context::EventContext;
use super::{Rule, RuleAction, RuleId, TriggerType};
use crate::error::Result;
use crate::recommend::RecommendationEngine;
use crate::store::RemediationStore;

const STUDENT_KEYS: &[&str] = &["student_id"];
const TASK_KEYS: &[&str] = &["task_id", "tarea_id"];
const GRADE_KEYS: &[&str] = &["grade", "nota"];

/// What happened to one matched rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    pub rule_name: String,
    /// Actions that completed before the first failure (or all of them)
    pub actions_run: usize,
    pub error: Option<String>,
}

impl RuleOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub struct RuleEngine {
    store: Arc<dyn RemediationStore>,
    recommender: Arc<RecommendationEngine>,
}

impl RuleEngine {
    pub fn new(store: Arc<dyn RemediationStore>, recommender: Arc<RecommendationEngine>) -> Self {
        Self { store, recommender }
    }

    /// Evaluate an event and return the names of the rules it triggered
    pub async fn evaluate_event(&self, trigger: &TriggerType, context: &EventContext) -> Result<Vec<String>> {
        let outcomes = self.evaluate_event_detailed(trigger, context).await?;
        Ok(outcomes.into_iter().map(|o| o.rule_name).collect())
    }

    /// Like [`evaluate_event`](Self::evaluate_event), keeping per-rule action results
    pub async fn evaluate_event_detailed(
        &self,
        trigger: &TriggerType,
        context: &EventContext,
    ) -> Result<Vec<RuleOutcome>> {
        let rules = self.store.active_rules_for(trigger).await?;
        debug!("Evaluating {} active rule(s) for trigger '{}'", rules.len(), trigger);

        let mut outcomes = Vec::new();
        for rule in &rules {
            if !self.matches(rule, context) {
                continue;
            }
            info!("Rule '{}' matched trigger '{}'", rule.name, trigger);
            outcomes.push(self.run_actions(rule, context).await);
        }

        Ok(outcomes)
    }

    fn matches(&self, rule: &Rule, context: &EventContext) -> bool {
        if let RuleCondition::Malformed(raw) = &rule.condition {
            warn!("Rule '{}' has a malformed condition, skipping: {}", rule.name, raw);
            return false;
        }
        evaluate(&rule.condition, context)
    }

    async fn run_actions(&self, rule: &Rule, context: &EventContext) -> RuleOutcome {
        let mut outcome = RuleOutcome {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            actions_run: 0,
            error: None,
        };

        for action in &rule.actions {
            if let Err(e) = self.execute(action, context).await {
                warn!(
                    "Action {} of rule '{}' failed, skipping the rest: {}",
                    action.type_tag(),
                    rule.name,
                    e
                );
                outcome.error = Some(e.to_string());
                break;
            }
            outcome.actions_run += 1;
        }

        outcome
    }

    async fn execute(&self, action: &RuleAction, context: &EventContext) -> Result<()> {
        match action {
            RuleAction::CreateRemedialTask { .. } => {
                let student_id = context.require_i64(STUDENT_KEYS)?;
                let task_id = context.require_i64(TASK_KEYS)?;
                let grade = context.require_f64(GRADE_KEYS)?;
                self.recommender
                    .generate_recommendations(student_id, task_id, grade)
                    .await?;
                Ok(())
            }
            RuleAction::Unknown { action_type, .. } => {
                debug!("Ignoring unsupported action type '{}'", action_type);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::RemediationError;
    use crate::rules::{Condition, Operator};
    use crate::store::MockRemediationStore;
    use chrono::Utc;

    fn rule(id: RuleId, name: &str, condition: RuleCondition, actions: Vec<RuleAction>) -> Rule {
        Rule {
            id,
            name: name.to_string(),
            trigger: TriggerType::GradeRecorded,
            condition,
            actions,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn unknown(tag: &str) -> RuleAction {
        RuleAction::Unknown {
            action_type: tag.to_string(),
            params: serde_json::Map::new(),
        }
    }

    fn engine_with(store: MockRemediationStore) -> RuleEngine {
        let store: Arc<dyn RemediationStore> = Arc::new(store);
        let recommender = Arc::new(RecommendationEngine::new(store.clone(), EngineConfig::default()));
        RuleEngine::new(store, recommender)
    }

    fn low_grade() -> RuleCondition {
        RuleCondition::Compare(Condition::new("grade", Operator::Lt, 4.0))
    }

    #[tokio::test]
    async fn test_only_matching_rules_are_reported() {
        let mut store = MockRemediationStore::new();
        store.expect_active_rules_for().returning(|_| {
            Ok(vec![
                rule(1, "low-grade", low_grade(), vec![unknown("NOTIFY")]),
                rule(
                    2,
                    "failing",
                    RuleCondition::Compare(Condition::new("grade", Operator::Lt, 2.0)),
                    vec![],
                ),
            ])
        });

        let ctx = EventContext::new().with("grade", 3.5);
        let names = engine_with(store)
            .evaluate_event(&TriggerType::GradeRecorded, &ctx)
            .await
            .unwrap();
        assert_eq!(names, vec!["low-grade".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_rule_does_not_abort_siblings() {
        let mut store = MockRemediationStore::new();
        store.expect_active_rules_for().returning(|_| {
            Ok(vec![
                rule(1, "broken", RuleCondition::Malformed("{\"field\":".into()), vec![]),
                rule(2, "always", RuleCondition::Always, vec![]),
            ])
        });

        let names = engine_with(store)
            .evaluate_event(&TriggerType::GradeRecorded, &EventContext::new())
            .await
            .unwrap();
        assert_eq!(names, vec!["always".to_string()]);
    }

    #[tokio::test]
    async fn test_action_failure_is_isolated_per_rule() {
        let mut store = MockRemediationStore::new();
        store.expect_active_rules_for().returning(|_| {
            Ok(vec![
                rule(1, "needs-task", low_grade(), vec![RuleAction::create_remedial_task(), unknown("NOTIFY")]),
                rule(2, "second", low_grade(), vec![unknown("NOTIFY")]),
            ])
        });

        // No task_id in the context, so CREATE_REMEDIAL_TASK fails
        let ctx = EventContext::new().with("grade", 2.0).with("student_id", 4);
        let outcomes = engine_with(store)
            .evaluate_event_detailed(&TriggerType::GradeRecorded, &ctx)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].rule_name, "needs-task");
        assert_eq!(outcomes[0].actions_run, 0);
        assert!(!outcomes[0].succeeded());
        assert!(outcomes[1].succeeded());
        assert_eq!(outcomes[1].actions_run, 1);
    }

    #[tokio::test]
    async fn test_remedial_action_reads_aliased_fields() {
        let mut store = MockRemediationStore::new();
        store
            .expect_active_rules_for()
            .returning(|_| Ok(vec![rule(1, "alias", RuleCondition::Always, vec![RuleAction::create_remedial_task()])]));
        store
            .expect_concept_links()
            .with(mockall::predicate::eq(crate::types::LinkParent::Task(77)))
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let ctx = EventContext::new().with("nota", 2.5).with("student_id", 4).with("tarea_id", 77);
        let outcomes = engine_with(store)
            .evaluate_event_detailed(&TriggerType::GradeRecorded, &ctx)
            .await
            .unwrap();
        assert!(outcomes[0].succeeded());
    }

    #[tokio::test]
    async fn test_rule_load_failure_aborts() {
        let mut store = MockRemediationStore::new();
        store
            .expect_active_rules_for()
            .returning(|_| Err(RemediationError::PersistenceFailure("no such table: rules".into())));

        let err = engine_with(store)
            .evaluate_event(&TriggerType::GradeRecorded, &EventContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RemediationError::PersistenceFailure(_)));
    }
}
