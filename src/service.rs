//! Remediation service
//!
//! Single entry point bundling the store, the catalog and both engines.
//! Transports (the CLI today) call into this and nothing else.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::recommend::RecommendationEngine;
use crate::rules::{EventContext, RuleEngine, RuleOutcome, TriggerType};
use crate::store::{RemediationStore, SqliteStore};
use crate::types::{
    Actor, ActorId, ConceptId, ConceptLink, LinkParent, Recommendation, RecommendationId, RecommendationWithResource,
    Resource, ResourceId, StudentId, TaskId,
};

pub struct RemediationService {
    catalog: Catalog,
    recommender: Arc<RecommendationEngine>,
    rules: RuleEngine,
}

impl RemediationService {
    pub fn new(store: Arc<dyn RemediationStore>, config: EngineConfig) -> Self {
        let recommender = Arc::new(RecommendationEngine::new(store.clone(), config));
        Self {
            catalog: Catalog::new(store.clone()),
            rules: RuleEngine::new(store, recommender.clone()),
            recommender,
        }
    }

    /// Service over an ephemeral in-memory database
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(SqliteStore::open_in_memory()?), config))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn engine_config(&self) -> &EngineConfig {
        self.recommender.config()
    }

    /// Dispatch an event to the rules of its trigger; returns the triggered rule names
    pub async fn evaluate_event(&self, trigger_type: &str, context: &EventContext) -> Result<Vec<String>> {
        self.rules.evaluate_event(&TriggerType::from(trigger_type), context).await
    }

    pub async fn evaluate_event_detailed(&self, trigger_type: &str, context: &EventContext) -> Result<Vec<RuleOutcome>> {
        self.rules
            .evaluate_event_detailed(&TriggerType::from(trigger_type), context)
            .await
    }

    /// Event payload given as a JSON object
    pub async fn evaluate_event_json(&self, trigger_type: &str, payload: serde_json::Value) -> Result<Vec<String>> {
        let context = EventContext::from_json(payload)?;
        self.evaluate_event(trigger_type, &context).await
    }

    pub async fn generate_recommendations(
        &self,
        student_id: StudentId,
        task_id: TaskId,
        grade: f64,
    ) -> Result<Vec<Resource>> {
        self.recommender.generate_recommendations(student_id, task_id, grade).await
    }

    pub async fn mark_recommendation_viewed(
        &self,
        recommendation_id: RecommendationId,
        actor_id: ActorId,
    ) -> Result<Recommendation> {
        self.recommender.mark_viewed(recommendation_id, actor_id).await
    }

    pub async fn list_recommendations(&self, student_id: StudentId, unseen_only: bool) -> Result<Vec<Recommendation>> {
        self.recommender.list_recommendations(student_id, unseen_only).await
    }

    pub async fn list_recommendations_with_resources(
        &self,
        student_id: StudentId,
        unseen_only: bool,
    ) -> Result<Vec<RecommendationWithResource>> {
        self.recommender
            .list_recommendations_with_resources(student_id, unseen_only)
            .await
    }

    pub async fn delete_recommendation(&self, recommendation_id: RecommendationId, actor: Actor) -> Result<()> {
        self.recommender.delete_recommendation(recommendation_id, actor).await
    }

    pub async fn recommendations_for_task(&self, task_id: TaskId) -> Result<Vec<Recommendation>> {
        self.recommender.recommendations_for_task(task_id).await
    }

    pub async fn delete_recommendations_for_task(&self, task_id: TaskId) -> Result<usize> {
        self.recommender.delete_recommendations_for_task(task_id).await
    }

    /// Replace the concept set of a task
    pub async fn associate_task_concepts(&self, task_id: TaskId, pairs: &[(ConceptId, f64)]) -> Result<Vec<ConceptLink>> {
        self.catalog.associate_concepts(LinkParent::Task(task_id), pairs).await
    }

    /// Replace the concept set of a resource
    pub async fn associate_resource_concepts(
        &self,
        resource_id: ResourceId,
        pairs: &[(ConceptId, f64)],
    ) -> Result<Vec<ConceptLink>> {
        self.catalog
            .associate_concepts(LinkParent::Resource(resource_id), pairs)
            .await
    }

    /// Remove every concept link of a task
    pub async fn clear_task_concepts(&self, task_id: TaskId) -> Result<usize> {
        self.catalog.clear_concept_links(LinkParent::Task(task_id)).await
    }

    /// Remove every concept link of a resource
    pub async fn clear_resource_concepts(&self, resource_id: ResourceId) -> Result<usize> {
        self.catalog.clear_concept_links(LinkParent::Resource(resource_id)).await
    }
}
