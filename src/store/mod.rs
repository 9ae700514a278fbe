//! Data-access interface for the remediation subsystem
//!
//! The engines only talk to storage through [`RemediationStore`]. The SQLite
//! implementation enforces the (student, task, resource) uniqueness of the
//! recommendation ledger; every other invariant is checked by the callers.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::rules::{NewRule, Rule, RuleId, TriggerType};
use crate::types::{
    Concept, ConceptId, ConceptLink, ConceptUpdate, LinkParent, NewConcept, NewInteraction, NewResource,
    Recommendation, RecommendationId, RecommendationWithResource, Resource, ResourceFilter, ResourceId,
    ResourceInteraction, ResourceUpdate, StudentId, TaskId,
};

pub use sqlite::SqliteStore;

/// Active resource linked to at least one of the queried concepts
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateResource {
    pub resource: Resource,
    /// Queried concept ids this resource is linked to, ascending
    pub matched_concepts: Vec<ConceptId>,
}

/// Result of the constrained recommendation insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    /// The triple already existed; the existing row was returned
    DuplicateIgnored,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemediationStore: Send + Sync {
    // ── Concepts ──
    async fn create_concept(&self, concept: &NewConcept) -> Result<Concept>;
    async fn get_concept(&self, id: ConceptId) -> Result<Option<Concept>>;
    async fn list_concepts(&self, category: Option<String>) -> Result<Vec<Concept>>;
    /// `None` if the concept does not exist; a taken name is a `Conflict`
    async fn update_concept(&self, id: ConceptId, update: &ConceptUpdate) -> Result<Option<Concept>>;
    async fn delete_concept(&self, id: ConceptId) -> Result<bool>;

    // ── Resource catalog ──
    async fn create_resource(&self, resource: &NewResource) -> Result<Resource>;
    async fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>>;
    async fn update_resource(&self, id: ResourceId, update: &ResourceUpdate) -> Result<Option<Resource>>;
    async fn toggle_resource_active(&self, id: ResourceId) -> Result<Option<Resource>>;
    async fn delete_resource(&self, id: ResourceId) -> Result<bool>;
    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>>;
    async fn resources_by_categories(&self, categories: &[String], include_inactive: bool) -> Result<Vec<Resource>>;

    // ── Concept links ──
    /// Replace every link of `parent` with `links` in one transaction
    async fn replace_concept_links(&self, parent: LinkParent, links: &[ConceptLink]) -> Result<()>;
    async fn concept_links(&self, parent: LinkParent) -> Result<Vec<ConceptLink>>;
    /// Remove every link of `parent`; returns how many were removed
    async fn clear_concept_links(&self, parent: LinkParent) -> Result<usize>;
    async fn active_resources_for_concepts(&self, concept_ids: &[ConceptId]) -> Result<Vec<CandidateResource>>;

    // ── Recommendation ledger ──
    async fn recommended_resource_ids(&self, student_id: StudentId, task_id: TaskId) -> Result<Vec<ResourceId>>;
    /// Insert-or-ignore under the unique (student, task, resource) triple
    async fn insert_recommendation(
        &self,
        student_id: StudentId,
        task_id: TaskId,
        resource_id: ResourceId,
    ) -> Result<(Recommendation, InsertOutcome)>;
    async fn get_recommendation(&self, id: RecommendationId) -> Result<Option<Recommendation>>;
    async fn list_recommendations(&self, student_id: StudentId, unseen_only: bool) -> Result<Vec<Recommendation>>;
    /// Same ordering as `list_recommendations`, joined with the resource rows
    async fn list_recommendations_with_resources(
        &self,
        student_id: StudentId,
        unseen_only: bool,
    ) -> Result<Vec<RecommendationWithResource>>;
    async fn recommendations_for_task(&self, task_id: TaskId) -> Result<Vec<Recommendation>>;
    /// Set the viewed flag if not already set; returns the row as stored afterwards
    async fn mark_viewed(&self, id: RecommendationId, at: DateTime<Utc>) -> Result<Option<Recommendation>>;
    async fn delete_recommendation(&self, id: RecommendationId) -> Result<bool>;
    async fn delete_recommendations_for_task(&self, task_id: TaskId) -> Result<usize>;

    // ── Rules ──
    async fn create_rule(&self, rule: &NewRule) -> Result<Rule>;
    async fn get_rule(&self, id: RuleId) -> Result<Option<Rule>>;
    async fn list_rules(&self) -> Result<Vec<Rule>>;
    /// Active rules for a trigger in persisted order
    async fn active_rules_for(&self, trigger: &TriggerType) -> Result<Vec<Rule>>;
    async fn set_rule_active(&self, id: RuleId, active: bool) -> Result<bool>;
    async fn delete_rule(&self, id: RuleId) -> Result<bool>;

    // ── Interactions ──
    async fn record_interaction(&self, interaction: &NewInteraction) -> Result<ResourceInteraction>;
    async fn interactions_for_resource(&self, resource_id: ResourceId) -> Result<Vec<ResourceInteraction>>;
    async fn interactions_for_student(&self, student_id: StudentId) -> Result<Vec<ResourceInteraction>>;
}
