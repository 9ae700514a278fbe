//! Recommendation engine
//!
//! Turns a low-grade event into a short, ranked list of remedial resources
//! and records each pick once in the recommendation ledger.

pub mod ranking;

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{RemediationError, Result};
use crate::store::{InsertOutcome, RemediationStore};
use crate::types::{
    Actor, ActorId, LinkParent, Recommendation, RecommendationId, RecommendationWithResource, Resource, ResourceId,
    StudentId, TaskId,
};

pub use ranking::{rank, RankKey};

pub struct RecommendationEngine {
    store: Arc<dyn RemediationStore>,
    config: EngineConfig,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn RemediationStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Select and persist remedial resources for a graded task.
    ///
    /// Returns, in ranked order, the selected resources whose ledger row was
    /// created or already present. A resource whose insert fails is logged
    /// and left out. Read failures abort the call.
    pub async fn generate_recommendations(
        &self,
        student_id: StudentId,
        task_id: TaskId,
        grade: f64,
    ) -> Result<Vec<Resource>> {
        if !grade.is_finite() {
            return Err(RemediationError::invalid(format!("grade must be a finite number, got {}", grade)));
        }
        if grade >= self.config.grade_threshold {
            debug!(
                "Grade {} for student {} on task {} is at or above threshold {}",
                grade, student_id, task_id, self.config.grade_threshold
            );
            return Ok(Vec::new());
        }

        let concept_ids: Vec<_> = self
            .store
            .concept_links(LinkParent::Task(task_id))
            .await?
            .into_iter()
            .map(|link| link.concept_id)
            .collect();
        if concept_ids.is_empty() {
            warn!("Task {} has no linked concepts; cannot recommend resources", task_id);
            return Ok(Vec::new());
        }

        let candidates = self.store.active_resources_for_concepts(&concept_ids).await?;
        if candidates.is_empty() {
            warn!(
                "No active resources cover the {} concept(s) of task {}",
                concept_ids.len(),
                task_id
            );
            return Ok(Vec::new());
        }

        let already: HashSet<ResourceId> = self
            .store
            .recommended_resource_ids(student_id, task_id)
            .await?
            .into_iter()
            .collect();
        let fresh: Vec<_> = candidates
            .into_iter()
            .filter(|c| c.resource.active && !already.contains(&c.resource.id))
            .collect();

        let selected: Vec<Resource> = rank(fresh)
            .into_iter()
            .take(self.config.max_recommendations)
            .map(|c| c.resource)
            .collect();

        let attempted = selected.len();
        let mut created = 0usize;
        let mut recorded = Vec::with_capacity(attempted);
        for resource in selected {
            match self.store.insert_recommendation(student_id, task_id, resource.id).await {
                Ok((_, InsertOutcome::Created)) => {
                    created += 1;
                    recorded.push(resource);
                }
                Ok((existing, InsertOutcome::DuplicateIgnored)) => {
                    debug!("Recommendation {} already recorded, keeping it", existing.id);
                    recorded.push(resource);
                }
                Err(e) => {
                    warn!(
                        "Failed to record resource {} for student {} on task {}: {}",
                        resource.id, student_id, task_id, e
                    );
                }
            }
        }

        info!(
            "Recommended {} of {} resource(s) to student {} for task {} ({} new)",
            recorded.len(),
            attempted,
            student_id,
            task_id,
            created
        );
        Ok(recorded)
    }

    /// Mark a recommendation as viewed by its owner. Repeated calls keep the first timestamp.
    pub async fn mark_viewed(&self, recommendation_id: RecommendationId, actor_id: ActorId) -> Result<Recommendation> {
        let rec = self.owned_by(recommendation_id, actor_id).await?;
        if rec.viewed {
            return Ok(rec);
        }

        self.store
            .mark_viewed(recommendation_id, Utc::now())
            .await?
            .ok_or_else(|| RemediationError::not_found("recommendation", recommendation_id))
    }

    /// Newest first
    pub async fn list_recommendations(&self, student_id: StudentId, unseen_only: bool) -> Result<Vec<Recommendation>> {
        self.store.list_recommendations(student_id, unseen_only).await
    }

    /// Newest first, each with the resource it points at
    pub async fn list_recommendations_with_resources(
        &self,
        student_id: StudentId,
        unseen_only: bool,
    ) -> Result<Vec<RecommendationWithResource>> {
        self.store
            .list_recommendations_with_resources(student_id, unseen_only)
            .await
    }

    /// Delete a recommendation as its owner or as staff
    pub async fn delete_recommendation(&self, recommendation_id: RecommendationId, actor: Actor) -> Result<()> {
        let rec = self
            .store
            .get_recommendation(recommendation_id)
            .await?
            .ok_or_else(|| RemediationError::not_found("recommendation", recommendation_id))?;

        if rec.student_id != actor.id && !actor.role.is_staff() {
            return Err(RemediationError::Forbidden {
                actor_id: actor.id,
                recommendation_id,
            });
        }

        self.store.delete_recommendation(recommendation_id).await?;
        info!("Recommendation {} deleted by actor {}", recommendation_id, actor.id);
        Ok(())
    }

    pub async fn recommendations_for_task(&self, task_id: TaskId) -> Result<Vec<Recommendation>> {
        self.store.recommendations_for_task(task_id).await
    }

    /// Drop every recommendation attached to a task; returns how many were removed
    pub async fn delete_recommendations_for_task(&self, task_id: TaskId) -> Result<usize> {
        let removed = self.store.delete_recommendations_for_task(task_id).await?;
        info!("Removed {} recommendation(s) of task {}", removed, task_id);
        Ok(removed)
    }

    async fn owned_by(&self, recommendation_id: RecommendationId, actor_id: ActorId) -> Result<Recommendation> {
        let rec = self
            .store
            .get_recommendation(recommendation_id)
            .await?
            .ok_or_else(|| RemediationError::not_found("recommendation", recommendation_id))?;

        if rec.student_id != actor_id {
            return Err(RemediationError::Forbidden {
                actor_id,
                recommendation_id,
            });
        }
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CandidateResource, MockRemediationStore};
    use crate::types::{ConceptLink, DifficultyTier, ResourceKind, Role};
    use mockall::predicate::eq;

    fn resource(id: i64, tier: Option<DifficultyTier>, minutes: Option<u32>) -> Resource {
        Resource {
            id,
            title: format!("R{}", id),
            kind: ResourceKind::Document,
            url: None,
            file_ref: None,
            description: None,
            author: None,
            duration_minutes: minutes,
            tier,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn candidate(id: i64, concepts: &[i64]) -> CandidateResource {
        CandidateResource {
            resource: resource(id, Some(DifficultyTier::Basic), Some(id as u32)),
            matched_concepts: concepts.to_vec(),
        }
    }

    fn recommendation(id: i64, student_id: i64, viewed: bool) -> Recommendation {
        Recommendation {
            id,
            student_id,
            task_id: 1,
            resource_id: 1,
            created_at: Utc::now(),
            viewed,
            viewed_at: viewed.then(Utc::now),
        }
    }

    fn engine(store: MockRemediationStore) -> RecommendationEngine {
        RecommendationEngine::new(Arc::new(store), EngineConfig::default())
    }

    fn links(ids: &[i64]) -> Vec<ConceptLink> {
        ids.iter().map(|&concept_id| ConceptLink { concept_id, weight: 1.0 }).collect()
    }

    fn echo_insert(student: i64, task: i64, resource: i64) -> Result<(Recommendation, InsertOutcome)> {
        Ok((
            Recommendation {
                id: resource,
                student_id: student,
                task_id: task,
                resource_id: resource,
                created_at: Utc::now(),
                viewed: false,
                viewed_at: None,
            },
            InsertOutcome::Created,
        ))
    }

    #[tokio::test]
    async fn test_grade_at_threshold_touches_nothing() {
        // No expectations: any store call would panic
        let engine = engine(MockRemediationStore::new());
        assert!(engine.generate_recommendations(1, 1, 4.0).await.unwrap().is_empty());
        assert!(engine.generate_recommendations(1, 1, 6.5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_finite_grade_is_rejected() {
        let engine = engine(MockRemediationStore::new());
        let err = engine.generate_recommendations(1, 1, f64::NAN).await.unwrap_err();
        assert!(matches!(err, RemediationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_task_without_concepts_returns_empty() {
        let mut store = MockRemediationStore::new();
        store
            .expect_concept_links()
            .with(eq(LinkParent::Task(5)))
            .returning(|_| Ok(Vec::new()));
        store.expect_insert_recommendation().never();

        let result = engine(store).generate_recommendations(1, 5, 2.0).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_primary_read_failure_surfaces() {
        let mut store = MockRemediationStore::new();
        store
            .expect_concept_links()
            .returning(|_| Err(RemediationError::PersistenceFailure("disk I/O error".into())));

        let err = engine(store).generate_recommendations(1, 5, 2.0).await.unwrap_err();
        assert!(matches!(err, RemediationError::PersistenceFailure(_)));
    }

    #[tokio::test]
    async fn test_previously_recommended_resources_are_skipped() {
        let mut store = MockRemediationStore::new();
        store.expect_concept_links().returning(|_| Ok(links(&[1])));
        store
            .expect_active_resources_for_concepts()
            .returning(|_| Ok(vec![candidate(1, &[1]), candidate(2, &[1])]));
        store.expect_recommended_resource_ids().returning(|_, _| Ok(vec![1]));
        store
            .expect_insert_recommendation()
            .with(eq(3), eq(9), eq(2))
            .times(1)
            .returning(echo_insert);

        let result = engine(store).generate_recommendations(3, 9, 2.0).await.unwrap();
        assert_eq!(result.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn test_result_is_capped() {
        let mut store = MockRemediationStore::new();
        store.expect_concept_links().returning(|_| Ok(links(&[1])));
        store
            .expect_active_resources_for_concepts()
            .returning(|_| Ok((1..=6).map(|id| candidate(id, &[1])).collect()));
        store.expect_recommended_resource_ids().returning(|_, _| Ok(Vec::new()));
        store.expect_insert_recommendation().times(3).returning(echo_insert);

        let result = engine(store).generate_recommendations(3, 9, 1.0).await.unwrap();
        // Equal coverage and tier, so shorter duration wins
        assert_eq!(result.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_insert_failure_does_not_abort_batch() {
        let mut store = MockRemediationStore::new();
        store.expect_concept_links().returning(|_| Ok(links(&[1, 2])));
        store
            .expect_active_resources_for_concepts()
            .returning(|_| Ok(vec![candidate(1, &[1]), candidate(2, &[1, 2])]));
        store.expect_recommended_resource_ids().returning(|_, _| Ok(Vec::new()));
        store
            .expect_insert_recommendation()
            .times(2)
            .returning(|student, task, resource| {
                if resource == 2 {
                    Err(RemediationError::PersistenceFailure(
                        "FOREIGN KEY constraint failed".into(),
                    ))
                } else {
                    echo_insert(student, task, resource)
                }
            });

        // Resource 2 ranks first but its row was never written
        let result = engine(store).generate_recommendations(3, 9, 1.0).await.unwrap();
        assert_eq!(result.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_success() {
        let mut store = MockRemediationStore::new();
        store.expect_concept_links().returning(|_| Ok(links(&[1])));
        store
            .expect_active_resources_for_concepts()
            .returning(|_| Ok(vec![candidate(4, &[1])]));
        store.expect_recommended_resource_ids().returning(|_, _| Ok(Vec::new()));
        store.expect_insert_recommendation().returning(|s, t, r| {
            let (rec, _) = echo_insert(s, t, r)?;
            Ok((rec, InsertOutcome::DuplicateIgnored))
        });

        let result = engine(store).generate_recommendations(3, 9, 1.0).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_viewed_checks_existence_then_owner() {
        let mut store = MockRemediationStore::new();
        store.expect_get_recommendation().with(eq(404)).returning(|_| Ok(None));
        store
            .expect_get_recommendation()
            .with(eq(1))
            .returning(|_| Ok(Some(recommendation(1, 7, false))));
        store.expect_mark_viewed().never();
        let engine = engine(store);

        let missing = engine.mark_viewed(404, 7).await.unwrap_err();
        assert!(matches!(missing, RemediationError::NotFound { entity: "recommendation", id: 404 }));

        let forbidden = engine.mark_viewed(1, 8).await.unwrap_err();
        assert!(matches!(forbidden, RemediationError::Forbidden { actor_id: 8, recommendation_id: 1 }));
    }

    #[tokio::test]
    async fn test_mark_viewed_twice_does_not_rewrite() {
        let mut store = MockRemediationStore::new();
        store
            .expect_get_recommendation()
            .returning(|_| Ok(Some(recommendation(1, 7, true))));
        store.expect_mark_viewed().never();

        let rec = engine(store).mark_viewed(1, 7).await.unwrap();
        assert!(rec.viewed);
    }

    #[tokio::test]
    async fn test_staff_may_delete_others_recommendations() {
        let mut store = MockRemediationStore::new();
        store
            .expect_get_recommendation()
            .returning(|_| Ok(Some(recommendation(1, 7, false))));
        store.expect_delete_recommendation().times(1).returning(|_| Ok(true));
        let engine = engine(store);

        let err = engine.delete_recommendation(1, Actor::student(8)).await.unwrap_err();
        assert!(matches!(err, RemediationError::Forbidden { .. }));
        engine.delete_recommendation(1, Actor::staff(2, Role::Instructor)).await.unwrap();
    }
}
