//! Content catalog: concepts, resources, concept links, rules and interactions
//!
//! Input validation lives here; persistence is delegated to the store.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{RemediationError, Result};
use crate::rules::{NewRule, Operator, Rule, RuleCondition, RuleId};
use crate::store::RemediationStore;
use crate::types::{
    Concept, ConceptId, ConceptLink, ConceptUpdate, InteractionKind, LinkParent, NewConcept, NewInteraction, NewResource, Resource,
    ResourceFilter, ResourceId, ResourceInteraction, ResourceKind, ResourceStats, ResourceUpdate, StudentId,
};

pub struct Catalog {
    store: Arc<dyn RemediationStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn RemediationStore>) -> Self {
        Self { store }
    }

    // ── Concepts ──

    pub async fn create_concept(&self, concept: NewConcept) -> Result<Concept> {
        let name = concept.name.trim().to_string();
        if name.is_empty() {
            return Err(RemediationError::invalid("concept name must not be empty"));
        }
        let concept = NewConcept { name, ..concept };
        let created = self.store.create_concept(&concept).await?;
        info!("Created concept {} '{}'", created.id, created.name);
        Ok(created)
    }

    pub async fn get_concept(&self, id: ConceptId) -> Result<Concept> {
        self.store
            .get_concept(id)
            .await?
            .ok_or_else(|| RemediationError::not_found("concept", id))
    }

    pub async fn list_concepts(&self, category: Option<String>) -> Result<Vec<Concept>> {
        self.store.list_concepts(category).await
    }

    /// Partial update; renaming onto an existing name is a `Conflict`
    pub async fn update_concept(&self, id: ConceptId, mut update: ConceptUpdate) -> Result<Concept> {
        if let Some(name) = update.name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(RemediationError::invalid("concept name must not be empty"));
            }
        }

        let updated = self
            .store
            .update_concept(id, &update)
            .await?
            .ok_or_else(|| RemediationError::not_found("concept", id))?;
        info!("Updated concept {} '{}'", updated.id, updated.name);
        Ok(updated)
    }

    pub async fn delete_concept(&self, id: ConceptId) -> Result<()> {
        if !self.store.delete_concept(id).await? {
            return Err(RemediationError::not_found("concept", id));
        }
        Ok(())
    }

    // ── Resources ──

    pub async fn create_resource(&self, resource: NewResource) -> Result<Resource> {
        validate_resource(&resource.title, resource.kind, resource.url.as_deref(), resource.file_ref.as_deref())?;
        let created = self.store.create_resource(&resource).await?;
        info!("Created {} resource {} '{}'", created.kind, created.id, created.title);
        Ok(created)
    }

    pub async fn get_resource(&self, id: ResourceId) -> Result<Resource> {
        self.store
            .get_resource(id)
            .await?
            .ok_or_else(|| RemediationError::not_found("resource", id))
    }

    pub async fn update_resource(&self, id: ResourceId, update: ResourceUpdate) -> Result<Resource> {
        // Validate the merged result so clearing a required media field is caught
        let mut merged = self.get_resource(id).await?;
        update.apply_to(&mut merged);
        validate_resource(&merged.title, merged.kind, merged.url.as_deref(), merged.file_ref.as_deref())?;

        self.store
            .update_resource(id, &update)
            .await?
            .ok_or_else(|| RemediationError::not_found("resource", id))
    }

    /// Flip the soft-delete flag
    pub async fn toggle_resource_active(&self, id: ResourceId) -> Result<Resource> {
        let resource = self
            .store
            .toggle_resource_active(id)
            .await?
            .ok_or_else(|| RemediationError::not_found("resource", id))?;
        info!(
            "Resource {} is now {}",
            id,
            if resource.active { "active" } else { "inactive" }
        );
        Ok(resource)
    }

    /// Hard delete; links, recommendations and interactions go with it
    pub async fn delete_resource(&self, id: ResourceId) -> Result<()> {
        if !self.store.delete_resource(id).await? {
            return Err(RemediationError::not_found("resource", id));
        }
        info!("Deleted resource {}", id);
        Ok(())
    }

    pub async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        self.store.list_resources(filter).await
    }

    pub async fn resources_by_categories(&self, categories: &[String], include_inactive: bool) -> Result<Vec<Resource>> {
        let categories: Vec<String> = categories
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self.store.resources_by_categories(&categories, include_inactive).await
    }

    // ── Concept links ──

    /// Replace the concept set of a task or resource
    pub async fn associate_concepts(&self, parent: LinkParent, pairs: &[(ConceptId, f64)]) -> Result<Vec<ConceptLink>> {
        if pairs.is_empty() {
            return Err(RemediationError::invalid(format!("{} needs at least one concept", parent)));
        }

        // Duplicate ids collapse, last weight wins
        let mut collapsed = BTreeMap::new();
        for &(concept_id, weight) in pairs {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(RemediationError::invalid(format!(
                    "weight {} for concept {} is outside [0, 1]",
                    weight, concept_id
                )));
            }
            collapsed.insert(concept_id, weight);
        }
        let links: Vec<ConceptLink> = collapsed
            .into_iter()
            .map(|(concept_id, weight)| ConceptLink { concept_id, weight })
            .collect();

        self.store.replace_concept_links(parent, &links).await?;
        info!("Associated {} concept(s) with {}", links.len(), parent);
        Ok(links)
    }

    pub async fn concept_links(&self, parent: LinkParent) -> Result<Vec<ConceptLink>> {
        self.store.concept_links(parent).await
    }

    /// Drop every concept link of a task or resource; returns how many went
    pub async fn clear_concept_links(&self, parent: LinkParent) -> Result<usize> {
        if let LinkParent::Resource(id) = parent {
            self.get_resource(id).await?;
        }
        let removed = self.store.clear_concept_links(parent).await?;
        info!("Cleared {} concept link(s) of {}", removed, parent);
        Ok(removed)
    }

    // ── Rules ──

    pub async fn create_rule(&self, rule: NewRule) -> Result<Rule> {
        if rule.name.trim().is_empty() {
            return Err(RemediationError::invalid("rule name must not be empty"));
        }
        if let RuleCondition::Compare(cond) = &rule.condition {
            if cond.field.trim().is_empty() {
                return Err(RemediationError::invalid("condition field must not be empty"));
            }
            if cond.operator == Operator::Unknown {
                return Err(RemediationError::invalid("condition operator must be one of <, >, ==, >=, <="));
            }
        }

        let created = self.store.create_rule(&rule).await?;
        info!(
            "Created rule {} '{}' on trigger '{}' when {}",
            created.id, created.name, created.trigger, created.condition
        );
        Ok(created)
    }

    pub async fn get_rule(&self, id: RuleId) -> Result<Rule> {
        self.store
            .get_rule(id)
            .await?
            .ok_or_else(|| RemediationError::not_found("rule", id))
    }

    pub async fn list_rules(&self) -> Result<Vec<Rule>> {
        self.store.list_rules().await
    }

    pub async fn set_rule_active(&self, id: RuleId, active: bool) -> Result<()> {
        if !self.store.set_rule_active(id, active).await? {
            return Err(RemediationError::not_found("rule", id));
        }
        Ok(())
    }

    pub async fn delete_rule(&self, id: RuleId) -> Result<()> {
        if !self.store.delete_rule(id).await? {
            return Err(RemediationError::not_found("rule", id));
        }
        Ok(())
    }

    // ── Interactions ──

    pub async fn record_interaction(&self, interaction: NewInteraction) -> Result<ResourceInteraction> {
        match (interaction.kind, interaction.rating) {
            (InteractionKind::Rated, None) => {
                return Err(RemediationError::invalid("a rated interaction needs a rating"));
            }
            (_, Some(rating)) if !(1..=5).contains(&rating) => {
                return Err(RemediationError::invalid(format!("rating {} is outside 1..=5", rating)));
            }
            _ => {}
        }
        self.store.record_interaction(&interaction).await
    }

    pub async fn interactions_for_student(&self, student_id: StudentId) -> Result<Vec<ResourceInteraction>> {
        self.store.interactions_for_student(student_id).await
    }

    /// Aggregate the interaction log of one resource
    pub async fn resource_stats(&self, resource_id: ResourceId) -> Result<ResourceStats> {
        self.get_resource(resource_id).await?;
        let interactions = self.store.interactions_for_resource(resource_id).await?;
        Ok(aggregate_stats(&interactions))
    }
}

fn validate_resource(title: &str, kind: ResourceKind, url: Option<&str>, file_ref: Option<&str>) -> Result<()> {
    if title.trim().is_empty() {
        return Err(RemediationError::invalid("resource title must not be empty"));
    }
    let blank = |v: Option<&str>| v.map_or(true, |s| s.trim().is_empty());
    match kind {
        ResourceKind::ExternalVideo if blank(url) => {
            Err(RemediationError::invalid("an external video needs a URL"))
        }
        ResourceKind::StoredVideo if blank(file_ref) => {
            Err(RemediationError::invalid("a stored video needs a file reference"))
        }
        _ => Ok(()),
    }
}

fn aggregate_stats(interactions: &[ResourceInteraction]) -> ResourceStats {
    let count = |kind: InteractionKind| interactions.iter().filter(|i| i.kind == kind).count();
    let ratings: Vec<f64> = interactions
        .iter()
        .filter(|i| i.kind == InteractionKind::Rated)
        .filter_map(|i| i.rating.map(f64::from))
        .collect();

    let average_rating = if ratings.is_empty() {
        None
    } else {
        let avg = ratings.iter().sum::<f64>() / ratings.len() as f64;
        Some((avg * 100.0).round() / 100.0)
    };

    ResourceStats {
        total_interactions: interactions.len(),
        views: count(InteractionKind::Viewed),
        completions: count(InteractionKind::Completed),
        ratings: count(InteractionKind::Rated),
        average_rating,
        improvements: interactions.iter().filter(|i| i.improved_grade).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::DifficultyTier;

    fn catalog() -> Catalog {
        Catalog::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    async fn concept(catalog: &Catalog, name: &str) -> ConceptId {
        catalog
            .create_concept(NewConcept {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_associate_rejects_bad_weights_and_empty_sets() {
        let catalog = catalog();
        let c1 = concept(&catalog, "fractions").await;

        for weight in [1.5, -0.1, f64::NAN] {
            let err = catalog
                .associate_concepts(LinkParent::Task(1), &[(c1, weight)])
                .await
                .unwrap_err();
            assert!(matches!(err, RemediationError::InvalidInput(_)));
        }
        let err = catalog.associate_concepts(LinkParent::Task(1), &[]).await.unwrap_err();
        assert!(matches!(err, RemediationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_associate_collapses_duplicates() {
        let catalog = catalog();
        let c1 = concept(&catalog, "fractions").await;
        let c2 = concept(&catalog, "decimals").await;

        let links = catalog
            .associate_concepts(LinkParent::Task(1), &[(c2, 0.2), (c1, 1.0), (c2, 0.9)])
            .await
            .unwrap();
        assert_eq!(
            links,
            vec![ConceptLink { concept_id: c1, weight: 1.0 }, ConceptLink { concept_id: c2, weight: 0.9 }]
        );
        assert_eq!(catalog.concept_links(LinkParent::Task(1)).await.unwrap(), links);
    }

    #[tokio::test]
    async fn test_associate_with_unknown_resource_is_not_found() {
        let catalog = catalog();
        let c1 = concept(&catalog, "fractions").await;
        let err = catalog
            .associate_concepts(LinkParent::Resource(42), &[(c1, 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, RemediationError::NotFound { entity: "resource", id: 42 }));
    }

    #[tokio::test]
    async fn test_resource_validation() {
        let catalog = catalog();
        let err = catalog
            .create_resource(NewResource::new("Clip", ResourceKind::ExternalVideo))
            .await
            .unwrap_err();
        assert!(matches!(err, RemediationError::InvalidInput(_)));

        let mut video = NewResource::new("Clip", ResourceKind::ExternalVideo);
        video.url = Some("https://video.example/clip".into());
        let created = catalog.create_resource(video).await.unwrap();

        let err = catalog
            .update_resource(
                created.id,
                ResourceUpdate {
                    title: Some("   ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RemediationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_can_clear_fields_but_not_required_media() {
        let catalog = catalog();
        let mut video = NewResource::new("Clip", ResourceKind::ExternalVideo).with_tier(DifficultyTier::Advanced);
        video.url = Some("https://video.example/clip".into());
        video.author = Some("Mr. Okafor".into());
        let created = catalog.create_resource(video).await.unwrap();

        let cleared = catalog
            .update_resource(
                created.id,
                ResourceUpdate {
                    tier: Some(None),
                    author: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.tier, None);
        assert_eq!(cleared.author, None);

        // An external video cannot lose its URL
        let err = catalog
            .update_resource(
                created.id,
                ResourceUpdate {
                    url: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RemediationError::InvalidInput(_)));

        // Unless it stops being one
        let doc = catalog
            .update_resource(
                created.id,
                ResourceUpdate {
                    kind: Some(ResourceKind::Document),
                    url: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(doc.url, None);
    }

    #[tokio::test]
    async fn test_update_concept() {
        let catalog = catalog();
        let c1 = concept(&catalog, "fractions").await;
        concept(&catalog, "decimals").await;

        let renamed = catalog
            .update_concept(
                c1,
                ConceptUpdate {
                    name: Some("  proper fractions ".into()),
                    description: Some(Some("Numerator below denominator".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "proper fractions");
        assert_eq!(renamed.description.as_deref(), Some("Numerator below denominator"));

        let taken = ConceptUpdate {
            name: Some("decimals".into()),
            ..Default::default()
        };
        let err = catalog.update_concept(c1, taken.clone()).await.unwrap_err();
        assert!(matches!(err, RemediationError::Conflict(_)));

        let err = catalog.update_concept(404, taken).await.unwrap_err();
        assert!(matches!(err, RemediationError::NotFound { entity: "concept", id: 404 }));

        let blank = ConceptUpdate {
            name: Some(" ".into()),
            ..Default::default()
        };
        assert!(matches!(
            catalog.update_concept(c1, blank).await.unwrap_err(),
            RemediationError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_clear_concept_links() {
        let catalog = catalog();
        let c1 = concept(&catalog, "fractions").await;
        let c2 = concept(&catalog, "decimals").await;
        catalog
            .associate_concepts(LinkParent::Task(7), &[(c1, 1.0), (c2, 0.4)])
            .await
            .unwrap();

        assert_eq!(catalog.clear_concept_links(LinkParent::Task(7)).await.unwrap(), 2);
        assert!(catalog.concept_links(LinkParent::Task(7)).await.unwrap().is_empty());

        let err = catalog.clear_concept_links(LinkParent::Resource(55)).await.unwrap_err();
        assert!(matches!(err, RemediationError::NotFound { entity: "resource", id: 55 }));
    }

    #[tokio::test]
    async fn test_toggle_and_missing_resource() {
        let catalog = catalog();
        let r = catalog
            .create_resource(NewResource::new("Notes", ResourceKind::Document))
            .await
            .unwrap();
        assert!(!catalog.toggle_resource_active(r.id).await.unwrap().active);
        assert!(catalog.toggle_resource_active(r.id).await.unwrap().active);

        let err = catalog.toggle_resource_active(999).await.unwrap_err();
        assert!(matches!(err, RemediationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rule_with_unknown_operator_is_rejected() {
        let catalog = catalog();
        let mut rule = NewRule::new("odd", crate::rules::TriggerType::GradeRecorded);
        rule.condition = RuleCondition::decode(Some(r#"{"field":"grade","operator":"!=","value":4.0}"#));
        let err = catalog.create_rule(rule).await.unwrap_err();
        assert!(matches!(err, RemediationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_rating_validation() {
        let catalog = catalog();
        let r = catalog
            .create_resource(NewResource::new("Quiz", ResourceKind::InteractiveExercise))
            .await
            .unwrap();
        let rated = |rating| NewInteraction {
            student_id: 1,
            resource_id: r.id,
            kind: InteractionKind::Rated,
            rating,
            seconds_watched: None,
            improved_grade: false,
        };

        assert!(catalog.record_interaction(rated(None)).await.is_err());
        assert!(catalog.record_interaction(rated(Some(6))).await.is_err());
        assert!(catalog.record_interaction(rated(Some(0))).await.is_err());
        assert_eq!(catalog.record_interaction(rated(Some(5))).await.unwrap().rating, Some(5));
    }

    #[tokio::test]
    async fn test_resource_stats() {
        let catalog = catalog();
        let r = catalog
            .create_resource(NewResource::new("Quiz", ResourceKind::InteractiveExercise))
            .await
            .unwrap();

        let empty = catalog.resource_stats(r.id).await.unwrap();
        assert_eq!(empty, ResourceStats::default());

        let entries = [
            (InteractionKind::Viewed, None, false),
            (InteractionKind::Completed, None, true),
            (InteractionKind::Rated, Some(4), false),
            (InteractionKind::Rated, Some(5), true),
            (InteractionKind::Rated, Some(5), false),
        ];
        for (kind, rating, improved_grade) in entries {
            catalog
                .record_interaction(NewInteraction {
                    student_id: 3,
                    resource_id: r.id,
                    kind,
                    rating,
                    seconds_watched: Some(60),
                    improved_grade,
                })
                .await
                .unwrap();
        }

        let stats = catalog.resource_stats(r.id).await.unwrap();
        assert_eq!(stats.total_interactions, 5);
        assert_eq!(stats.views, 1);
        assert_eq!(stats.completions, 1);
        assert_eq!(stats.ratings, 3);
        assert_eq!(stats.average_rating, Some(4.67));
        assert_eq!(stats.improvements, 2);

        assert!(catalog.resource_stats(999).await.is_err());
    }
}
