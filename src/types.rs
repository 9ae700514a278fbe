//! Shared types used across modules
//!
//! Catalog entities (concepts, resources, links), recommendation ledger rows,
//! interaction records and the actor model used for ownership checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RemediationError;

pub type StudentId = i64;
pub type TaskId = i64;
pub type ConceptId = i64;
pub type ResourceId = i64;
pub type RecommendationId = i64;
pub type ActorId = i64;

/// Difficulty tier of a resource or concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Basic,
    Intermediate,
    Advanced,
}

impl DifficultyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyTier::Basic => "basic",
            DifficultyTier::Intermediate => "intermediate",
            DifficultyTier::Advanced => "advanced",
        }
    }

    /// Ranking score: simpler material scores higher, unknown tiers score 0
    pub fn score(tier: Option<DifficultyTier>) -> u8 {
        match tier {
            Some(DifficultyTier::Basic) => 3,
            Some(DifficultyTier::Intermediate) => 2,
            Some(DifficultyTier::Advanced) => 1,
            None => 0,
        }
    }

    /// Lenient parse used when reading stored rows; unknown labels become `None`
    pub fn parse_lenient(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl FromStr for DifficultyTier {
    type Err = RemediationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" | "básico" | "basico" => Ok(DifficultyTier::Basic),
            "intermediate" | "intermedio" => Ok(DifficultyTier::Intermediate),
            "advanced" | "avanzado" => Ok(DifficultyTier::Advanced),
            other => Err(RemediationError::invalid(format!("unknown difficulty tier '{}'", other))),
        }
    }
}

impl std::fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Medium of a remedial resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ExternalVideo,
    Document,
    InteractiveExercise,
    Article,
    /// Video file kept in platform storage rather than behind a URL
    StoredVideo,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ExternalVideo => "external_video",
            ResourceKind::Document => "document",
            ResourceKind::InteractiveExercise => "interactive_exercise",
            ResourceKind::Article => "article",
            ResourceKind::StoredVideo => "stored_video",
        }
    }

    pub fn all() -> &'static [ResourceKind] {
        &[
            ResourceKind::ExternalVideo,
            ResourceKind::Document,
            ResourceKind::InteractiveExercise,
            ResourceKind::Article,
            ResourceKind::StoredVideo,
        ]
    }
}

impl FromStr for ResourceKind {
    type Err = RemediationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ResourceKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| RemediationError::invalid(format!("unknown resource kind '{}'", s)))
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pedagogical skill or topic unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub name: String,
    pub description: Option<String>,
    /// Free-text grouping, e.g. subject area
    pub category: Option<String>,
    pub tier: Option<DifficultyTier>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConcept {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tier: Option<DifficultyTier>,
}

/// Partial concept update.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub tier: Option<Option<DifficultyTier>>,
}

impl ConceptUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.category.is_none() && self.tier.is_none()
    }

    pub fn apply_to(&self, concept: &mut Concept) {
        if let Some(name) = &self.name {
            concept.name = name.clone();
        }
        if let Some(description) = &self.description {
            concept.description = description.clone();
        }
        if let Some(category) = &self.category {
            concept.category = category.clone();
        }
        if let Some(tier) = self.tier {
            concept.tier = tier;
        }
    }
}

/// A remedial material in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub title: String,
    pub kind: ResourceKind,
    pub url: Option<String>,
    pub file_ref: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub duration_minutes: Option<u32>,
    pub tier: Option<DifficultyTier>,
    /// Soft-delete flag; inactive resources are never recommended
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResource {
    pub title: String,
    pub kind: ResourceKind,
    pub url: Option<String>,
    pub file_ref: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub duration_minutes: Option<u32>,
    pub tier: Option<DifficultyTier>,
    pub active: bool,
}

impl NewResource {
    pub fn new(title: &str, kind: ResourceKind) -> Self {
        Self {
            title: title.to_string(),
            kind,
            url: None,
            file_ref: None,
            description: None,
            author: None,
            duration_minutes: None,
            tier: None,
            active: true,
        }
    }

    pub fn with_tier(mut self, tier: DifficultyTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Partial update; `None` leaves the stored value untouched and
/// `Some(None)` clears a nullable column
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUpdate {
    pub title: Option<String>,
    pub kind: Option<ResourceKind>,
    pub url: Option<Option<String>>,
    pub file_ref: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub author: Option<Option<String>>,
    pub duration_minutes: Option<Option<u32>>,
    pub tier: Option<Option<DifficultyTier>>,
    pub active: Option<bool>,
}

impl ResourceUpdate {
    /// Apply the set fields onto a stored resource
    pub fn apply_to(&self, resource: &mut Resource) {
        if let Some(title) = &self.title {
            resource.title = title.clone();
        }
        if let Some(kind) = self.kind {
            resource.kind = kind;
        }
        if let Some(url) = &self.url {
            resource.url = url.clone();
        }
        if let Some(file_ref) = &self.file_ref {
            resource.file_ref = file_ref.clone();
        }
        if let Some(description) = &self.description {
            resource.description = description.clone();
        }
        if let Some(author) = &self.author {
            resource.author = author.clone();
        }
        if let Some(minutes) = self.duration_minutes {
            resource.duration_minutes = minutes;
        }
        if let Some(tier) = self.tier {
            resource.tier = tier;
        }
        if let Some(active) = self.active {
            resource.active = active;
        }
    }
}

/// Filter for catalog listings
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub kind: Option<ResourceKind>,
    pub tier: Option<DifficultyTier>,
    pub include_inactive: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Which side of the concept graph a link hangs off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkParent {
    Task(TaskId),
    Resource(ResourceId),
}

impl LinkParent {
    pub fn id(&self) -> i64 {
        match self {
            LinkParent::Task(id) | LinkParent::Resource(id) => *id,
        }
    }
}

impl std::fmt::Display for LinkParent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkParent::Task(id) => write!(f, "task {}", id),
            LinkParent::Resource(id) => write!(f, "resource {}", id),
        }
    }
}

/// Weighted association between a task or resource and a concept
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConceptLink {
    pub concept_id: ConceptId,
    /// Relevance in [0, 1]
    pub weight: f64,
}

/// Default relevance for links created without an explicit weight
pub const DEFAULT_LINK_WEIGHT: f64 = 1.0;

/// A persisted suggestion linking a student, a task and a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RecommendationId,
    pub student_id: StudentId,
    pub task_id: TaskId,
    pub resource_id: ResourceId,
    pub created_at: DateTime<Utc>,
    pub viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
}

/// A recommendation together with the resource it points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationWithResource {
    pub recommendation: Recommendation,
    pub resource: Resource,
}

/// Platform role of whoever is acting on a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    Administrator,
}

impl Role {
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Instructor | Role::Administrator)
    }
}

impl FromStr for Role {
    type Err = RemediationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "instructor" | "teacher" => Ok(Role::Instructor),
            "administrator" | "admin" => Ok(Role::Administrator),
            other => Err(RemediationError::invalid(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn student(id: ActorId) -> Self {
        Self { id, role: Role::Student }
    }

    pub fn staff(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }
}

/// Kind of student interaction with a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Viewed,
    Completed,
    Rated,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Viewed => "viewed",
            InteractionKind::Completed => "completed",
            InteractionKind::Rated => "rated",
        }
    }
}

impl FromStr for InteractionKind {
    type Err = RemediationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "viewed" => Ok(InteractionKind::Viewed),
            "completed" => Ok(InteractionKind::Completed),
            "rated" => Ok(InteractionKind::Rated),
            other => Err(RemediationError::invalid(format!("unknown interaction kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInteraction {
    pub id: i64,
    pub student_id: StudentId,
    pub resource_id: ResourceId,
    pub kind: InteractionKind,
    /// 1-5 stars, only for `Rated`
    pub rating: Option<u8>,
    pub seconds_watched: Option<u32>,
    /// Whether the student's grade improved after using the resource
    pub improved_grade: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInteraction {
    pub student_id: StudentId,
    pub resource_id: ResourceId,
    pub kind: InteractionKind,
    pub rating: Option<u8>,
    pub seconds_watched: Option<u32>,
    pub improved_grade: bool,
}

/// Aggregated interaction counters for one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub total_interactions: usize,
    pub views: usize,
    pub completions: usize,
    pub ratings: usize,
    pub average_rating: Option<f64>,
    pub improvements: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_scores() {
        assert_eq!(DifficultyTier::score(Some(DifficultyTier::Basic)), 3);
        assert_eq!(DifficultyTier::score(Some(DifficultyTier::Intermediate)), 2);
        assert_eq!(DifficultyTier::score(Some(DifficultyTier::Advanced)), 1);
        assert_eq!(DifficultyTier::score(None), 0);
    }

    #[test]
    fn test_tier_parse_accepts_spanish_labels() {
        assert_eq!("básico".parse::<DifficultyTier>().unwrap(), DifficultyTier::Basic);
        assert_eq!("Intermedio".parse::<DifficultyTier>().unwrap(), DifficultyTier::Intermediate);
        assert!(DifficultyTier::parse_lenient("expert").is_none());
    }

    #[test]
    fn test_resource_kind_parse() {
        assert_eq!("external-video".parse::<ResourceKind>().unwrap(), ResourceKind::ExternalVideo);
        assert_eq!("interactive_exercise".parse::<ResourceKind>().unwrap(), ResourceKind::InteractiveExercise);
        assert!("podcast".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_resource_update_sets_clears_and_keeps() {
        let mut resource = Resource {
            id: 1,
            title: "Fractions".into(),
            kind: ResourceKind::ExternalVideo,
            url: Some("https://video.example/f".into()),
            file_ref: None,
            description: Some("Intro".into()),
            author: Some("Ms. Rivera".into()),
            duration_minutes: Some(12),
            tier: Some(DifficultyTier::Basic),
            active: true,
            created_at: Utc::now(),
        };
        let update = ResourceUpdate {
            title: Some("Fractions, part 1".into()),
            author: Some(None),
            duration_minutes: Some(None),
            tier: Some(Some(DifficultyTier::Intermediate)),
            ..Default::default()
        };
        update.apply_to(&mut resource);

        assert_eq!(resource.title, "Fractions, part 1");
        assert_eq!(resource.author, None);
        assert_eq!(resource.duration_minutes, None);
        assert_eq!(resource.tier, Some(DifficultyTier::Intermediate));
        assert_eq!(resource.url.as_deref(), Some("https://video.example/f"));
        assert_eq!(resource.description.as_deref(), Some("Intro"));
    }

    #[test]
    fn test_role_staff() {
        assert!(!Role::Student.is_staff());
        assert!(Role::Instructor.is_staff());
        assert!("admin".parse::<Role>().unwrap().is_staff());
    }
}
