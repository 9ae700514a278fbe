//! Remediation Engine Library
//!
//! Reacts to poor academic performance with remedial material:
//! - Declarative trigger/condition/action rules evaluated per event
//! - Concept-overlap candidate selection with deterministic ranking
//! - An idempotent recommendation ledger backed by SQLite
//! - A resource catalog with interaction statistics
//!
//! # Example
//!
//! ```ignore
//! use remediation_engine::{EngineConfig, RemediationService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = RemediationService::in_memory(EngineConfig::default())?;
//!     let picks = service.generate_recommendations(7, 42, 3.1).await?;
//!     println!("{} resource(s) recommended", picks.len());
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod error;
pub mod types;
pub mod config;
pub mod store;
pub mod rules;
pub mod recommend;
pub mod catalog;
pub mod service;
pub mod cli;

pub use error::{RemediationError, Result};

pub use config::{Config, EngineConfig, StorageConfig};

pub use store::{CandidateResource, InsertOutcome, RemediationStore, SqliteStore};

pub use rules::{
    evaluate,
    Condition,
    ContextValue,
    EventContext,
    NewRule,
    Operator,
    Rule,
    RuleAction,
    RuleCondition,
    RuleEngine,
    RuleOutcome,
    TriggerType,
};

pub use recommend::{RankKey, RecommendationEngine};

pub use catalog::Catalog;

pub use service::RemediationService;

pub use types::{
    Actor,
    Concept,
    ConceptLink,
    ConceptUpdate,
    DifficultyTier,
    InteractionKind,
    LinkParent,
    NewConcept,
    NewInteraction,
    NewResource,
    Recommendation,
    RecommendationWithResource,
    Resource,
    ResourceKind,
    ResourceStats,
    ResourceUpdate,
    Role,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Remediation Engine Library", NAME, VERSION)
}
