//! Error taxonomy for the remediation engine

use thiserror::Error;

/// Errors surfaced by the engine, the catalog and the store
#[derive(Debug, Error)]
pub enum RemediationError {
    /// A referenced task, concept, resource, rule or recommendation does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The actor does not own the recommendation and has no staff role
    #[error("actor {actor_id} may not access recommendation {recommendation_id}")]
    Forbidden { actor_id: i64, recommendation_id: i64 },

    /// A stored rule condition could not be decoded.
    /// Evaluation degrades this to `false`; it is never returned by `evaluate_event`.
    #[error("invalid rule condition: {0}")]
    InvalidCondition(String),

    /// Caller supplied a value outside the accepted domain
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A uniquely named entity already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store-level fault during a read or write
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl RemediationError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error is a client-side mistake rather than a store fault
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Forbidden { .. } | Self::InvalidInput(_) | Self::Conflict(_)
        )
    }
}

impl From<rusqlite::Error> for RemediationError {
    fn from(err: rusqlite::Error) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for RemediationError {
    fn from(err: serde_json::Error) -> Self {
        Self::PersistenceFailure(format!("stored JSON is unreadable: {}", err))
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, RemediationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = RemediationError::not_found("recommendation", 42);
        assert_eq!(err.to_string(), "recommendation 42 not found");
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_sqlite_errors_become_persistence_failures() {
        let err: RemediationError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, RemediationError::PersistenceFailure(_)));
        assert!(!err.is_caller_error());
    }
}
