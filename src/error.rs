// ORM error taxonomy
use thiserror::Error;

use crate::database::executor::DatabaseError;
use crate::database::record::RecordError;
use crate::filter::error::FilterError;

/// Errors surfaced by chain resolution, chain execution and preloading.
///
/// Configuration errors (cycles, unknown relations) are fatal and never retried.
/// `RecordNotFound` is a sentinel: test for it with [`is_record_not_found`]
/// and treat it as "absent" rather than "failed".
#[derive(Debug, Error)]
pub enum OrmError {
    // Configuration
    #[error("callback cycle detected in {chain} chain: {names:?}")]
    CallbackCycle { chain: String, names: Vec<String> },

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("can't preload field {relation} for {entity}")]
    UnknownRelation { entity: String, relation: String },

    #[error("unsupported relation: {0}")]
    UnsupportedRelation(String),

    #[error("invalid preload option: {0}")]
    InvalidPreloadOption(String),

    // Not found
    #[error("record not found")]
    RecordNotFound,

    // Validation guards
    #[error("missing WHERE clause while {operation}")]
    MissingWhereClause { operation: &'static str },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported destination, should be a single record or a collection")]
    UnsupportedDestination,

    // Lifecycle hooks
    #[error("{hook} hook failed: {message}")]
    Hook { hook: &'static str, message: String },

    // Execution
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

impl OrmError {
    pub fn hook(hook: &'static str, message: impl Into<String>) -> Self {
        OrmError::Hook { hook, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        OrmError::Validation(message.into())
    }

    /// True for the distinguished not-found sentinel.
    pub fn is_record_not_found(&self) -> bool {
        matches!(self, OrmError::RecordNotFound)
    }

    /// Configuration errors are detected at chain-build or preload-dispatch time.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OrmError::CallbackCycle { .. }
                | OrmError::UnknownEntity(_)
                | OrmError::UnknownRelation { .. }
                | OrmError::UnsupportedRelation(_)
                | OrmError::InvalidPreloadOption(_)
        )
    }
}

/// Predicate form of [`OrmError::is_record_not_found`].
pub fn is_record_not_found(err: &OrmError) -> bool {
    err.is_record_not_found()
}

pub type OrmResult<T> = Result<T, OrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_not_found_predicate() {
        assert!(is_record_not_found(&OrmError::RecordNotFound));
        assert!(!is_record_not_found(&OrmError::Cancelled));
        assert!(!is_record_not_found(&OrmError::validation("error test")));
        assert!(!is_record_not_found(&OrmError::Database(DatabaseError::Query(
            "no rows".to_string()
        ))));
    }

    #[test]
    fn configuration_classification() {
        let cycle = OrmError::CallbackCycle { chain: "create".into(), names: vec!["a".into()] };
        assert!(cycle.is_configuration());
        assert!(OrmError::UnsupportedRelation("x".into()).is_configuration());
        assert!(!OrmError::RecordNotFound.is_configuration());
    }
}
