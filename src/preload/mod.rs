// Batched association loading
pub mod key;
pub mod resolver;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::db::Query;
use crate::error::OrmError;
use crate::filter::Condition;

pub use key::canonical_key;
pub use resolver::PreloadResolver;

pub type ScopeFn = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// Extra narrowing for the last segment of a preload path.
#[derive(Clone)]
pub enum PreloadCondition {
    Where(Condition),
    /// Arbitrary adjustment of the related query (order, limit, more conditions)
    Scope(ScopeFn),
}

impl PreloadCondition {
    pub fn json(conditions: Value) -> Self {
        PreloadCondition::Where(Condition::Json(conditions))
    }

    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        PreloadCondition::Where(Condition::raw(sql, params))
    }

    pub fn scope<F>(scope: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        PreloadCondition::Scope(Arc::new(scope))
    }

    pub(crate) fn apply(&self, query: Query) -> Query {
        match self {
            PreloadCondition::Where(condition) => query.condition(condition.clone()),
            PreloadCondition::Scope(scope) => scope(query),
        }
    }
}

impl fmt::Debug for PreloadCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreloadCondition::Where(condition) => f.debug_tuple("Where").field(condition).finish(),
            PreloadCondition::Scope(_) => f.write_str("Scope(..)"),
        }
    }
}

/// A dotted relation path such as `"Posts.Comments"`.
#[derive(Debug, Clone)]
pub struct PreloadSpec {
    pub path: String,
    pub conditions: Vec<PreloadCondition>,
}

impl PreloadSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), conditions: vec![] }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: PreloadCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Split the path, rejecting empty segments and paths deeper than `max_depth`.
    pub fn segments(&self, max_depth: usize) -> Result<Vec<&str>, OrmError> {
        let segments: Vec<&str> = self.path.split('.').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(OrmError::InvalidPreloadOption(format!("empty segment in '{}'", self.path)));
        }
        if segments.len() > max_depth {
            return Err(OrmError::InvalidPreloadOption(format!(
                "'{}' is {} levels deep, limit is {}",
                self.path,
                segments.len(),
                max_depth
            )));
        }
        Ok(segments)
    }
}

impl From<&str> for PreloadSpec {
    fn from(path: &str) -> Self {
        PreloadSpec::new(path)
    }
}
