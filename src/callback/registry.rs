use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::chain::{CallbackChain, ResolvedCallback};
use super::context::OperationContext;
use super::steps;
use crate::error::OrmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    Create,
    Update,
    Delete,
    Query,
    RowQuery,
}

impl ChainKind {
    pub const ALL: [ChainKind; 5] =
        [ChainKind::Create, ChainKind::Update, ChainKind::Delete, ChainKind::Query, ChainKind::RowQuery];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Create => "create",
            ChainKind::Update => "update",
            ChainKind::Delete => "delete",
            ChainKind::Query => "query",
            ChainKind::RowQuery => "row_query",
        }
    }
}

impl std::fmt::Display for ChainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One independent chain per operation kind.
///
/// Built at startup and handed to [`crate::db::Database`]; treat it as read-only
/// once operations are running.
#[derive(Debug, Clone)]
pub struct Callbacks {
    creates: CallbackChain,
    updates: CallbackChain,
    deletes: CallbackChain,
    queries: CallbackChain,
    row_queries: CallbackChain,
}

impl Callbacks {
    /// Chains with no steps at all
    pub fn empty() -> Self {
        Self {
            creates: CallbackChain::new(ChainKind::Create.as_str()),
            updates: CallbackChain::new(ChainKind::Update.as_str()),
            deletes: CallbackChain::new(ChainKind::Delete.as_str()),
            queries: CallbackChain::new(ChainKind::Query.as_str()),
            row_queries: CallbackChain::new(ChainKind::RowQuery.as_str()),
        }
    }

    pub fn chain(&self, kind: ChainKind) -> &CallbackChain {
        match kind {
            ChainKind::Create => &self.creates,
            ChainKind::Update => &self.updates,
            ChainKind::Delete => &self.deletes,
            ChainKind::Query => &self.queries,
            ChainKind::RowQuery => &self.row_queries,
        }
    }

    pub fn chain_mut(&mut self, kind: ChainKind) -> &mut CallbackChain {
        match kind {
            ChainKind::Create => &mut self.creates,
            ChainKind::Update => &mut self.updates,
            ChainKind::Delete => &mut self.deletes,
            ChainKind::Query => &mut self.queries,
            ChainKind::RowQuery => &mut self.row_queries,
        }
    }

    pub fn create(&mut self) -> &mut CallbackChain {
        self.chain_mut(ChainKind::Create)
    }

    pub fn update(&mut self) -> &mut CallbackChain {
        self.chain_mut(ChainKind::Update)
    }

    pub fn delete(&mut self) -> &mut CallbackChain {
        self.chain_mut(ChainKind::Delete)
    }

    pub fn query(&mut self) -> &mut CallbackChain {
        self.chain_mut(ChainKind::Query)
    }

    pub fn row_query(&mut self) -> &mut CallbackChain {
        self.chain_mut(ChainKind::RowQuery)
    }

    pub fn resolve(&self, kind: ChainKind) -> Result<&[ResolvedCallback], OrmError> {
        self.chain(kind).resolve()
    }

    /// Resolve every chain so ordering mistakes surface at startup.
    pub fn validate(&self) -> Result<(), OrmError> {
        for kind in ChainKind::ALL {
            self.resolve(kind)?;
        }
        Ok(())
    }

    /// Run the resolved chain against `ctx`.
    ///
    /// Only a resolution failure is returned here; step errors land on the context.
    pub fn execute(&self, kind: ChainKind, ctx: &mut OperationContext) -> Result<(), OrmError> {
        let steps = self.resolve(kind)?;
        tracing::debug!("Executing {} chain for {} ({} steps)", kind, ctx.schema.name, steps.len());

        for step in steps {
            if ctx.is_skip_left() && !step.always {
                tracing::trace!("Skipping callback '{}'", step.name);
                continue;
            }
            if !ctx.has_error() && ctx.cancel.is_cancelled() {
                ctx.add_error(OrmError::Cancelled);
            }

            tracing::trace!("Running callback '{}'", step.name);
            if let Err(err) = step.call(ctx) {
                tracing::debug!("Callback '{}' failed: {}", step.name, err);
                ctx.add_error(err);
            }
        }

        tracing::debug!(
            "{} chain for {} finished in {}ms (error: {})",
            kind,
            ctx.schema.name,
            ctx.elapsed().as_millis(),
            ctx.has_error()
        );
        Ok(())
    }
}

impl Default for Callbacks {
    /// Chains pre-populated with the standard persistence steps
    fn default() -> Self {
        let mut callbacks = Self::empty();
        steps::register_defaults(&mut callbacks);
        callbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_create_order() {
        let callbacks = Callbacks::default();
        assert_eq!(
            callbacks.chain(ChainKind::Create).resolved_names().unwrap(),
            vec![
                "orm:begin_transaction",
                "orm:before_create",
                "orm:save_before_associations",
                "orm:update_time_stamp",
                "orm:create",
                "orm:force_reload_after_create",
                "orm:save_after_associations",
                "orm:after_create",
                "orm:commit_or_rollback_transaction",
            ]
        );
        assert!(callbacks.chain(ChainKind::Create).entry("orm:commit_or_rollback_transaction").unwrap().always);
    }

    #[test]
    fn default_chains_resolve() {
        let callbacks = Callbacks::default();
        assert!(callbacks.validate().is_ok());
        assert_eq!(
            callbacks.chain(ChainKind::Query).resolved_names().unwrap(),
            vec!["orm:query", "orm:preload", "orm:after_query"]
        );
        assert_eq!(callbacks.chain(ChainKind::RowQuery).resolved_names().unwrap(), vec!["orm:row_query"]);
        assert_eq!(callbacks.chain(ChainKind::Update).len(), 9);
        assert_eq!(callbacks.chain(ChainKind::Delete).len(), 5);
    }

    #[test]
    fn chains_are_independent() {
        let mut callbacks = Callbacks::default();
        callbacks.create().remove("orm:update_time_stamp");
        assert!(!callbacks.chain(ChainKind::Create).contains("orm:update_time_stamp"));
        assert!(callbacks.chain(ChainKind::Update).contains("orm:update_time_stamp"));
    }
}
