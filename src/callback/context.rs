use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::registry::ChainKind;
use crate::config::OrmConfig;
use crate::database::executor::{CancelToken, DatabaseError, ExecResult, Row, Transaction};
use crate::database::record::Record;
use crate::db::Database;
use crate::dialect::Dialect;
use crate::error::OrmError;
use crate::filter::{Condition, Filter};
use crate::preload::PreloadSpec;
use crate::schema::EntitySchema;

/// Transaction handle shared by an operation and the nested operations it starts.
pub type SharedTx = Arc<Mutex<Option<Box<dyn Transaction>>>>;

/// What an operation reads into or writes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Bulk update/delete driven only by search conditions
    None,
    Single(Record),
    Many(Vec<Record>),
}

impl Target {
    pub fn records(&self) -> &[Record] {
        match self {
            Target::None => &[],
            Target::Single(record) => std::slice::from_ref(record),
            Target::Many(records) => records,
        }
    }

    pub fn records_mut(&mut self) -> &mut [Record] {
        match self {
            Target::None => &mut [],
            Target::Single(record) => std::slice::from_mut(record),
            Target::Many(records) => records,
        }
    }

    pub fn single(&self) -> Option<&Record> {
        match self {
            Target::Single(record) => Some(record),
            _ => None,
        }
    }

    pub fn single_mut(&mut self) -> Option<&mut Record> {
        match self {
            Target::Single(record) => Some(record),
            _ => None,
        }
    }
}

/// Query description collected before the chain runs.
#[derive(Debug, Clone, Default)]
pub struct Search {
    pub conditions: Vec<Condition>,
    pub select: Vec<String>,
    pub joins: Vec<String>,
    pub order: Vec<Value>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub preload: Vec<PreloadSpec>,
    /// Include soft-deleted rows and hard-delete
    pub unscoped: bool,
}

/// Per-invocation state shared by the steps of one chain.
///
/// Holds the first error only; later errors are logged and dropped so the
/// remaining steps (notably commit-or-rollback) still see why the operation failed.
pub struct OperationContext {
    pub kind: ChainKind,
    db: Database,
    pub schema: Arc<EntitySchema>,
    pub target: Target,
    pub search: Search,

    // Statement under construction
    pub sql: String,
    pub params: Vec<Value>,

    // Results
    pub rows_affected: u64,
    pub rows: Vec<Row>,

    // Scoped values passed forward between steps
    scratch: HashMap<String, Value>,

    error: Option<OrmError>,
    skip_left: bool,

    tx: Option<SharedTx>,
    owns_tx: bool,
    pub cancel: CancelToken,

    start_time: Instant,
}

impl OperationContext {
    pub fn new(kind: ChainKind, db: Database, schema: Arc<EntitySchema>, target: Target) -> Self {
        Self {
            kind,
            db,
            schema,
            target,
            search: Search::default(),
            sql: String::new(),
            params: vec![],
            rows_affected: 0,
            rows: vec![],
            scratch: HashMap::new(),
            error: None,
            skip_left: false,
            tx: None,
            owns_tx: false,
            cancel: CancelToken::new(),
            start_time: Instant::now(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.db.dialect()
    }

    pub fn config(&self) -> &OrmConfig {
        self.db.config()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    // === Scratch values ===

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.scratch.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.scratch.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.scratch.contains_key(key)
    }

    /// Boolean scratch value; absent counts as `default`
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.scratch.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Scratch value rendered as an SQL suffix, e.g. `ON CONFLICT DO NOTHING`
    pub fn option_suffix(&self, key: &str) -> String {
        match self.scratch.get(key) {
            Some(Value::String(s)) if !s.is_empty() => format!(" {}", s),
            Some(Value::Null) | None => String::new(),
            Some(other) => format!(" {}", other),
        }
    }

    pub fn scratch(&self) -> &HashMap<String, Value> {
        &self.scratch
    }

    // === Errors and flow ===

    /// Record `error` unless an earlier one is already held.
    pub fn add_error(&mut self, error: OrmError) {
        match &self.error {
            None => {
                tracing::debug!("{} on {} failed: {}", self.kind, self.schema.name, error);
                self.error = Some(error);
            }
            Some(first) => tracing::debug!("Dropping error after '{}': {}", first, error),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&OrmError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<OrmError> {
        self.error.take()
    }

    /// Skip every remaining step not registered as `always`
    pub fn skip_left(&mut self) {
        self.skip_left = true;
    }

    pub fn is_skip_left(&self) -> bool {
        self.skip_left
    }

    // === SQL building ===

    /// Bind `value` and return its placeholder
    pub fn add_to_vars(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect().bind_var(self.params.len())
    }

    pub fn quote(&self, ident: &str) -> String {
        self.dialect().quote(ident)
    }

    pub fn quoted_table(&self) -> String {
        self.dialect().quote(&self.schema.table)
    }

    /// True when the operation is narrowed by a primary key or a search condition
    pub fn has_conditions(&self) -> bool {
        !self.primary_key_conditions().is_empty() || !self.search.conditions.is_empty()
    }

    fn primary_key_conditions(&self) -> Vec<Condition> {
        let Some(record) = self.target.single() else {
            return vec![];
        };
        let columns = self.schema.primary_key_columns();
        if columns.is_empty() || columns.iter().any(|c| record.is_blank(c)) {
            return vec![];
        }
        columns
            .iter()
            .map(|c| Condition::eq(self.schema.qualified(c), record.get(c).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    /// ` WHERE ...` for the target's primary key, the search conditions and soft delete.
    /// Placeholders continue after the parameters already bound.
    pub fn combined_condition_sql(&mut self) -> Result<String, OrmError> {
        let mut filter = Filter::new(self.schema.table.clone())?;
        for condition in self.primary_key_conditions() {
            filter.condition(condition);
        }
        for condition in &self.search.conditions {
            filter.condition(condition.clone());
        }
        if !self.search.unscoped {
            filter.soft_delete(self.schema.soft_delete_column().map(|c| self.schema.qualified(c)));
        }

        let where_sql = filter.to_where_sql(self.params.len(), self.dialect())?;
        self.params.extend(where_sql.params);
        if where_sql.query.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", where_sql.query))
        }
    }

    // === Transactions ===

    /// Share an outer operation's transaction; this context will not commit it.
    pub fn join_transaction(&mut self, tx: Option<SharedTx>) {
        self.tx = tx;
        self.owns_tx = false;
    }

    pub fn transaction(&self) -> Option<SharedTx> {
        self.tx.clone()
    }

    pub fn begin_transaction(&mut self) -> Result<(), OrmError> {
        if self.tx.is_some() {
            return Ok(());
        }
        let tx = self.db.executor().begin()?;
        self.tx = Some(Arc::new(Mutex::new(Some(tx))));
        self.owns_tx = true;
        tracing::debug!("Began transaction for {} on {}", self.kind, self.schema.name);
        Ok(())
    }

    /// Commit when no error was recorded, roll back otherwise. Nested contexts leave
    /// the transaction to its owner.
    pub fn commit_or_rollback(&mut self) -> Result<(), OrmError> {
        if !self.owns_tx {
            return Ok(());
        }
        self.owns_tx = false;
        let Some(shared) = self.tx.take() else {
            return Ok(());
        };
        let tx = shared
            .lock()
            .map_err(|_| DatabaseError::Transaction("transaction lock poisoned".to_string()))?
            .take();
        let Some(tx) = tx else {
            return Ok(());
        };

        if self.has_error() {
            if let Err(e) = tx.rollback() {
                tracing::error!("Rollback failed for {} on {}: {}", self.kind, self.schema.name, e);
                return Err(e.into());
            }
            tracing::debug!("Rolled back {} on {}", self.kind, self.schema.name);
        } else {
            tx.commit()?;
            tracing::debug!("Committed {} on {}", self.kind, self.schema.name);
        }
        Ok(())
    }

    // === Execution ===

    pub fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, OrmError> {
        let started = Instant::now();
        let result = match &self.tx {
            Some(shared) => {
                let mut guard = shared
                    .lock()
                    .map_err(|_| DatabaseError::Transaction("transaction lock poisoned".to_string()))?;
                match guard.as_mut() {
                    Some(tx) => tx.query(sql, params, &self.cancel),
                    None => self.db.executor().query(sql, params, &self.cancel),
                }
            }
            None => self.db.executor().query(sql, params, &self.cancel),
        };
        self.log_statement(sql, params, started.elapsed());
        Ok(result?)
    }

    pub fn exec(&self, sql: &str, params: &[Value]) -> Result<ExecResult, OrmError> {
        let started = Instant::now();
        let result = match &self.tx {
            Some(shared) => {
                let mut guard = shared
                    .lock()
                    .map_err(|_| DatabaseError::Transaction("transaction lock poisoned".to_string()))?;
                match guard.as_mut() {
                    Some(tx) => tx.execute(sql, params, &self.cancel),
                    None => self.db.executor().execute(sql, params, &self.cancel),
                }
            }
            None => self.db.executor().execute(sql, params, &self.cancel),
        };
        self.log_statement(sql, params, started.elapsed());
        Ok(result?)
    }

    fn log_statement(&self, sql: &str, params: &[Value], elapsed: Duration) {
        let config = &self.config().database;
        if config.enable_query_logging {
            tracing::debug!("SQL ({}ms): {} {:?}", elapsed.as_millis(), sql, params);
        }
        if config.enable_slow_query_warning && elapsed.as_millis() >= u128::from(config.slow_query_threshold_ms) {
            tracing::warn!("Slow query ({}ms > {}ms): {}", elapsed.as_millis(), config.slow_query_threshold_ms, sql);
        }
    }
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("kind", &self.kind)
            .field("entity", &self.schema.name)
            .field("sql", &self.sql)
            .field("params", &self.params)
            .field("rows_affected", &self.rows_affected)
            .field("error", &self.error)
            .field("skip_left", &self.skip_left)
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}
