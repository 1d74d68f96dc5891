// Entry point: schemas, chains, executor and dialect behind one cheap handle
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

use crate::callback::context::{OperationContext, Search, SharedTx, Target};
use crate::callback::keys::{AUTO_PRELOAD, ORDER_BY_PRIMARY_KEY, SAVE_ASSOCIATIONS, UPDATE_COLUMN, UPDATE_INTERFACE};
use crate::callback::registry::{Callbacks, ChainKind};
use crate::config::{config, OrmConfig};
use crate::database::executor::{CancelToken, DatabaseError, QueryExecutor, Row};
use crate::database::record::Record;
use crate::dialect::{Dialect, Postgres};
use crate::error::{OrmError, OrmResult};
use crate::filter::Condition;
use crate::preload::{PreloadCondition, PreloadResolver, PreloadSpec};
use crate::schema::{EntitySchema, SchemaRegistry};

/// Transaction and cancellation an operation runs under.
///
/// Operations started from inside another operation's steps reuse its session so
/// that everything commits or rolls back together.
#[derive(Clone, Default)]
pub struct Session {
    tx: Option<SharedTx>,
    cancel: CancelToken,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session of a running operation
    pub fn of(ctx: &OperationContext) -> Self {
        Self { tx: ctx.transaction(), cancel: ctx.cancel.clone() }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("in_transaction", &self.tx.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

struct DatabaseInner {
    schemas: SchemaRegistry,
    callbacks: Callbacks,
    executor: Arc<dyn QueryExecutor>,
    dialect: Arc<dyn Dialect>,
    config: OrmConfig,
}

/// Shared handle to the ORM; clone freely.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.inner.dialect.name())
            .field("entities", &self.inner.schemas.names())
            .finish()
    }
}

pub struct DatabaseBuilder {
    schemas: SchemaRegistry,
    callbacks: Callbacks,
    executor: Arc<dyn QueryExecutor>,
    dialect: Arc<dyn Dialect>,
    config: OrmConfig,
}

impl DatabaseBuilder {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            schemas: SchemaRegistry::new(),
            callbacks: Callbacks::default(),
            executor,
            dialect: Arc::new(Postgres),
            config: config().clone(),
        }
    }

    #[must_use]
    pub fn dialect(mut self, dialect: impl Dialect + 'static) -> Self {
        self.dialect = Arc::new(dialect);
        self
    }

    #[must_use]
    pub fn config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Adjust the default chains before the database is built.
    #[must_use]
    pub fn configure_callbacks(mut self, configure: impl FnOnce(&mut Callbacks)) -> Self {
        configure(&mut self.callbacks);
        self
    }

    pub fn entity(mut self, schema: EntitySchema) -> OrmResult<Self> {
        self.schemas.register(schema)?;
        Ok(self)
    }

    /// Resolve every chain and check that relations point at registered entities.
    pub fn build(self) -> OrmResult<Database> {
        self.callbacks.validate()?;
        for name in self.schemas.names() {
            let schema = self.schemas.get(name)?;
            for relation in &schema.relations {
                if !self.schemas.contains(&relation.related) {
                    return Err(OrmError::UnknownEntity(relation.related.clone()));
                }
            }
        }
        tracing::info!(
            "ORM ready: {} entities, dialect {}",
            self.schemas.names().len(),
            self.dialect.name()
        );
        Ok(Database {
            inner: Arc::new(DatabaseInner {
                schemas: self.schemas,
                callbacks: self.callbacks,
                executor: self.executor,
                dialect: self.dialect,
                config: self.config,
            }),
        })
    }
}

impl Database {
    pub fn builder(executor: Arc<dyn QueryExecutor>) -> DatabaseBuilder {
        DatabaseBuilder::new(executor)
    }

    pub fn schema(&self, entity: &str) -> OrmResult<Arc<EntitySchema>> {
        self.inner.schemas.get(entity)
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.inner.schemas
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.inner.callbacks
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect.as_ref()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.inner.config
    }

    pub fn executor(&self) -> &dyn QueryExecutor {
        self.inner.executor.as_ref()
    }

    pub fn query(&self, entity: impl Into<String>) -> Query {
        Query::new(self.clone(), entity.into())
    }

    // === Record operations ===

    pub fn create(&self, entity: &str, record: &mut Record) -> OrmResult<()> {
        self.create_with(entity, record, &Session::default())
    }

    pub fn create_with(&self, entity: &str, record: &mut Record, session: &Session) -> OrmResult<()> {
        self.write(ChainKind::Create, entity, record, session, |_| {}).map(|_| ())
    }

    /// Insert a new record, otherwise write every column back.
    pub fn save(&self, entity: &str, record: &mut Record) -> OrmResult<()> {
        self.save_with(entity, record, &Session::default())
    }

    pub fn save_with(&self, entity: &str, record: &mut Record, session: &Session) -> OrmResult<()> {
        let schema = self.schema(entity)?;
        let key_blank = schema.primary_key_columns().iter().any(|c| record.is_blank(c));
        if record.is_new_record() || key_blank {
            self.create_with(entity, record, session)
        } else {
            self.write(ChainKind::Update, entity, record, session, |_| {}).map(|_| ())
        }
    }

    /// Update the given attributes, running hooks and touching `updated_at`.
    pub fn update(&self, entity: &str, record: &mut Record, attrs: Map<String, Value>) -> OrmResult<u64> {
        self.update_with(entity, record, attrs, &Session::default())
    }

    pub fn update_with(
        &self,
        entity: &str,
        record: &mut Record,
        attrs: Map<String, Value>,
        session: &Session,
    ) -> OrmResult<u64> {
        self.write(ChainKind::Update, entity, record, session, |ctx| {
            ctx.set(UPDATE_INTERFACE, Value::Object(attrs));
        })
    }

    /// Write columns directly: no hooks, no timestamp, no association saves.
    pub fn update_columns(&self, entity: &str, record: &mut Record, attrs: Map<String, Value>) -> OrmResult<u64> {
        self.write(ChainKind::Update, entity, record, &Session::default(), |ctx| {
            ctx.set(UPDATE_INTERFACE, Value::Object(attrs));
            ctx.set(UPDATE_COLUMN, true);
            ctx.set(SAVE_ASSOCIATIONS, false);
        })
    }

    pub fn delete(&self, entity: &str, record: &mut Record) -> OrmResult<u64> {
        self.delete_with(entity, record, &Session::default())
    }

    pub fn delete_with(&self, entity: &str, record: &mut Record, session: &Session) -> OrmResult<u64> {
        self.write(ChainKind::Delete, entity, record, session, |_| {})
    }

    /// Load `specs` onto records already in hand.
    pub fn preload(&self, entity: &str, records: &mut [Record], specs: &[PreloadSpec]) -> OrmResult<()> {
        let schema = self.schema(entity)?;
        PreloadResolver::new(self.clone()).preload(&schema, records, specs)
    }

    /// Run `work` in one transaction: commit on `Ok`, roll back on `Err`.
    pub fn transaction<T, F>(&self, work: F) -> OrmResult<T>
    where
        F: FnOnce(&Session) -> OrmResult<T>,
    {
        let tx = self.executor().begin()?;
        let shared: SharedTx = Arc::new(Mutex::new(Some(tx)));
        let session = Session { tx: Some(shared.clone()), cancel: CancelToken::new() };

        let result = work(&session);

        let tx = shared
            .lock()
            .map_err(|_| DatabaseError::Transaction("transaction lock poisoned".to_string()))?
            .take();
        if let Some(tx) = tx {
            match &result {
                Ok(_) => tx.commit()?,
                Err(err) => {
                    tracing::debug!("Rolling back transaction: {}", err);
                    if let Err(rollback) = tx.rollback() {
                        tracing::error!("Rollback failed: {}", rollback);
                    }
                }
            }
        }
        result
    }

    // === Plumbing ===

    pub(crate) fn context(
        &self,
        kind: ChainKind,
        schema: Arc<EntitySchema>,
        target: Target,
        session: &Session,
    ) -> OperationContext {
        let mut ctx = OperationContext::new(kind, self.clone(), schema, target);
        ctx.cancel = session.cancel.clone();
        ctx.join_transaction(session.tx.clone());
        ctx
    }

    /// Run the chain for `ctx.kind`, surfacing the first recorded error.
    pub(crate) fn execute(&self, ctx: &mut OperationContext) -> OrmResult<()> {
        self.inner.callbacks.execute(ctx.kind, ctx)?;
        match ctx.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn write<F>(&self, kind: ChainKind, entity: &str, record: &mut Record, session: &Session, prepare: F) -> OrmResult<u64>
    where
        F: FnOnce(&mut OperationContext),
    {
        let schema = self.schema(entity)?;
        let mut ctx = self.context(kind, schema, Target::Single(std::mem::take(record)), session);
        prepare(&mut ctx);

        let result = self.execute(&mut ctx);
        if let Target::Single(done) = std::mem::replace(&mut ctx.target, Target::None) {
            *record = done;
        }
        result.map(|_| ctx.rows_affected)
    }
}

/// Lazily built query; nothing runs until a terminal method is called.
#[derive(Clone)]
pub struct Query {
    db: Database,
    entity: String,
    search: Search,
    scratch: Vec<(String, Value)>,
    session: Session,
}

impl Query {
    fn new(db: Database, entity: String) -> Self {
        Self { db, entity, search: Search::default(), scratch: vec![], session: Session::default() }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn search(&self) -> &Search {
        &self.search
    }

    /// JSON filter, e.g. `{"age": {"$gte": 18}}`
    #[must_use]
    pub fn where_json(self, conditions: Value) -> Self {
        self.condition(Condition::Json(conditions))
    }

    /// SQL fragment with `?` placeholders
    #[must_use]
    pub fn where_raw(self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.condition(Condition::raw(sql, params))
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.search.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search.select = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.search.joins.push(clause.into());
        self
    }

    /// `"name desc"`, `["a", "b desc"]` or `{"a": "asc"}`
    #[must_use]
    pub fn order(mut self, order: impl Into<Value>) -> Self {
        self.search.order.push(order.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.search.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        self.search.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn preload(mut self, path: impl Into<String>) -> Self {
        self.search.preload.push(PreloadSpec::new(path));
        self
    }

    #[must_use]
    pub fn preload_with(mut self, path: impl Into<String>, conditions: Vec<PreloadCondition>) -> Self {
        self.search.preload.push(PreloadSpec { path: path.into(), conditions });
        self
    }

    /// Include soft-deleted rows; deletes become hard deletes.
    #[must_use]
    pub fn unscoped(mut self) -> Self {
        self.search.unscoped = true;
        self
    }

    /// Scratch value for the steps, e.g. `orm:query_option` = `"FOR UPDATE"`.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scratch.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn auto_preload(self, enabled: bool) -> Self {
        self.set(AUTO_PRELOAD, enabled)
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.session.cancel = cancel;
        self
    }

    #[must_use]
    pub fn in_transaction(mut self, tx: Option<SharedTx>) -> Self {
        self.session.tx = tx;
        self
    }

    #[must_use]
    pub fn session(mut self, session: &Session) -> Self {
        self.session = session.clone();
        self
    }

    // === Terminal operations ===

    /// Every matching record, preloads attached.
    pub fn find(self) -> OrmResult<Vec<Record>> {
        match self.run(ChainKind::Query, Target::Many(vec![]))?.target {
            Target::Many(records) => Ok(records),
            _ => Err(OrmError::UnsupportedDestination),
        }
    }

    /// First record by primary key; [`OrmError::RecordNotFound`] when none match.
    pub fn first(self) -> OrmResult<Record> {
        self.set(ORDER_BY_PRIMARY_KEY, "ASC").limit(1).single()
    }

    /// Last record by primary key.
    pub fn last(self) -> OrmResult<Record> {
        self.set(ORDER_BY_PRIMARY_KEY, "DESC").limit(1).single()
    }

    /// Any one matching record, in database order.
    pub fn take(self) -> OrmResult<Record> {
        self.limit(1).single()
    }

    fn single(self) -> OrmResult<Record> {
        match self.run(ChainKind::Query, Target::Single(Record::new()))?.target {
            Target::Single(record) => Ok(record),
            _ => Err(OrmError::UnsupportedDestination),
        }
    }

    /// Raw rows through the row-query chain.
    pub fn rows(self) -> OrmResult<Vec<Row>> {
        Ok(self.run(ChainKind::RowQuery, Target::None)?.rows)
    }

    /// Update every matching row with `attrs`.
    pub fn update(self, attrs: Map<String, Value>) -> OrmResult<u64> {
        let ctx = self.set(UPDATE_INTERFACE, Value::Object(attrs)).run(ChainKind::Update, Target::None)?;
        Ok(ctx.rows_affected)
    }

    /// Like [`Query::update`] without hooks or timestamps.
    pub fn update_columns(self, attrs: Map<String, Value>) -> OrmResult<u64> {
        let ctx = self
            .set(UPDATE_INTERFACE, Value::Object(attrs))
            .set(UPDATE_COLUMN, true)
            .run(ChainKind::Update, Target::None)?;
        Ok(ctx.rows_affected)
    }

    /// Delete (or soft delete) every matching row.
    pub fn delete(self) -> OrmResult<u64> {
        Ok(self.run(ChainKind::Delete, Target::None)?.rows_affected)
    }

    fn run(self, kind: ChainKind, target: Target) -> OrmResult<OperationContext> {
        let schema = self.db.schema(&self.entity)?;
        let mut ctx = self.db.context(kind, schema, target, &self.session);
        ctx.search = self.search;
        for (key, value) in self.scratch {
            ctx.set(key, value);
        }
        self.db.execute(&mut ctx)?;
        Ok(ctx)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("entity", &self.entity)
            .field("search", &self.search)
            .field("scratch", &self.scratch)
            .finish()
    }
}
