// PostgreSQL executor: sqlx pool driven from synchronous callers
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow, PgTypeInfo};
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use uuid::Uuid;

use super::executor::{CancelToken, DatabaseError, ExecResult, QueryExecutor, Row, Transaction};
use crate::config::DatabaseConfig;

/// Drive a future to completion from blocking code, also when already inside the runtime.
pub fn block_on<F, T>(runtime: &Handle, f: F) -> T
where
    F: Future<Output = T>,
{
    match Handle::try_current() {
        Ok(_) => tokio::task::block_in_place(|| runtime.block_on(f)),
        Err(_) => runtime.block_on(f),
    }
}

#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
    runtime: Handle,
}

impl PgExecutor {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }

    /// Connect using `DATABASE_URL` and the pool settings from config.
    pub fn connect(runtime: Handle, config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = std::env::var("DATABASE_URL").map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs));
        let pool = block_on(&runtime, options.connect(&url))?;
        tracing::info!("Connected PostgreSQL pool (max {} connections)", config.max_connections);
        Ok(Self::new(pool, runtime))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl QueryExecutor for PgExecutor {
    fn query(&self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<Vec<Row>, DatabaseError> {
        run(&self.runtime, cancel, fetch_rows(&self.pool, sql, params))
    }

    fn execute(&self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<ExecResult, DatabaseError> {
        run(&self.runtime, cancel, execute_statement(&self.pool, sql, params))
    }

    fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError> {
        let tx = block_on(&self.runtime, self.pool.begin())?;
        Ok(Box::new(PgTransaction { tx, runtime: self.runtime.clone() }))
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    runtime: Handle,
}

impl Transaction for PgTransaction {
    fn query(&mut self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<Vec<Row>, DatabaseError> {
        run(&self.runtime, cancel, fetch_rows(&mut *self.tx, sql, params))
    }

    fn execute(&mut self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<ExecResult, DatabaseError> {
        run(&self.runtime, cancel, execute_statement(&mut *self.tx, sql, params))
    }

    fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let PgTransaction { tx, runtime } = *self;
        block_on(&runtime, tx.commit()).map_err(|e| DatabaseError::Transaction(e.to_string()))
    }

    fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        let PgTransaction { tx, runtime } = *self;
        block_on(&runtime, tx.rollback()).map_err(|e| DatabaseError::Transaction(e.to_string()))
    }
}

fn run<F, T>(runtime: &Handle, cancel: &CancelToken, fut: F) -> Result<T, DatabaseError>
where
    F: Future<Output = Result<T, DatabaseError>>,
{
    cancel.check()?;
    let remaining = cancel.remaining();
    block_on(runtime, async move {
        match remaining {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| DatabaseError::Cancelled)?,
            None => fut.await,
        }
    })
}

async fn fetch_rows<'c, E>(executor: E, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_param(query, param);
    }
    let rows = query.fetch_all(executor).await?;
    Ok(rows.iter().map(row_to_map).collect())
}

async fn execute_statement<'c, E>(executor: E, sql: &str, params: &[Value]) -> Result<ExecResult, DatabaseError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_param(query, param);
    }
    let result = query.execute(executor).await?;
    Ok(ExecResult { rows_affected: result.rows_affected(), last_insert_id: None })
}

fn row_to_map(row: &PgRow) -> Map<String, Value> {
    let mut record_data = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        record_data.insert(column.name().to_string(), extract_column_value(row, i, column.type_info()));
    }
    record_data
}

/// Extract typed value from database column
fn extract_column_value(row: &PgRow, index: usize, type_info: &PgTypeInfo) -> Value {
    let type_name = type_info.name();

    match type_name {
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)
            .ok()
            .flatten()
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|n| Value::Number(i64::from(n).into()))
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|n| Value::Number(i64::from(n).into()))
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(|n| Value::Number(n.into()))
            .unwrap_or(Value::Null),
        "FLOAT4" | "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "JSONB" | "JSON" => row.try_get::<Option<Value>, _>(index).ok().flatten().unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::String(t.to_rfc3339()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::String(t.and_utc().to_rfc3339()))
            .unwrap_or(Value::Null),
        _ => {
            tracing::warn!("Unhandled PostgreSQL type: {}, falling back to string", type_name);
            Value::String(format!("<unsupported type: {}>", type_name))
        }
    }
}

/// Bind parameter to SQL query
fn bind_param<'q>(
    q: sqlx::query::Query<'q, Postgres, PgArguments>,
    v: &Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(u) = n.as_u64() {
                // Postgres doesn't have u64
                q.bind(u as i64)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.clone()),
        // Arrays are expanded into placeholder lists before binding; anything left is JSON
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()),
    }
}
