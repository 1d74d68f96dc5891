use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// One result row, column name to value.
pub type Row = Map<String, Value>;

/// Errors from the query execution layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Outcome of a row-affecting statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Generated key, for drivers that report one
    pub last_insert_id: Option<Value>,
}

/// Cancellation flag plus optional deadline, handed to every query unchanged.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), deadline: Some(Instant::now() + timeout) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> Result<(), DatabaseError> {
        if self.is_cancelled() {
            Err(DatabaseError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Blocking statement execution against a connection pool.
pub trait QueryExecutor: Send + Sync {
    fn query(&self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<Vec<Row>, DatabaseError>;

    fn execute(&self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<ExecResult, DatabaseError>;

    fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError>;
}

/// A single open transaction; consumed by commit or rollback.
pub trait Transaction: Send {
    fn query(&mut self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<Vec<Row>, DatabaseError>;

    fn execute(&mut self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<ExecResult, DatabaseError>;

    fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
