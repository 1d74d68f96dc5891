// In-memory executor for exercising chains without a database
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::database::executor::{CancelToken, DatabaseError, ExecResult, QueryExecutor, Row, Transaction};

/// One statement seen by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub in_transaction: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxCounts {
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

#[derive(Default)]
struct MockState {
    statements: Vec<Statement>,
    scripted: VecDeque<(String, Vec<Row>)>,
    tables: HashMap<String, Vec<Row>>,
    failures: Vec<(String, String)>,
    next_id: i64,
    tx: TxCounts,
}

/// Records every statement and answers from scripted rows.
///
/// SELECTs take the first scripted response whose pattern occurs in the SQL,
/// falling back to the rows stored for the table. Inserts hand out increasing ids.
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<MockState>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer the next query containing `pattern` with `rows`, once.
    pub fn on_query(&self, pattern: impl Into<String>, rows: Vec<Value>) -> &Self {
        let rows = rows.into_iter().filter_map(|v| v.as_object().cloned()).collect();
        self.lock().scripted.push_back((pattern.into(), rows));
        self
    }

    /// Rows returned for any unscripted SELECT from `table`.
    pub fn with_table(&self, table: impl Into<String>, rows: Vec<Value>) -> &Self {
        let rows = rows.into_iter().filter_map(|v| v.as_object().cloned()).collect();
        self.lock().tables.insert(table.into(), rows);
        self
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(&self, pattern: impl Into<String>, message: impl Into<String>) -> &Self {
        self.lock().failures.push((pattern.into(), message.into()));
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    pub fn sql_log(&self) -> Vec<String> {
        self.lock().statements.iter().map(|s| s.sql.clone()).collect()
    }

    /// Statements whose SQL starts with `prefix`, e.g. `"SELECT"`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.lock().statements.iter().filter(|s| s.sql.starts_with(prefix)).count()
    }

    pub fn transactions(&self) -> TxCounts {
        self.lock().tx
    }

    fn record(&self, sql: &str, params: &[Value], in_transaction: bool, cancel: &CancelToken) -> Result<(), DatabaseError> {
        cancel.check()?;
        let mut state = self.lock();
        state.statements.push(Statement { sql: sql.to_string(), params: params.to_vec(), in_transaction });
        match state.failures.iter().find(|(pattern, _)| sql.contains(pattern.as_str())) {
            Some((_, message)) => Err(DatabaseError::Query(message.clone())),
            None => Ok(()),
        }
    }

    fn answer_query(&self, sql: &str) -> Vec<Row> {
        let mut state = self.lock();
        if let Some(column) = returning_column(sql) {
            state.next_id += 1;
            let mut row = Row::new();
            row.insert(column, json!(state.next_id));
            return vec![row];
        }
        if let Some(index) = state.scripted.iter().position(|(pattern, _)| sql.contains(pattern.as_str())) {
            if let Some((_, rows)) = state.scripted.remove(index) {
                return rows;
            }
        }
        from_table(sql).and_then(|table| state.tables.get(&table).cloned()).unwrap_or_default()
    }

    fn answer_execute(&self, sql: &str) -> ExecResult {
        if sql.starts_with("INSERT") {
            let mut state = self.lock();
            state.next_id += 1;
            ExecResult { rows_affected: 1, last_insert_id: Some(json!(state.next_id)) }
        } else {
            ExecResult { rows_affected: 1, last_insert_id: None }
        }
    }
}

fn returning_column(sql: &str) -> Option<String> {
    let (_, column) = sql.rsplit_once("RETURNING ")?;
    Some(column.trim().trim_matches('"').to_string())
}

fn from_table(sql: &str) -> Option<String> {
    let (_, rest) = sql.split_once("FROM ")?;
    let table = rest.split_whitespace().next()?;
    Some(table.trim_matches('"').to_string())
}

impl QueryExecutor for MockExecutor {
    fn query(&self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<Vec<Row>, DatabaseError> {
        self.record(sql, params, false, cancel)?;
        Ok(self.answer_query(sql))
    }

    fn execute(&self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<ExecResult, DatabaseError> {
        self.record(sql, params, false, cancel)?;
        Ok(self.answer_execute(sql))
    }

    fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError> {
        self.lock().tx.begun += 1;
        Ok(Box::new(MockTransaction { executor: self.clone() }))
    }
}

pub struct MockTransaction {
    executor: MockExecutor,
}

impl Transaction for MockTransaction {
    fn query(&mut self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<Vec<Row>, DatabaseError> {
        self.executor.record(sql, params, true, cancel)?;
        Ok(self.executor.answer_query(sql))
    }

    fn execute(&mut self, sql: &str, params: &[Value], cancel: &CancelToken) -> Result<ExecResult, DatabaseError> {
        self.executor.record(sql, params, true, cancel)?;
        Ok(self.executor.answer_execute(sql))
    }

    fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.executor.lock().tx.committed += 1;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.executor.lock().tx.rolled_back += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_rows_are_used_once() {
        let mock = MockExecutor::new();
        mock.on_query("FROM \"users\"", vec![json!({"id": 1})]);
        mock.with_table("users", vec![json!({"id": 2})]);
        let cancel = CancelToken::new();

        let first = mock.query("SELECT * FROM \"users\"", &[], &cancel).unwrap();
        let second = mock.query("SELECT * FROM \"users\"", &[], &cancel).unwrap();
        assert_eq!(first[0]["id"], json!(1));
        assert_eq!(second[0]["id"], json!(2));
        assert_eq!(mock.count_prefix("SELECT"), 2);
    }

    #[test]
    fn returning_hands_out_ids() {
        let mock = MockExecutor::new();
        let cancel = CancelToken::new();
        let rows = mock.query("INSERT INTO \"users\" DEFAULT VALUES RETURNING \"id\"", &[], &cancel).unwrap();
        assert_eq!(rows[0]["id"], json!(1));
    }

    #[test]
    fn cancelled_token_stops_statements() {
        let mock = MockExecutor::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(mock.execute("DELETE FROM \"users\"", &[], &cancel), Err(DatabaseError::Cancelled)));
        assert!(mock.statements().is_empty());
    }
}
