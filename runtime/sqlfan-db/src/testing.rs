//! Scripted in-memory driver for exercising failure paths.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{ConnectionConfig, ConnectionContext};
use crate::driver::{BatchStatement, Connection, Driver, Param, RowSet};
use crate::error::DriverError;
use crate::value::Value;

#[derive(Default)]
struct State {
    connects: Vec<String>,
    open_connections: usize,
    open_statements: usize,
    statements: Vec<String>,
    query_results: VecDeque<Result<RowSet, DriverError>>,
    flushed_rows: Vec<Vec<Param>>,
    flushes: usize,
    commits: usize,
    rollbacks: usize,
    auto_commit_calls: Vec<bool>,
    added_rows: usize,
    fail_add_batch_at: Option<usize>,
    fail_flush: Option<String>,
    fail_restore_auto_commit: bool,
    reject_timestamps: bool,
}

/// Shared handle; clones observe the same state.
#[derive(Clone, Default)]
pub(crate) struct ScriptedDriver {
    state: Arc<Mutex<State>>,
}

pub(crate) fn mysql_context() -> ConnectionContext {
    ConnectionConfig::new("mysql", "db.local", "app")
        .validate()
        .expect("context")
}

pub(crate) fn unknown_column(column: &str) -> DriverError {
    DriverError::new(format!("Unknown column '{column}' in 'field list'"))
}

pub(crate) fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> RowSet {
    RowSet {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

impl ScriptedDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("scripted driver state")
    }

    pub(crate) fn push_query(&self, result: Result<RowSet, DriverError>) {
        self.lock().query_results.push_back(result);
    }

    pub(crate) fn fail_add_batch_at(&self, row: usize) {
        self.lock().fail_add_batch_at = Some(row);
    }

    pub(crate) fn fail_flush(&self, message: &str) {
        self.lock().fail_flush = Some(message.to_string());
    }

    /// Turning auto-commit back on fails.
    pub(crate) fn fail_restore_auto_commit(&self) {
        self.lock().fail_restore_auto_commit = true;
    }

    pub(crate) fn reject_timestamps(&self) {
        self.lock().reject_timestamps = true;
    }

    pub(crate) fn connects(&self) -> Vec<String> {
        self.lock().connects.clone()
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    pub(crate) fn open_statements(&self) -> usize {
        self.lock().open_statements
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub(crate) fn flushed_rows(&self) -> Vec<Vec<Param>> {
        self.lock().flushed_rows.clone()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.lock().flushes
    }

    pub(crate) fn commits(&self) -> usize {
        self.lock().commits
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub(crate) fn auto_commit_calls(&self) -> Vec<bool> {
        self.lock().auto_commit_calls.clone()
    }
}

impl Driver for ScriptedDriver {
    fn connect(
        &self,
        _context: &ConnectionContext,
        database: &str,
    ) -> Result<Box<dyn Connection>, DriverError> {
        let mut state = self.lock();
        state.connects.push(database.to_string());
        state.open_connections += 1;
        Ok(Box::new(ScriptedConnection {
            driver: self.clone(),
        }))
    }
}

struct ScriptedConnection {
    driver: ScriptedDriver,
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.driver.lock().open_connections -= 1;
    }
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, sql: &str) -> Result<bool, DriverError> {
        self.driver.lock().statements.push(sql.to_string());
        Ok(sql.trim_start().to_ascii_uppercase().starts_with("SELECT"))
    }

    fn execute_update(&mut self, sql: &str) -> Result<u64, DriverError> {
        self.driver.lock().statements.push(sql.to_string());
        Ok(1)
    }

    fn query(&mut self, sql: &str) -> Result<RowSet, DriverError> {
        let mut state = self.driver.lock();
        state.statements.push(sql.to_string());
        state
            .query_results
            .pop_front()
            .unwrap_or_else(|| Ok(RowSet::default()))
    }

    fn prepare_batch<'c>(
        &'c mut self,
        sql: &str,
    ) -> Result<Box<dyn BatchStatement + 'c>, DriverError> {
        let mut state = self.driver.lock();
        state.statements.push(sql.to_string());
        state.open_statements += 1;
        Ok(Box::new(ScriptedStatement {
            driver: self.driver.clone(),
            current: Vec::new(),
            pending: Vec::new(),
        }))
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        let mut state = self.driver.lock();
        state.auto_commit_calls.push(enabled);
        if enabled && state.fail_restore_auto_commit {
            return Err(DriverError::new("cannot commit - no transaction is active"));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.driver.lock().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.driver.lock().rollbacks += 1;
        Ok(())
    }
}

struct ScriptedStatement {
    driver: ScriptedDriver,
    current: Vec<Param>,
    pending: Vec<Vec<Param>>,
}

impl Drop for ScriptedStatement {
    fn drop(&mut self) {
        self.driver.lock().open_statements -= 1;
    }
}

impl BatchStatement for ScriptedStatement {
    fn bind(&mut self, index: usize, param: Param) -> Result<(), DriverError> {
        if matches!(param, Param::Timestamp(_)) && self.driver.lock().reject_timestamps {
            return Err(DriverError::new("timestamp binder unavailable"));
        }
        if self.current.len() <= index {
            self.current.resize(index + 1, Param::Null);
        }
        self.current[index] = param;
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        let mut state = self.driver.lock();
        let row = state.added_rows;
        if state.fail_add_batch_at == Some(row) {
            return Err(DriverError::new(format!("forced failure on row {row}")));
        }
        state.added_rows += 1;
        self.pending.push(std::mem::take(&mut self.current));
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError> {
        let mut state = self.driver.lock();
        if let Some(message) = state.fail_flush.clone() {
            return Err(DriverError::new(message));
        }
        state.flushes += 1;
        let counts = vec![1; self.pending.len()];
        state.flushed_rows.append(&mut self.pending);
        Ok(counts)
    }
}
