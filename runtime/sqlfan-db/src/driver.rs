//! The seam to the relational database client.
//!
//! Connect, prepare, execute and fetch are provided by a client library; the
//! rest of the crate only talks to these traits. Statements are released when
//! their handle drops, so every exit path (errors included) closes them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::ConnectionContext;
use crate::error::DriverError;
use crate::value::Value;

/// Opens connections for a context. Shared by every manager in the process.
pub trait Driver: Send + Sync {
    fn connect(
        &self,
        context: &ConnectionContext,
        database: &str,
    ) -> Result<Box<dyn Connection>, DriverError>;
}

/// A live connection bound to one database.
pub trait Connection {
    /// Runs a statement; `true` when it produced a result set.
    fn execute(&mut self, sql: &str) -> Result<bool, DriverError>;

    /// Runs a data-modifying statement and reports the affected row count.
    fn execute_update(&mut self, sql: &str) -> Result<u64, DriverError>;

    /// Runs a query and materialises every row.
    fn query(&mut self, sql: &str) -> Result<RowSet, DriverError>;

    /// Prepares a statement with `?` placeholders for batched execution.
    fn prepare_batch<'c>(
        &'c mut self,
        sql: &str,
    ) -> Result<Box<dyn BatchStatement + 'c>, DriverError>;

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn rollback(&mut self) -> Result<(), DriverError>;
}

/// A prepared statement accumulating parameter rows.
pub trait BatchStatement {
    /// Binds the zero-based parameter `index` of the row being assembled.
    fn bind(&mut self, index: usize, param: Param) -> Result<(), DriverError>;

    /// Queues the assembled row.
    fn add_batch(&mut self) -> Result<(), DriverError>;

    /// Executes every queued row and clears the queue.
    fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError>;
}

/// A bound parameter, one variant per binder the loader can select.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
}

/// Column names plus positional rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
