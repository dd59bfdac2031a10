//! SQLite connector behind the driver seam.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{OpenFlags, Statement, params_from_iter};

use crate::config::ConnectionContext;
use crate::driver::{BatchStatement, Connection, Driver, Param, RowSet};
use crate::error::DriverError;
use crate::value::{DATETIME_TEXT_FORMAT, Value};

const BUSY_TIMEOUT_MS: u64 = 100;

fn driver_err(err: rusqlite::Error) -> DriverError {
    DriverError::new(err.to_string())
}

/// Maps each database name to `<data_dir>/<name>.sqlite3`.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    data_dir: PathBuf,
}

impl SqliteDriver {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn database_path(&self, database: &str) -> Result<PathBuf, DriverError> {
        let valid = !database.is_empty()
            && database
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
        if !valid {
            return Err(DriverError::new(format!(
                "invalid sqlite database name '{database}'"
            )));
        }
        Ok(self.data_dir.join(format!("{database}.sqlite3")))
    }
}

impl Driver for SqliteDriver {
    fn connect(
        &self,
        _context: &ConnectionContext,
        database: &str,
    ) -> Result<Box<dyn Connection>, DriverError> {
        let path = self.database_path(database)?;
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = rusqlite::Connection::open_with_flags(&path, flags).map_err(driver_err)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(driver_err)?;
        tracing::debug!(path = %path.display(), "opened sqlite database");
        Ok(Box::new(SqliteConnection { conn }))
    }
}

struct SqliteConnection {
    conn: rusqlite::Connection,
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

fn to_sql(param: &Param) -> SqlValue {
    match param {
        Param::Null => SqlValue::Null,
        Param::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Param::Int(v) => SqlValue::Integer(*v),
        Param::Double(v) => SqlValue::Real(*v),
        Param::Text(text) => SqlValue::Text(text.clone()),
        Param::Timestamp(date) => SqlValue::Text(date.format(DATETIME_TEXT_FORMAT).to_string()),
        Param::Bytes(bytes) => SqlValue::Blob(bytes.clone()),
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> Result<bool, DriverError> {
        let mut stmt = self.conn.prepare(sql).map_err(driver_err)?;
        if stmt.column_count() == 0 {
            stmt.execute([]).map_err(driver_err)?;
            return Ok(false);
        }
        let mut rows = stmt.query([]).map_err(driver_err)?;
        while rows.next().map_err(driver_err)?.is_some() {}
        Ok(true)
    }

    fn execute_update(&mut self, sql: &str) -> Result<u64, DriverError> {
        let changed = self.conn.execute(sql, []).map_err(driver_err)?;
        Ok(changed as u64)
    }

    fn query(&mut self, sql: &str) -> Result<RowSet, DriverError> {
        let mut stmt = self.conn.prepare(sql).map_err(driver_err)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = stmt.query([]).map_err(driver_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(driver_err)? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(to_value(row.get_ref(index).map_err(driver_err)?));
            }
            out.push(values);
        }
        Ok(RowSet { columns, rows: out })
    }

    fn prepare_batch<'c>(
        &'c mut self,
        sql: &str,
    ) -> Result<Box<dyn BatchStatement + 'c>, DriverError> {
        let stmt = self.conn.prepare(sql).map_err(driver_err)?;
        Ok(Box::new(SqliteBatch {
            stmt,
            current: Vec::new(),
            pending: Vec::new(),
        }))
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        let sql = match (enabled, self.conn.is_autocommit()) {
            (true, false) => "COMMIT",
            (false, true) => "BEGIN",
            _ => return Ok(()),
        };
        self.conn.execute_batch(sql).map_err(driver_err)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT; BEGIN").map_err(driver_err)
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK; BEGIN").map_err(driver_err)
    }
}

/// Rows are buffered and executed on flush; the statement is finalized
/// when the batch drops.
struct SqliteBatch<'c> {
    stmt: Statement<'c>,
    current: Vec<Param>,
    pending: Vec<Vec<Param>>,
}

impl BatchStatement for SqliteBatch<'_> {
    fn bind(&mut self, index: usize, param: Param) -> Result<(), DriverError> {
        if index >= self.stmt.parameter_count() {
            return Err(DriverError::new(format!(
                "parameter index {index} out of range"
            )));
        }
        if self.current.len() <= index {
            self.current.resize(index + 1, Param::Null);
        }
        self.current[index] = param;
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        let mut row = std::mem::take(&mut self.current);
        row.resize(self.stmt.parameter_count(), Param::Null);
        self.pending.push(row);
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError> {
        let mut counts = Vec::with_capacity(self.pending.len());
        for row in self.pending.drain(..) {
            let values: Vec<SqlValue> = row.iter().map(to_sql).collect();
            let changed = self
                .stmt
                .execute(params_from_iter(values.iter()))
                .map_err(driver_err)?;
            counts.push(changed as u64);
        }
        Ok(counts)
    }
}
