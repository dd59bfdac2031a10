//! Type-directed bulk loading.
//!
//! One parameterized INSERT is prepared per call and every row is queued on
//! it. Each cell is bound by the binder its [`Kind`] selects; the kind comes
//! from [`classify`] for local values or travels with the cell as a
//! [`TypedValue`] when the row crossed the remote boundary.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::compile::quote_ident;
use crate::config::Dialect;
use crate::driver::{BatchStatement, Connection, Param};
use crate::error::{DbError, DriverError, LoadError};
use crate::value::{Cell, DATETIME_TEXT_FORMAT, Kind, TypedValue, Value, classify};

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadOptions {
    /// Target database; the context default when absent.
    pub database: Option<String>,
    pub auto_commit: bool,
    pub batch_size: usize,
    pub upsert: bool,
    pub detect_types: bool,
    /// Kinds bound as text regardless of the detected binder.
    pub string_kinds: Vec<Kind>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            database: None,
            auto_commit: false,
            batch_size: DEFAULT_BATCH_SIZE,
            upsert: false,
            detect_types: true,
            string_kinds: Vec::new(),
        }
    }
}

/// A cell the loader can bind.
pub trait LoadCell {
    fn kind(&self) -> Kind;
    fn value(&self) -> Cow<'_, Value>;
}

impl LoadCell for Value {
    fn kind(&self) -> Kind {
        classify(self)
    }

    fn value(&self) -> Cow<'_, Value> {
        Cow::Borrowed(self)
    }
}

impl LoadCell for TypedValue {
    fn kind(&self) -> Kind {
        self.kind
    }

    fn value(&self) -> Cow<'_, Value> {
        Cow::Owned(self.rehydrate())
    }
}

impl LoadCell for Cell {
    fn kind(&self) -> Kind {
        match self {
            Self::Typed(typed) => typed.kind,
            Self::Raw(value) => classify(value),
        }
    }

    fn value(&self) -> Cow<'_, Value> {
        match self {
            Self::Typed(typed) => Cow::Owned(typed.rehydrate()),
            Self::Raw(value) => Cow::Borrowed(value),
        }
    }
}

/// `INSERT INTO t (c..) VALUES (?..)`, with the upsert clause when asked.
pub fn insert_sql(
    dialect: Dialect,
    table: &str,
    columns: &[String],
    upsert: bool,
) -> Result<String, DbError> {
    if table.trim().is_empty() {
        return Err(DbError::validation("table name is required"));
    }
    if columns.is_empty() {
        return Err(DbError::validation("at least one column is required"));
    }
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(dialect, c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote_ident(dialect, table),
        quoted.join(", ")
    );
    if upsert {
        if !dialect.is_mysql_family() {
            return Err(DbError::validation(format!(
                "upsert is not supported for the {dialect} dialect"
            )));
        }
        let updates: Vec<String> = quoted
            .iter()
            .map(|column| format!("{column} = VALUES({column})"))
            .collect();
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&updates.join(", "));
    }
    Ok(sql)
}

/// Loads `rows` into `table`. All-or-nothing unless auto-commit chunking
/// is requested.
pub fn load<C: LoadCell>(
    conn: &mut dyn Connection,
    dialect: Dialect,
    table: &str,
    columns: &[String],
    rows: &[Vec<C>],
    options: &LoadOptions,
) -> Result<bool, DbError> {
    let sql = insert_sql(dialect, table, columns, options.upsert)?;
    for (row, cells) in rows.iter().enumerate() {
        if cells.len() != columns.len() {
            return Err(DbError::Arity {
                row,
                column: cells.len().min(columns.len()),
                found: cells.len(),
                expected: columns.len(),
            });
        }
    }

    if !options.auto_commit {
        conn.set_auto_commit(false)?;
    }
    let outcome = queue_rows(conn, &sql, rows, options);
    let finished = match outcome {
        Ok(()) if options.auto_commit => Ok(()),
        Ok(()) => conn.commit().map_err(DbError::from),
        Err(err) => {
            if !options.auto_commit {
                tracing::warn!(table, error = %err, "bulk load failed; rolling back");
                if let Err(rollback) = conn.rollback() {
                    tracing::error!(table, error = %rollback, "rollback failed");
                }
            }
            Err(err)
        }
    };
    if !options.auto_commit {
        let restored = conn.set_auto_commit(true);
        match (&finished, restored) {
            (Ok(()), Err(err)) => return Err(err.into()),
            (Err(_), Err(err)) => {
                tracing::error!(table, error = %err, "failed to restore auto-commit");
            }
            (_, Ok(())) => {}
        }
    }
    finished?;
    tracing::debug!(table, rows = rows.len(), "bulk load complete");
    Ok(true)
}

struct Cursor {
    row: usize,
    column: usize,
    value: String,
    kind: Kind,
}

impl Cursor {
    fn fail(&self, source: DriverError) -> LoadError {
        LoadError {
            row: self.row,
            column: self.column,
            value: self.value.clone(),
            kind: self.kind,
            source,
        }
    }
}

fn queue_rows<C: LoadCell>(
    conn: &mut dyn Connection,
    sql: &str,
    rows: &[Vec<C>],
    options: &LoadOptions,
) -> Result<(), DbError> {
    let batch_size = options.batch_size.max(1);
    let mut stmt = conn.prepare_batch(sql)?;
    let mut cursor = Cursor {
        row: 0,
        column: 0,
        value: String::new(),
        kind: Kind::Null,
    };
    for (row, cells) in rows.iter().enumerate() {
        cursor.row = row;
        for (column, cell) in cells.iter().enumerate() {
            let kind = cell.kind();
            let value = cell.value();
            cursor.column = column;
            cursor.kind = kind;
            cursor.value = value.to_text();
            bind_cell(stmt.as_mut(), column, &value, kind, options)
                .map_err(|err| cursor.fail(err))?;
        }
        stmt.add_batch().map_err(|err| cursor.fail(err))?;
        if options.auto_commit && (row + 1) % batch_size == 0 {
            stmt.execute_batch().map_err(|err| cursor.fail(err))?;
        }
    }
    stmt.execute_batch().map_err(|err| cursor.fail(err))?;
    Ok(())
}

/// Binds one cell with the binder its kind selects.
pub fn bind_cell(
    stmt: &mut dyn BatchStatement,
    index: usize,
    value: &Value,
    kind: Kind,
    options: &LoadOptions,
) -> Result<(), DriverError> {
    if value.is_null() || kind == Kind::Null {
        return stmt.bind(index, Param::Null);
    }
    if !options.detect_types || options.string_kinds.contains(&kind) {
        return stmt.bind(index, Param::Text(value.to_text()));
    }
    let text = || Param::Text(value.to_text());
    match kind {
        Kind::Null | Kind::Unknown => stmt.bind(index, Param::Null),
        Kind::Boolean => stmt.bind(index, value.as_bool().map_or_else(text, Param::Bool)),
        Kind::Integer => stmt.bind(index, value.as_i64().map_or_else(text, Param::Int)),
        Kind::Double => stmt.bind(index, value.as_f64().map_or_else(text, Param::Double)),
        Kind::String => stmt.bind(index, text()),
        Kind::Date => match value.as_datetime() {
            Some(date) => stmt.bind(index, Param::Timestamp(date)).or_else(|err| {
                tracing::debug!(error = %err, "timestamp binder failed; binding as text");
                stmt.bind(index, Param::Text(date.format(DATETIME_TEXT_FORMAT).to_string()))
            }),
            None => stmt.bind(index, text()),
        },
        Kind::Blob => match value {
            Value::Blob(bytes) => stmt.bind(index, Param::Bytes(bytes.clone())),
            _ => stmt.bind(index, text()),
        },
        Kind::Array | Kind::Object => {
            let json = serde_json::to_string(&value.to_json()).map_or_else(|_| text(), Param::Text);
            stmt.bind(index, json).or_else(|_| stmt.bind(index, text()))
        }
    }
}
