//! Self-healing reads.
//!
//! A read that fails because the projection names a column the table no
//! longer has is retried with that column dropped. Anything else the driver
//! reports degrades to an empty result of the requested shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::driver::{Connection, RowSet};
use crate::error::DriverError;
use crate::value::Value;

/// Retries after the first attempt before a read gives up.
pub const MAX_HEALING_RETRIES: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadShape {
    /// Positional rows plus a parallel column-name list.
    #[default]
    #[serde(alias = "array")]
    Arrays,
    /// One column-keyed object per row.
    #[serde(alias = "object")]
    Objects,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Arrays {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Objects(Vec<BTreeMap<String, Value>>),
}

impl QueryOutput {
    pub fn empty(shape: ReadShape) -> Self {
        match shape {
            ReadShape::Arrays => Self::Arrays {
                columns: Vec::new(),
                rows: Vec::new(),
            },
            ReadShape::Objects => Self::Objects(Vec::new()),
        }
    }

    pub fn from_rows(rows: RowSet, shape: ReadShape) -> Self {
        match shape {
            ReadShape::Arrays => Self::Arrays {
                columns: rows.columns,
                rows: rows.rows,
            },
            ReadShape::Objects => {
                let RowSet { columns, rows } = rows;
                Self::Objects(
                    rows.into_iter()
                        .map(|row| columns.iter().cloned().zip(row).collect())
                        .collect(),
                )
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Arrays { rows, .. } => rows.len(),
            Self::Objects(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs `sql`, healing unknown-column failures. Never fails.
pub fn read(conn: &mut dyn Connection, sql: &str, shape: ReadShape) -> QueryOutput {
    let mut sql = sql.to_string();
    let mut retries = 0;
    loop {
        let err = match conn.query(&sql) {
            Ok(rows) => return QueryOutput::from_rows(rows, shape),
            Err(err) => err,
        };
        let Some(column) = unknown_column(&err) else {
            tracing::warn!(error = %err, "read failed; returning empty result");
            return QueryOutput::empty(shape);
        };
        if retries == MAX_HEALING_RETRIES {
            tracing::warn!(
                retries,
                column = %column,
                "read still references unknown columns; returning empty result"
            );
            return QueryOutput::empty(shape);
        }
        let Some(rewritten) = drop_column(&sql, &column) else {
            tracing::warn!(
                column = %column,
                "unknown column is not in the projection; returning empty result"
            );
            return QueryOutput::empty(shape);
        };
        retries += 1;
        tracing::debug!(
            column = %column,
            attempt = retries,
            "retrying read without unknown column"
        );
        sql = rewritten;
    }
}

/// Column named by an unknown-column driver error, across the phrasings
/// of the supported databases.
pub fn unknown_column(err: &DriverError) -> Option<String> {
    let message = err.message.as_str();
    let lower = message.to_ascii_lowercase();
    // MySQL: Unknown column 'x' in 'field list'
    if let Some(at) = lower.find("unknown column") {
        return quoted_after(&message[at + "unknown column".len()..]);
    }
    // SQL Server: Invalid column name 'x'.
    if let Some(at) = lower.find("invalid column name") {
        return quoted_after(&message[at + "invalid column name".len()..]);
    }
    // SQLite: no such column: x
    if let Some(at) = lower.find("no such column:") {
        let rest = message[at + "no such column:".len()..].trim();
        let name = rest.split_whitespace().next()?;
        return Some(unqualify(name).to_string());
    }
    // Postgres: column "x" does not exist / column t.x does not exist
    if let Some(end) = lower.find(" does not exist") {
        let head = &message[..end];
        let at = head.to_ascii_lowercase().rfind("column ")?;
        let name = head[at + "column ".len()..].trim();
        let name = name.trim_matches('"');
        return Some(unqualify(name).trim_matches('"').to_string()).filter(|n| !n.is_empty());
    }
    None
}

fn quoted_after(rest: &str) -> Option<String> {
    let rest = rest.trim_start();
    let quote = rest.chars().next().filter(|c| matches!(*c, '\'' | '"' | '`'))?;
    let inner = &rest[quote.len_utf8()..];
    let end = inner.find(quote)?;
    let name = unqualify(&inner[..end]);
    (!name.is_empty()).then(|| name.to_string())
}

fn unqualify(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Removes `column` from the top-level projection of a SELECT. `None` when
/// the statement is not a SELECT or the column is not projected.
pub fn drop_column(sql: &str, column: &str) -> Option<String> {
    let (start, end) = projection_span(sql)?;
    let projection = &sql[start..end];
    let items = split_top_level(projection);
    let kept: Vec<&str> = items
        .iter()
        .copied()
        .filter(|item| !names_column(item, column))
        .collect();
    if kept.len() == items.len() {
        return None;
    }
    let projection = if kept.is_empty() {
        "*".to_string()
    } else {
        kept.iter().map(|item| item.trim()).collect::<Vec<_>>().join(", ")
    };
    Some(format!(
        "{} {} {}",
        sql[..start].trim_end(),
        projection,
        sql[end..].trim_start()
    ))
}

/// Byte span of the text between `SELECT` and its top-level `FROM`.
fn projection_span(sql: &str) -> Option<(usize, usize)> {
    let upper = sql.to_ascii_uppercase();
    let select = upper.trim_start();
    if !select.starts_with("SELECT") {
        return None;
    }
    let mut start = upper.len() - select.len() + "SELECT".len();
    let rest = &upper[start..];
    let distinct = rest.trim_start();
    if distinct.starts_with("DISTINCT ") {
        start += rest.len() - distinct.len() + "DISTINCT".len();
    }
    let end = find_top_level(&upper, start, " FROM ")?;
    Some((start, end))
}

fn find_top_level(upper: &str, from: usize, needle: &str) -> Option<usize> {
    let bytes = upper.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'[' => quote = Some(b']'),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                _ if depth == 0 && bytes[i..].starts_with(needle.as_bytes()) => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn split_top_level(projection: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut last = 0;
    for (i, c) in projection.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    items.push(&projection[last..i]);
                    last = i + 1;
                }
                _ => {}
            },
        }
    }
    items.push(&projection[last..]);
    items
}

/// Whether a projection item refers to `column`, ignoring quoting, table
/// qualification and aliases.
fn names_column(item: &str, column: &str) -> bool {
    let expr = item.split_whitespace().next().unwrap_or_default();
    let name = unqualify(expr).trim_matches(|c| matches!(c, '`' | '"' | '[' | ']'));
    name.eq_ignore_ascii_case(column)
}
