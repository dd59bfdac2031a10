//! Filter-to-SQL compilation for the supported dialects.

use chrono::NaiveDateTime;

use crate::config::Dialect;
use crate::error::DbError;
use crate::filter::{Condition, Filter};
use crate::value::Value;

/// A SELECT under construction. Cheap to build; [`Select::to_sql`] does the work.
#[derive(Debug, Clone)]
pub struct Select<'a> {
    dialect: Dialect,
    table: &'a str,
    columns: &'a [String],
    filters: &'a [Filter],
    count_only: bool,
}

impl<'a> Select<'a> {
    pub fn new(dialect: Dialect, table: &'a str) -> Self {
        Self {
            dialect,
            table,
            columns: &[],
            filters: &[],
            count_only: false,
        }
    }

    /// Projection; empty selects every column.
    pub fn columns(mut self, columns: &'a [String]) -> Self {
        self.columns = columns;
        self
    }

    pub fn filters(mut self, filters: &'a [Filter]) -> Self {
        self.filters = filters;
        self
    }

    pub fn count_only(mut self, count_only: bool) -> Self {
        self.count_only = count_only;
        self
    }

    pub fn to_sql(&self) -> Result<String, DbError> {
        if self.table.trim().is_empty() {
            return Err(DbError::validation("table name is required"));
        }
        let projection = if self.count_only {
            "COUNT(*)".to_string()
        } else {
            projection(self.dialect, self.columns)
        };
        let mut sql = format!(
            "SELECT {projection} FROM {}",
            quote_ident(self.dialect, self.table)
        );

        let mut conditions = Vec::new();
        for filter in self.filters {
            filter.validate()?;
            if let Some(condition) = condition_sql(self.dialect, filter)? {
                conditions.push(condition);
            }
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if self.count_only {
            return Ok(sql);
        }

        let sort = self.filters.iter().find_map(|f| f.sort.as_deref());
        let direction = self.filters.iter().find_map(|f| f.direction);
        let limit = self.filters.iter().find_map(|f| f.limit);
        let offset = self.filters.iter().find_map(|f| f.offset);

        if let Some(sort) = sort {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                quote_ident(self.dialect, sort),
                direction.unwrap_or_default().keyword()
            ));
        }
        if let Some(clause) = pagination(self.dialect, sort.is_some(), limit, offset) {
            sql.push(' ');
            sql.push_str(&clause);
        }
        Ok(sql)
    }
}

/// Quotes an identifier, doubling any embedded closing quote.
pub fn quote_ident(dialect: Dialect, ident: &str) -> String {
    match dialect {
        Dialect::MySql | Dialect::CloudMySql => format!("`{}`", ident.replace('`', "``")),
        Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        Dialect::SqlServer => format!("[{}]", ident.replace(']', "]]")),
    }
}

/// Comma-joined quoted column list, or `*` when empty.
pub fn projection(dialect: Dialect, columns: &[String]) -> String {
    if columns.is_empty() {
        return "*".to_string();
    }
    columns
        .iter()
        .map(|column| quote_ident(dialect, column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quotes a string literal. MySQL also treats backslash as an escape
/// character inside literals, so it is doubled there.
fn quote_text(dialect: Dialect, text: &str) -> String {
    let escaped = match dialect {
        Dialect::MySql | Dialect::CloudMySql => text.replace('\\', "\\\\"),
        Dialect::Postgres | Dialect::SqlServer => text.to_string(),
    };
    format!("'{}'", escaped.replace('\'', "''"))
}

/// Renders a value as an SQL literal.
pub fn literal(dialect: Dialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => match dialect {
            Dialect::SqlServer => if *v { "1" } else { "0" }.to_string(),
            _ => if *v { "TRUE" } else { "FALSE" }.to_string(),
        },
        Value::Int(v) => v.to_string(),
        Value::Double(v) if v.is_finite() => v.to_string(),
        Value::Double(_) => "NULL".to_string(),
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            match dialect {
                Dialect::Postgres => format!("'\\x{hex}'::bytea"),
                Dialect::SqlServer => format!("0x{hex}"),
                Dialect::MySql | Dialect::CloudMySql => format!("X'{hex}'"),
            }
        }
        other => quote_text(dialect, &other.to_text()),
    }
}

/// Epoch seconds for a date-like value; other values pass through.
pub fn to_unix_time(value: &Value) -> Value {
    match value.as_datetime() {
        Some(date) => Value::Int(epoch_seconds(date)),
        None => value.clone(),
    }
}

fn epoch_seconds(date: NaiveDateTime) -> i64 {
    date.and_utc().timestamp()
}

fn bound(dialect: Dialect, filter: &Filter, value: &Value) -> String {
    if filter.to_unix_time {
        literal(dialect, &to_unix_time(value))
    } else {
        literal(dialect, value)
    }
}

fn condition_sql(dialect: Dialect, filter: &Filter) -> Result<Option<String>, DbError> {
    let (Some(condition), Some(column)) = (filter.condition.as_ref(), filter.column.as_deref())
    else {
        return Ok(None);
    };
    let column = quote_ident(dialect, column);
    let sql = match condition {
        Condition::Equals(Value::Null) => format!("{column} IS NULL"),
        Condition::Equals(value) => format!("{column} = {}", bound(dialect, filter, value)),
        Condition::Like(pattern) => format!("{column} LIKE {}", quote_text(dialect, pattern)),
        Condition::NotLike(pattern) => {
            format!("{column} NOT LIKE {}", quote_text(dialect, pattern))
        }
        Condition::Regex(pattern) => regex_sql(dialect, &column, pattern)?,
        Condition::Range {
            from: Some(from),
            to: Some(to),
        } => format!(
            "{column} BETWEEN {} AND {}",
            bound(dialect, filter, from),
            bound(dialect, filter, to)
        ),
        Condition::Range {
            from: Some(from),
            to: None,
        } => format!("{column} >= {}", bound(dialect, filter, from)),
        Condition::Range {
            from: None,
            to: Some(to),
        } => format!("{column} <= {}", bound(dialect, filter, to)),
        Condition::Range {
            from: None,
            to: None,
        } => return Ok(None),
    };
    Ok(Some(sql))
}

fn regex_sql(dialect: Dialect, column: &str, pattern: &str) -> Result<String, DbError> {
    match dialect {
        Dialect::MySql | Dialect::CloudMySql => {
            Ok(format!("{column} REGEXP {}", quote_text(dialect, pattern)))
        }
        Dialect::Postgres => Ok(format!("{column} ~ {}", quote_text(dialect, pattern))),
        Dialect::SqlServer => Err(DbError::validation(format!(
            "regex filters are not supported for the {dialect} dialect"
        ))),
    }
}

fn pagination(
    dialect: Dialect,
    sorted: bool,
    limit: Option<u64>,
    offset: Option<u64>,
) -> Option<String> {
    if limit.is_none() && offset.is_none() {
        return None;
    }
    let offset = offset.unwrap_or(0);
    let clause = match dialect {
        Dialect::SqlServer => {
            // OFFSET ... FETCH is only legal after ORDER BY.
            let order = if sorted { "" } else { "ORDER BY (SELECT NULL) " };
            match limit {
                Some(limit) => {
                    format!("{order}OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
                }
                None => format!("{order}OFFSET {offset} ROWS"),
            }
        }
        Dialect::MySql | Dialect::CloudMySql => match limit {
            Some(limit) => format!("LIMIT {limit} OFFSET {offset}"),
            // MySQL has no OFFSET without LIMIT.
            None => format!("LIMIT {} OFFSET {offset}", u64::MAX),
        },
        Dialect::Postgres => match limit {
            Some(limit) => format!("LIMIT {limit} OFFSET {offset}"),
            None => format!("OFFSET {offset}"),
        },
    };
    Some(clause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SortDirection;
    use proptest::prelude::*;

    const DIALECTS: [Dialect; 3] = [Dialect::MySql, Dialect::Postgres, Dialect::SqlServer];

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn no_filter_selects_plainly_in_every_dialect() {
        let columns = cols(&["a", "b"]);
        let expected = [
            "SELECT `a`, `b` FROM `t`",
            "SELECT \"a\", \"b\" FROM \"t\"",
            "SELECT [a], [b] FROM [t]",
        ];
        for (dialect, expected) in DIALECTS.into_iter().zip(expected) {
            let sql = Select::new(dialect, "t").columns(&columns).to_sql().expect("sql");
            assert_eq!(sql, expected);
        }
        let star = Select::new(Dialect::Postgres, "t").to_sql().expect("sql");
        assert_eq!(star, "SELECT * FROM \"t\"");
    }

    #[test]
    fn equality_sort_and_limit_render_per_dialect() {
        let filters = vec![
            Filter::on("col")
                .equals("x")
                .sort_by("c", SortDirection::Asc)
                .limit(3),
        ];
        let mysql = Select::new(Dialect::MySql, "t").filters(&filters).to_sql().expect("sql");
        assert_eq!(
            mysql,
            "SELECT * FROM `t` WHERE `col` = 'x' ORDER BY `c` ASC LIMIT 3 OFFSET 0"
        );
        let mssql = Select::new(Dialect::SqlServer, "t")
            .filters(&filters)
            .to_sql()
            .expect("sql");
        assert_eq!(
            mssql,
            concat!(
                "SELECT * FROM [t] WHERE [col] = 'x' ORDER BY [c] ASC ",
                "OFFSET 0 ROWS FETCH NEXT 3 ROWS ONLY"
            )
        );
    }

    #[test]
    fn condition_precedence_and_range_forms() {
        let cases = [
            (Filter::on("n").like("a%"), "`n` LIKE 'a%'"),
            (Filter::on("n").not_like("a%"), "`n` NOT LIKE 'a%'"),
            (Filter::on("n").regex("^a"), "`n` REGEXP '^a'"),
            (Filter::on("n").between(1i64, 5i64), "`n` BETWEEN 1 AND 5"),
            (Filter::on("n").at_least(1i64), "`n` >= 1"),
            (Filter::on("n").at_most(5i64), "`n` <= 5"),
            (Filter::on("n").equals(Value::Null), "`n` IS NULL"),
        ];
        for (filter, expected) in cases {
            let filters = [filter];
            let sql = Select::new(Dialect::MySql, "t").filters(&filters).to_sql().expect("sql");
            assert_eq!(sql, format!("SELECT * FROM `t` WHERE {expected}"));
        }
    }

    #[test]
    fn filters_and_combine_with_first_setter_wins() {
        let filters = vec![
            Filter::on("a").equals(1i64).limit(10),
            Filter::on("b").like("z%").limit(99).offset(20).sort_by("b", SortDirection::Desc),
            Filter::default().sort_by("a", SortDirection::Asc),
        ];
        let sql = Select::new(Dialect::Postgres, "t").filters(&filters).to_sql().expect("sql");
        assert_eq!(
            sql,
            concat!(
                "SELECT * FROM \"t\" WHERE \"a\" = 1 AND \"b\" LIKE 'z%' ",
                "ORDER BY \"b\" DESC LIMIT 10 OFFSET 20"
            )
        );
    }

    #[test]
    fn unix_time_converts_date_bounds() {
        let filters = vec![
            Filter::on("ts")
                .between("2024-01-01", "2024-01-02 00:00:00")
                .unix_time(),
        ];
        let sql = Select::new(Dialect::MySql, "t").filters(&filters).to_sql().expect("sql");
        assert_eq!(sql, "SELECT * FROM `t` WHERE `ts` BETWEEN 1704067200 AND 1704153600");
        assert_eq!(to_unix_time(&Value::Int(5)), Value::Int(5));
        assert_eq!(to_unix_time(&Value::Text("abc".into())), Value::Text("abc".into()));
    }

    #[test]
    fn count_only_drops_sort_and_pagination() {
        let columns = cols(&["a"]);
        let filters = vec![
            Filter::on("a")
                .at_least(2i64)
                .sort_by("a", SortDirection::Desc)
                .limit(1),
        ];
        let sql = Select::new(Dialect::SqlServer, "t")
            .columns(&columns)
            .filters(&filters)
            .count_only(true)
            .to_sql()
            .expect("sql");
        assert_eq!(sql, "SELECT COUNT(*) FROM [t] WHERE [a] >= 2");
    }

    #[test]
    fn sqlserver_pagination_without_sort_gets_neutral_order() {
        let filters = vec![Filter::default().limit(5).offset(10)];
        let sql = Select::new(Dialect::SqlServer, "t").filters(&filters).to_sql().expect("sql");
        assert_eq!(
            sql,
            "SELECT * FROM [t] ORDER BY (SELECT NULL) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident(Dialect::MySql, "a`b"), "`a``b`");
        assert_eq!(quote_ident(Dialect::Postgres, "a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_ident(Dialect::SqlServer, "a]b"), "[a]]b]");
        assert_eq!(literal(Dialect::MySql, &Value::from("it's")), "'it''s'");
        assert_eq!(literal(Dialect::SqlServer, &Value::Bool(true)), "1");
    }

    #[test]
    fn mysql_literals_escape_backslashes() {
        let filters = [Filter::on("name").equals("\\' OR 1=1 -- ")];
        let expected = [
            (Dialect::MySql, "`name` = '\\\\'' OR 1=1 -- '"),
            (Dialect::Postgres, "\"name\" = '\\'' OR 1=1 -- '"),
            (Dialect::SqlServer, "[name] = '\\'' OR 1=1 -- '"),
        ];
        for (dialect, condition) in expected {
            let sql = Select::new(dialect, "users").filters(&filters).to_sql().expect("sql");
            assert!(sql.ends_with(&format!(" WHERE {condition}")), "{sql}");
        }

        let trailing = [Filter::on("path").like("c:\\")];
        let sql = Select::new(Dialect::MySql, "t").filters(&trailing).to_sql().expect("sql");
        assert_eq!(sql, "SELECT * FROM `t` WHERE `path` LIKE 'c:\\\\'");
    }

    #[test]
    fn regex_renders_per_dialect() {
        let filters = [Filter::on("name").regex("^a.*z$")];
        let pg = Select::new(Dialect::Postgres, "t").filters(&filters).to_sql().expect("sql");
        assert_eq!(pg, "SELECT * FROM \"t\" WHERE \"name\" ~ '^a.*z$'");
        let mysql = Select::new(Dialect::CloudMySql, "t").filters(&filters).to_sql().expect("sql");
        assert_eq!(mysql, "SELECT * FROM `t` WHERE `name` REGEXP '^a.*z$'");

        let err = Select::new(Dialect::SqlServer, "t")
            .filters(&filters)
            .to_sql()
            .expect_err("no regex operator");
        assert!(matches!(err, DbError::Validation(_)));
        assert!(err.to_string().contains("sqlserver"));
    }

    #[test]
    fn missing_table_is_a_validation_error() {
        let err = Select::new(Dialect::MySql, " ").to_sql().expect_err("no table");
        assert!(matches!(err, DbError::Validation(_)));
    }

    proptest! {
        #[test]
        fn clauses_keep_their_order(
            column in "[a-z]{1,8}",
            value in "[a-z0-9 ]{0,8}",
            limit in proptest::option::of(1u64..500),
            offset in proptest::option::of(0u64..500),
            dialect_index in 0usize..3,
        ) {
            let dialect = DIALECTS[dialect_index];
            let mut filter = Filter::on(column.clone())
                .equals(value)
                .sort_by(column.clone(), SortDirection::Desc);
            filter.limit = limit;
            filter.offset = offset;
            let filters = [filter];
            let sql = Select::new(dialect, "items").filters(&filters).to_sql().expect("sql");

            let quoted = quote_ident(dialect, &column);
            let prefix = format!("SELECT * FROM {}", quote_ident(dialect, "items"));
            prop_assert!(sql.starts_with(&prefix));
            let where_at = sql.find(" WHERE ").expect("where");
            let order_at = sql.find(" ORDER BY ").expect("order");
            prop_assert!(where_at < order_at);
            let where_prefix = format!(" WHERE {quoted} = ");
            prop_assert!(sql[where_at..].starts_with(&where_prefix));
            if limit.is_some() || offset.is_some() {
                let page = ["LIMIT", "OFFSET"]
                    .iter()
                    .filter_map(|kw| sql.rfind(kw))
                    .min()
                    .expect("pagination");
                prop_assert!(order_at < page);
            }
        }
    }
}
