//! The allow-listed operations over one connection manager.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::compile::Select;
use crate::config::ConnectionContext;
use crate::driver::{Driver, RowSet};
use crate::error::DbError;
use crate::filter::Filters;
use crate::loader::{self, LoadCell, LoadOptions};
use crate::manager::ConnectionManager;
use crate::reader::{self, QueryOutput, ReadShape};
use crate::wire::Operation;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadOptions {
    pub database: Option<String>,
    pub shape: ReadShape,
    pub count_only: bool,
}

/// Database operations for one execution context.
///
/// Every operation honours the context flags: `show_logs` logs the SQL it
/// runs, `show_timing` logs elapsed time, and `mute_exceptions` turns a
/// failure into a warning plus the operation's empty result.
pub struct Database {
    manager: ConnectionManager,
}

impl Database {
    pub fn new(context: ConnectionContext, driver: Arc<dyn Driver>) -> Self {
        Self {
            manager: ConnectionManager::new(context, driver),
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        self.manager.context()
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn close(&mut self) {
        self.manager.close();
    }

    fn run<T>(
        &mut self,
        operation: Operation,
        muted: impl FnOnce() -> T,
        body: impl FnOnce(&mut Self) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let started = Instant::now();
        let outcome = body(self);
        if self.context().show_timing() {
            tracing::info!(
                operation = %operation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome.is_ok(),
                "operation finished"
            );
        }
        match outcome {
            Err(err) if self.context().mute_exceptions() => {
                tracing::warn!(operation = %operation, error = %err, "muted operation error");
                Ok(muted())
            }
            other => other,
        }
    }

    fn log_sql(&self, sql: &str) {
        if self.context().show_logs() {
            tracing::info!(sql, "executing");
        }
    }

    /// Runs any statement; `true` when it produced a result set.
    pub fn execute(&mut self, sql: &str) -> Result<bool, DbError> {
        self.run(Operation::Execute, || false, |db| {
            db.log_sql(sql);
            Ok(db.manager.connection(None)?.execute(sql)?)
        })
    }

    pub fn execute_query(&mut self, sql: &str) -> Result<RowSet, DbError> {
        self.run(Operation::ExecuteQuery, RowSet::default, |db| {
            db.log_sql(sql);
            Ok(db.manager.connection(None)?.query(sql)?)
        })
    }

    pub fn execute_update(&mut self, sql: &str) -> Result<u64, DbError> {
        self.run(Operation::ExecuteUpdate, || 0, |db| {
            db.log_sql(sql);
            Ok(db.manager.connection(None)?.execute_update(sql)?)
        })
    }

    /// Self-healing read of arbitrary SQL.
    pub fn query_database(&mut self, sql: &str, shape: ReadShape) -> Result<QueryOutput, DbError> {
        self.run(Operation::QueryDatabase, || QueryOutput::empty(shape), |db| {
            db.log_sql(sql);
            let conn = db.manager.connection(None)?;
            Ok(reader::read(conn, sql, shape))
        })
    }

    /// Loads a single row.
    pub fn insert_into<C: LoadCell>(
        &mut self,
        table: &str,
        columns: &[String],
        row: Vec<C>,
        options: &LoadOptions,
    ) -> Result<bool, DbError> {
        self.run(Operation::InsertInto, || false, |db| {
            db.load(table, columns, &[row], options)
        })
    }

    /// Compiles `filters` against `table` and reads the result.
    pub fn retrieve_data_from_db(
        &mut self,
        table: &str,
        columns: &[String],
        filters: &Filters,
        options: &ReadOptions,
    ) -> Result<QueryOutput, DbError> {
        self.run(
            Operation::RetrieveDataFromDb,
            || QueryOutput::empty(options.shape),
            |db| db.retrieve(table, columns, filters, options),
        )
    }

    pub fn get_table_as_object(
        &mut self,
        table: &str,
        columns: &[String],
        filters: &Filters,
    ) -> Result<QueryOutput, DbError> {
        let options = ReadOptions {
            shape: ReadShape::Objects,
            ..ReadOptions::default()
        };
        self.run(
            Operation::GetTableAsObject,
            || QueryOutput::empty(ReadShape::Objects),
            |db| db.retrieve(table, columns, filters, &options),
        )
    }

    pub fn get_table_as_array(
        &mut self,
        table: &str,
        columns: &[String],
        filters: &Filters,
    ) -> Result<QueryOutput, DbError> {
        let options = ReadOptions::default();
        self.run(
            Operation::GetTableAsArray,
            || QueryOutput::empty(ReadShape::Arrays),
            |db| db.retrieve(table, columns, filters, &options),
        )
    }

    pub fn insert_array_to_db_table<C: LoadCell>(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<C>],
        options: &LoadOptions,
    ) -> Result<bool, DbError> {
        self.run(Operation::InsertArrayToDbTable, || false, |db| {
            db.load(table, columns, rows, options)
        })
    }

    fn retrieve(
        &mut self,
        table: &str,
        columns: &[String],
        filters: &Filters,
        options: &ReadOptions,
    ) -> Result<QueryOutput, DbError> {
        let sql = Select::new(self.context().dialect(), table)
            .columns(columns)
            .filters(filters.as_slice())
            .count_only(options.count_only)
            .to_sql()?;
        self.log_sql(&sql);
        let conn = self.manager.connection(options.database.as_deref())?;
        Ok(reader::read(conn, &sql, options.shape))
    }

    /// Bulk loads run on a dedicated connection, closed on every exit path.
    fn load<C: LoadCell>(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<C>],
        options: &LoadOptions,
    ) -> Result<bool, DbError> {
        let dialect = self.context().dialect();
        let sql = loader::insert_sql(dialect, table, columns, options.upsert)?;
        self.log_sql(&sql);
        let mut conn = self.manager.open_dedicated(options.database.as_deref())?;
        loader::load(conn.as_mut(), dialect, table, columns, rows, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, SortDirection};
    use crate::testing::{ScriptedDriver, mysql_context, rows, unknown_column};
    use crate::value::Value;

    fn database(driver: &ScriptedDriver) -> Database {
        Database::new(mysql_context(), Arc::new(driver.clone()))
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn retrieve_compiles_filters_for_the_context_dialect() {
        let driver = ScriptedDriver::new();
        driver.push_query(Ok(rows(&["id"], vec![vec![Value::Int(1)]])));
        let mut db = database(&driver);
        let filters = Filters::from(
            Filter::on("name").equals("x").sort_by("id", SortDirection::Desc).limit(3),
        );
        let options = ReadOptions {
            database: Some("reporting".into()),
            ..ReadOptions::default()
        };

        let output = db
            .retrieve_data_from_db("people", &columns(&["id"]), &filters, &options)
            .expect("read");
        assert_eq!(output.len(), 1);
        assert_eq!(
            driver.statements(),
            vec!["SELECT `id` FROM `people` WHERE `name` = 'x' ORDER BY `id` DESC LIMIT 3 OFFSET 0"]
        );
        assert_eq!(driver.connects(), vec!["reporting".to_string()]);
    }

    #[test]
    fn table_as_object_heals_stale_columns() {
        let driver = ScriptedDriver::new();
        driver.push_query(Err(unknown_column("legacy")));
        driver.push_query(Ok(rows(&["id"], vec![vec![Value::Int(1)]])));
        let mut db = database(&driver);

        let output = db
            .get_table_as_object("people", &columns(&["id", "legacy"]), &Filters::default())
            .expect("read");
        assert!(matches!(output, QueryOutput::Objects(ref objects) if objects.len() == 1));
        assert_eq!(driver.statements()[1], "SELECT `id` FROM `people`");
    }

    #[test]
    fn bulk_load_uses_and_releases_a_dedicated_connection() {
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        db.execute("SELECT 1").expect("warm cache");

        let rows = vec![vec![Value::Int(1), Value::from("a")]];
        let options = LoadOptions::default();
        let ok = db
            .insert_array_to_db_table("people", &columns(&["id", "name"]), &rows, &options)
            .expect("load");
        assert!(ok);
        assert_eq!(driver.open_connections(), 1);
        assert_eq!(db.manager().bound_database(), Some("app"));
        assert_eq!(driver.commits(), 1);
    }

    #[test]
    fn validation_errors_propagate_unless_muted() {
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        let err = db
            .insert_into::<Value>("people", &[], vec![], &LoadOptions::default())
            .expect_err("no columns");
        assert!(matches!(err, DbError::Validation(_)));

        let context = mysql_context().with_mute_exceptions(true);
        let mut muted = Database::new(context, Arc::new(driver.clone()));
        let ok = muted
            .insert_into::<Value>("people", &[], vec![], &LoadOptions::default())
            .expect("muted");
        assert!(!ok);
        let output = muted
            .get_table_as_object("", &[], &Filters::default())
            .expect("muted read");
        assert_eq!(output, QueryOutput::Objects(Vec::new()));
    }

    #[test]
    fn execute_variants_use_the_cached_connection() {
        let driver = ScriptedDriver::new();
        driver.push_query(Ok(rows(&["n"], vec![vec![Value::Int(2)]])));
        let mut db = database(&driver);
        assert!(db.execute("SELECT 1").expect("execute"));
        assert_eq!(db.execute_query("SELECT 2 AS n").expect("query").rows.len(), 1);
        assert_eq!(db.execute_update("DELETE FROM t").expect("update"), 1);
        assert_eq!(db.manager().opened(), 1);
    }
}
