//! Closed dispatch table from [`Operation`] to the database facade.

use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use thiserror::Error;

use sqlfan_db::{Cell, Database, DbError, Filters, LoadOptions, Operation, ReadOptions, ReadShape};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{operation}: argument {index} ({name}) {problem}")]
    Argument {
        operation: Operation,
        index: usize,
        name: &'static str,
        problem: String,
    },
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Positional argument decoding for one operation.
struct Args<'a> {
    operation: Operation,
    values: &'a [Json],
}

impl<'a> Args<'a> {
    fn required<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &'static str,
    ) -> Result<T, DispatchError> {
        match self.values.get(index) {
            None | Some(Json::Null) => Err(self.problem(index, name, "is required".to_string())),
            Some(value) => self.decode(index, name, value),
        }
    }

    /// Absent or null arguments take the type's default.
    fn optional<T: DeserializeOwned + Default>(
        &self,
        index: usize,
        name: &'static str,
    ) -> Result<T, DispatchError> {
        match self.values.get(index) {
            None | Some(Json::Null) => Ok(T::default()),
            Some(value) => self.decode(index, name, value),
        }
    }

    fn decode<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &'static str,
        value: &Json,
    ) -> Result<T, DispatchError> {
        T::deserialize(value)
            .map_err(|err| self.problem(index, name, format!("is malformed: {err}")))
    }

    fn problem(&self, index: usize, name: &'static str, problem: String) -> DispatchError {
        DispatchError::Argument {
            operation: self.operation,
            index,
            name,
            problem,
        }
    }
}

/// Invokes `operation` on `db` with positional wire arguments.
///
/// | operation | arguments |
/// |---|---|
/// | `execute`, `executeQuery`, `executeUpdate` | sql |
/// | `queryDatabase` | sql, shape? |
/// | `insertInto` | table, columns, row, options? |
/// | `retrieveDataFromDB` | table, columns?, filters?, options? |
/// | `getTableAsObject`, `getTableAsArray` | table, columns?, filters? |
/// | `insertArrayToDBTable` | table, columns, rows, options? |
pub fn dispatch(
    db: &mut Database,
    operation: Operation,
    arguments: &[Json],
) -> Result<Json, DispatchError> {
    let args = Args {
        operation,
        values: arguments,
    };
    let result = match operation {
        Operation::Execute => {
            let sql: String = args.required(0, "sql")?;
            serde_json::to_value(db.execute(&sql)?)?
        }
        Operation::ExecuteQuery => {
            let sql: String = args.required(0, "sql")?;
            serde_json::to_value(db.execute_query(&sql)?)?
        }
        Operation::ExecuteUpdate => {
            let sql: String = args.required(0, "sql")?;
            serde_json::to_value(db.execute_update(&sql)?)?
        }
        Operation::QueryDatabase => {
            let sql: String = args.required(0, "sql")?;
            let shape: ReadShape = args.optional(1, "shape")?;
            serde_json::to_value(db.query_database(&sql, shape)?)?
        }
        Operation::InsertInto => {
            let table: String = args.required(0, "table")?;
            let columns: Vec<String> = args.required(1, "columns")?;
            let row: Vec<Cell> = args.required(2, "row")?;
            let options: LoadOptions = args.optional(3, "options")?;
            serde_json::to_value(db.insert_into(&table, &columns, row, &options)?)?
        }
        Operation::RetrieveDataFromDb => {
            let table: String = args.required(0, "table")?;
            let columns: Vec<String> = args.optional(1, "columns")?;
            let filters: Filters = args.optional(2, "filters")?;
            let options: ReadOptions = args.optional(3, "options")?;
            serde_json::to_value(db.retrieve_data_from_db(&table, &columns, &filters, &options)?)?
        }
        Operation::GetTableAsObject => {
            let table: String = args.required(0, "table")?;
            let columns: Vec<String> = args.optional(1, "columns")?;
            let filters: Filters = args.optional(2, "filters")?;
            serde_json::to_value(db.get_table_as_object(&table, &columns, &filters)?)?
        }
        Operation::GetTableAsArray => {
            let table: String = args.required(0, "table")?;
            let columns: Vec<String> = args.optional(1, "columns")?;
            let filters: Filters = args.optional(2, "filters")?;
            serde_json::to_value(db.get_table_as_array(&table, &columns, &filters)?)?
        }
        Operation::InsertArrayToDbTable => {
            let table: String = args.required(0, "table")?;
            let columns: Vec<String> = args.required(1, "columns")?;
            let rows: Vec<Vec<Cell>> = args.required(2, "rows")?;
            let options: LoadOptions = args.optional(3, "options")?;
            serde_json::to_value(db.insert_array_to_db_table(&table, &columns, &rows, &options)?)?
        }
    };
    Ok(result)
}
