//! `*_async` counterparts of the database operations, run on the remote
//! endpoint through [`RemoteClient::invoke`].
//!
//! Rows headed for a bulk load are enriched into typed values first so
//! dates and blobs survive the JSON hop. Results travel back as plain JSON:
//! a date read remotely arrives as `Value::Text` in `%Y-%m-%d %H:%M:%S`
//! form and a blob as base64 `Value::Text`, where the local [`Database`]
//! methods return `Value::Date` and `Value::Blob`.
//!
//! [`Database`]: sqlfan_db::Database

use serde::de::DeserializeOwned;
use serde_json::{Value as Json, json};

use sqlfan_db::{
    Filters, LoadOptions, Operation, QueryOutput, ReadOptions, ReadShape, RowSet, TypedValue, Value,
};

use crate::client::RemoteClient;
use crate::error::FanOutError;
use crate::transport::Transport;

impl<T: Transport> RemoteClient<T> {
    /// A muted or empty result decodes to `fallback`.
    fn call<R: DeserializeOwned>(
        &self,
        operation: Operation,
        arguments: Vec<Json>,
        fallback: impl FnOnce() -> R,
    ) -> Result<R, FanOutError> {
        match self.invoke(operation, arguments, None)? {
            Some(result) => Ok(serde_json::from_value(result)?),
            None => Ok(fallback()),
        }
    }

    pub fn execute_async(&self, sql: &str) -> Result<bool, FanOutError> {
        self.call(Operation::Execute, vec![json!(sql)], || false)
    }

    /// Blob and date cells come back as text; see the module docs.
    pub fn execute_query_async(&self, sql: &str) -> Result<RowSet, FanOutError> {
        self.call(Operation::ExecuteQuery, vec![json!(sql)], RowSet::default)
    }

    pub fn execute_update_async(&self, sql: &str) -> Result<u64, FanOutError> {
        self.call(Operation::ExecuteUpdate, vec![json!(sql)], || 0)
    }

    pub fn query_database_async(
        &self,
        sql: &str,
        shape: ReadShape,
    ) -> Result<QueryOutput, FanOutError> {
        self.call(
            Operation::QueryDatabase,
            vec![json!(sql), serde_json::to_value(shape)?],
            || QueryOutput::empty(shape),
        )
    }

    pub fn insert_into_async(
        &self,
        table: &str,
        columns: &[String],
        row: &[Value],
        options: &LoadOptions,
    ) -> Result<bool, FanOutError> {
        let arguments = vec![
            json!(table),
            json!(columns),
            serde_json::to_value(TypedValue::enrich_row(row))?,
            serde_json::to_value(options)?,
        ];
        self.call(Operation::InsertInto, arguments, || false)
    }

    pub fn retrieve_data_from_db_async(
        &self,
        table: &str,
        columns: &[String],
        filters: &Filters,
        options: &ReadOptions,
    ) -> Result<QueryOutput, FanOutError> {
        let arguments = vec![
            json!(table),
            json!(columns),
            serde_json::to_value(filters)?,
            serde_json::to_value(options)?,
        ];
        self.call(Operation::RetrieveDataFromDb, arguments, || {
            QueryOutput::empty(options.shape)
        })
    }

    pub fn get_table_as_object_async(
        &self,
        table: &str,
        columns: &[String],
        filters: &Filters,
    ) -> Result<QueryOutput, FanOutError> {
        let arguments = vec![json!(table), json!(columns), serde_json::to_value(filters)?];
        self.call(Operation::GetTableAsObject, arguments, || {
            QueryOutput::empty(ReadShape::Objects)
        })
    }

    pub fn get_table_as_array_async(
        &self,
        table: &str,
        columns: &[String],
        filters: &Filters,
    ) -> Result<QueryOutput, FanOutError> {
        let arguments = vec![json!(table), json!(columns), serde_json::to_value(filters)?];
        self.call(Operation::GetTableAsArray, arguments, || {
            QueryOutput::empty(ReadShape::Arrays)
        })
    }

    pub fn insert_array_to_db_table_async(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
        options: &LoadOptions,
    ) -> Result<bool, FanOutError> {
        let typed: Vec<Vec<TypedValue>> =
            rows.iter().map(|row| TypedValue::enrich_row(row)).collect();
        let arguments = vec![
            json!(table),
            json!(columns),
            serde_json::to_value(typed)?,
            serde_json::to_value(options)?,
        ];
        self.call(Operation::InsertArrayToDbTable, arguments, || false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LoopbackTransport, context};
    use sqlfan_db::{Filter, SortDirection};

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn bulk_load_and_read_back_through_the_endpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = RemoteClient::new(LoopbackTransport::new(dir.path()), context());
        assert!(!client
            .execute_async("CREATE TABLE files (id INTEGER, body BLOB, seen TEXT)")
            .expect("create"));

        let seen = sqlfan_db::value::parse_datetime("2024-06-01 12:00:00").expect("date");
        let rows = vec![
            vec![Value::Int(1), Value::Blob(vec![0, 159, 146, 150]), Value::Date(seen)],
            vec![Value::Int(2), Value::Null, Value::Null],
        ];
        let names = columns(&["id", "body", "seen"]);
        assert!(client
            .insert_array_to_db_table_async("files", &names, &rows, &LoadOptions::default())
            .expect("load"));

        let stored = client
            .execute_query_async("SELECT typeof(body) AS kind, seen FROM files WHERE id = 1")
            .expect("query");
        assert_eq!(
            stored.rows,
            vec![vec![Value::from("blob"), Value::from("2024-06-01 12:00:00")]]
        );

        let filters = Filters::from(Filter::default().sort_by("id", SortDirection::Desc));
        let output = client
            .get_table_as_array_async("files", &columns(&["id"]), &filters)
            .expect("read");
        assert_eq!(
            output,
            QueryOutput::Arrays {
                columns: columns(&["id"]),
                rows: vec![vec![Value::Int(2)], vec![Value::Int(1)]],
            }
        );

        let raw = client
            .execute_query_async("SELECT body, seen FROM files WHERE id = 1")
            .expect("raw read");
        assert_eq!(
            raw.rows,
            vec![vec![Value::from("AJ+Slg=="), Value::from("2024-06-01 12:00:00")]]
        );
    }

    #[test]
    fn single_row_insert_and_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = RemoteClient::new(LoopbackTransport::new(dir.path()), context());
        client.execute_async("CREATE TABLE t (a INTEGER)").expect("create");
        client
            .insert_into_async("t", &columns(&["a"]), &[Value::Int(9)], &LoadOptions::default())
            .expect("insert");
        let options = ReadOptions {
            count_only: true,
            ..ReadOptions::default()
        };
        let count = client
            .retrieve_data_from_db_async("t", &[], &Filters::default(), &options)
            .expect("count");
        assert_eq!(count.len(), 1);
        assert_eq!(client.execute_update_async("DELETE FROM t").expect("delete"), 1);
    }

    #[test]
    fn muted_failures_decode_to_empty_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = RemoteClient::new(
            LoopbackTransport::new(dir.path()),
            context().with_mute_exceptions(true),
        );
        assert_eq!(client.execute_update_async("DELETE FROM missing").expect("muted"), 0);
        let output = client
            .get_table_as_object_async("missing", &[], &Filters::default())
            .expect("degraded read");
        assert_eq!(output, QueryOutput::Objects(Vec::new()));
    }
}
