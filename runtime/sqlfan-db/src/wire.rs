//! Remote dispatch wire types shared by the fan-out client and the worker.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use crate::config::ConnectionContext;

/// The closed set of operations allowed across the remote boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "execute")]
    Execute,
    #[serde(rename = "executeQuery")]
    ExecuteQuery,
    #[serde(rename = "executeUpdate")]
    ExecuteUpdate,
    #[serde(rename = "queryDatabase")]
    QueryDatabase,
    #[serde(rename = "insertInto")]
    InsertInto,
    #[serde(rename = "retrieveDataFromDB")]
    RetrieveDataFromDb,
    #[serde(rename = "getTableAsObject")]
    GetTableAsObject,
    #[serde(rename = "getTableAsArray")]
    GetTableAsArray,
    #[serde(rename = "insertArrayToDBTable")]
    InsertArrayToDbTable,
}

impl Operation {
    pub const ALL: [Self; 9] = [
        Self::Execute,
        Self::ExecuteQuery,
        Self::ExecuteUpdate,
        Self::QueryDatabase,
        Self::InsertInto,
        Self::RetrieveDataFromDb,
        Self::GetTableAsObject,
        Self::GetTableAsArray,
        Self::InsertArrayToDbTable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::ExecuteQuery => "executeQuery",
            Self::ExecuteUpdate => "executeUpdate",
            Self::QueryDatabase => "queryDatabase",
            Self::InsertInto => "insertInto",
            Self::RetrieveDataFromDb => "retrieveDataFromDB",
            Self::GetTableAsObject => "getTableAsObject",
            Self::GetTableAsArray => "getTableAsArray",
            Self::InsertArrayToDbTable => "insertArrayToDBTable",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation '{0}' is not available for remote dispatch")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| UnknownOperation(name.to_string()))
    }
}

/// `{function, arguments, tag, context}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Json>,
    pub context: ConnectionContext,
}

impl TaskRequest {
    pub fn new(
        operation: Operation,
        arguments: Vec<Json>,
        tag: Option<Json>,
        context: ConnectionContext,
    ) -> Self {
        Self {
            function: operation.name().to_string(),
            arguments,
            tag,
            context,
        }
    }

    pub fn operation(&self) -> Result<Operation, UnknownOperation> {
        self.function.parse()
    }
}

/// `{FunctionName, Arguments, Tag, Result?, Error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskResponse {
    pub function_name: String,
    #[serde(default)]
    pub arguments: Vec<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResponse {
    pub fn succeeded(
        function_name: String,
        arguments: Vec<Json>,
        tag: Option<Json>,
        result: Json,
    ) -> Self {
        Self {
            function_name,
            arguments,
            tag,
            result: Some(result).filter(|value| !value.is_null()),
            error: None,
        }
    }

    pub fn failed(
        function_name: String,
        arguments: Vec<Json>,
        tag: Option<Json>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            function_name,
            arguments,
            tag,
            result: None,
            error: Some(error.into()),
        }
    }

    /// The result, or the remote error message.
    pub fn outcome(&self) -> Result<Option<&Json>, &str> {
        match &self.error {
            Some(error) => Err(error.as_str()),
            None => Ok(self.result.as_ref()),
        }
    }
}
