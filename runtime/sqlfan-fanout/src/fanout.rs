//! Fan-out of many named operations as concurrent remote invocations.
//!
//! Results are materialized before [`TaskIter`] is handed out; the iterator
//! is a cursor that replays them in submission order.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use sqlfan_db::{ConnectionContext, Operation, TaskRequest};

use crate::error::FanOutError;
use crate::transport::Transport;

/// Simultaneous remote invocations per fan-out call. Extra tasks are dropped.
pub const MAX_FAN_OUT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Json>,
}

impl TaskDescriptor {
    pub fn new(operation: Operation, arguments: Vec<Json>) -> Self {
        Self::named(operation.name(), arguments)
    }

    /// A descriptor by wire name; the allow-list is checked at dispatch.
    pub fn named(function: impl Into<String>, arguments: Vec<Json>) -> Self {
        Self {
            function: function.into(),
            arguments,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<Json>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub operation: Operation,
    pub arguments: Vec<Json>,
    pub tag: Option<Json>,
    pub result: Option<Json>,
    pub error: Option<String>,
}

/// One `advance` of a [`TaskIter`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<Json>,
}

impl TaskStep {
    fn finished() -> Self {
        Self {
            index: None,
            done: true,
            error: None,
            value: None,
            operation: None,
            tag: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskIter {
    results: Vec<TaskResult>,
    cursor: usize,
    dropped: usize,
    rejected: usize,
}

impl TaskIter {
    /// Next result in submission order, then `done: true` forever.
    pub fn advance(&mut self) -> TaskStep {
        let Some(result) = self.results.get(self.cursor) else {
            return TaskStep::finished();
        };
        let step = TaskStep {
            index: Some(self.cursor),
            done: false,
            error: result.error.clone(),
            value: result.result.clone(),
            operation: Some(result.operation),
            tag: result.tag.clone(),
        };
        self.cursor += 1;
        step
    }

    /// Rewinds the cursor; results are replayed, never re-executed.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Tasks cut by the [`MAX_FAN_OUT`] ceiling.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Tasks naming an operation outside the allow-list.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Iterator for TaskIter {
    type Item = TaskStep;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.advance();
        (!step.done).then_some(step)
    }
}

/// Dispatches `tasks` concurrently and collects every outcome.
///
/// Per-task failures land on that task's result. A transport failure fails
/// the whole call.
pub fn fan_out<T: Transport + ?Sized>(
    transport: &T,
    context: &ConnectionContext,
    mut tasks: Vec<TaskDescriptor>,
) -> Result<TaskIter, FanOutError> {
    let mut dropped = 0;
    if tasks.len() > MAX_FAN_OUT {
        dropped = tasks.len() - MAX_FAN_OUT;
        tracing::warn!(
            submitted = tasks.len(),
            dropped,
            limit = MAX_FAN_OUT,
            "fan-out exceeds the concurrency ceiling; extra tasks dropped"
        );
        tasks.truncate(MAX_FAN_OUT);
    }

    let submitted = tasks.len();
    let accepted: Vec<(Operation, TaskDescriptor)> = tasks
        .into_iter()
        .filter_map(|task| match task.function.parse::<Operation>() {
            Ok(operation) => Some((operation, task)),
            Err(err) => {
                tracing::warn!(function = %task.function, "{err}; skipping task");
                None
            }
        })
        .collect();
    let rejected = submitted - accepted.len();
    if accepted.is_empty() {
        return Err(FanOutError::NoAvailableMethods);
    }

    let requests: Vec<TaskRequest> = accepted
        .iter()
        .map(|(operation, task)| {
            TaskRequest::new(*operation, task.arguments.clone(), task.tag.clone(), context.clone())
        })
        .collect();
    let deliveries = transport.send_all(&requests)?;
    if deliveries.len() != requests.len() {
        return Err(FanOutError::Transport(format!(
            "expected {} responses, received {}",
            requests.len(),
            deliveries.len()
        )));
    }

    let results = accepted
        .into_iter()
        .zip(deliveries)
        .map(|((operation, task), delivery)| {
            let (result, error) = match delivery {
                Ok(response) => (response.result, response.error),
                Err(message) => (None, Some(message)),
            };
            TaskResult {
                operation,
                arguments: task.arguments,
                tag: task.tag,
                result,
                error,
            }
        })
        .collect();
    tracing::debug!(tasks = requests.len(), "fan-out complete");
    Ok(TaskIter {
        results,
        cursor: 0,
        dropped,
        rejected,
    })
}
