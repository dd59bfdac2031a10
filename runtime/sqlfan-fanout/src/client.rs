//! Single remote invocations, unwrapped synchronously.

use std::time::Instant;

use serde_json::Value as Json;

use sqlfan_db::{ConnectionContext, Operation, TaskRequest};

use crate::error::FanOutError;
use crate::fanout::{TaskDescriptor, TaskIter, fan_out};
use crate::transport::{HttpTransport, Transport};

/// Runs operations on the remote endpoint under one connection context.
pub struct RemoteClient<T = HttpTransport> {
    transport: T,
    context: ConnectionContext,
}

impl<T: Transport> RemoteClient<T> {
    pub fn new(transport: T, context: ConnectionContext) -> Self {
        Self { transport, context }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// One synchronous remote invocation.
    ///
    /// With `mute_exceptions` set, a failure is logged and `Ok(None)` is
    /// returned in its place.
    pub fn invoke(
        &self,
        operation: Operation,
        arguments: Vec<Json>,
        tag: Option<Json>,
    ) -> Result<Option<Json>, FanOutError> {
        let started = Instant::now();
        let request = TaskRequest::new(operation, arguments, tag, self.context.clone());
        let outcome = self.transport.send(&request).and_then(|delivery| {
            let response = delivery.map_err(|message| FanOutError::Remote {
                operation: operation.name().to_string(),
                message,
            })?;
            match response.error {
                Some(message) => Err(FanOutError::Remote {
                    operation: response.function_name,
                    message,
                }),
                None => Ok(response.result),
            }
        });
        if self.context.show_timing() {
            tracing::info!(
                operation = %operation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome.is_ok(),
                "remote invocation finished"
            );
        }
        match outcome {
            Err(err) if self.context.mute_exceptions() => {
                tracing::warn!(operation = %operation, error = %err, "muted remote error");
                Ok(None)
            }
            other => other,
        }
    }

    /// Fans `tasks` out under this client's context.
    pub fn fan_out(&self, tasks: Vec<TaskDescriptor>) -> Result<TaskIter, FanOutError> {
        fan_out(&self.transport, &self.context, tasks)
    }
}
