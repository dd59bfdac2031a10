//! Receiving side of remote dispatch.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::Value as Json;

use sqlfan_db::{Database, Driver, SettingsStore, TaskRequest, TaskResponse};

use crate::dispatch::dispatch;

pub const KILL_SWITCH_MESSAGE: &str =
    "Remote dispatch is disabled: the operator kill-switch is engaged. No operation was run.";

/// The fields echoed back even when a request cannot be fully decoded.
#[derive(Default, Deserialize)]
#[serde(default)]
struct Echo {
    function: String,
    arguments: Vec<Json>,
    tag: Option<Json>,
}

pub struct Endpoint {
    driver: Arc<dyn Driver>,
    settings: Arc<dyn SettingsStore>,
}

impl Endpoint {
    pub fn new(driver: Arc<dyn Driver>, settings: Arc<dyn SettingsStore>) -> Self {
        Self { driver, settings }
    }

    /// Settings read failures count as engaged.
    pub fn kill_switch_engaged(&self) -> bool {
        self.settings.kill_switch_engaged().unwrap_or(true)
    }

    /// `Some(message)` when requests must be refused.
    fn refusal(&self) -> Option<String> {
        match self.settings.kill_switch_engaged() {
            Ok(false) => None,
            Ok(true) => Some(KILL_SWITCH_MESSAGE.to_string()),
            Err(err) => {
                tracing::error!(error = %err, "kill-switch state unreadable; refusing request");
                Some(format!("Remote dispatch is unavailable: {err}"))
            }
        }
    }

    /// Decodes and handles one JSON request body.
    pub fn handle_bytes(&self, body: &[u8]) -> TaskResponse {
        let echo: Echo = serde_json::from_slice(body).unwrap_or_default();
        if let Some(message) = self.refusal() {
            return TaskResponse::failed(echo.function, echo.arguments, echo.tag, message);
        }
        match serde_json::from_slice::<TaskRequest>(body) {
            Ok(request) => self.run(request),
            Err(err) => {
                tracing::warn!(error = %err, "rejecting undecodable request");
                TaskResponse::failed(
                    echo.function,
                    echo.arguments,
                    echo.tag,
                    format!("Invalid request: {err}"),
                )
            }
        }
    }

    pub fn handle(&self, request: TaskRequest) -> TaskResponse {
        if let Some(message) = self.refusal() {
            return TaskResponse::failed(request.function, request.arguments, request.tag, message);
        }
        self.run(request)
    }

    fn run(&self, request: TaskRequest) -> TaskResponse {
        let operation = match request.operation() {
            Ok(operation) => operation,
            Err(err) => {
                tracing::warn!(
                    function = %request.function,
                    "rejecting operation outside the allow-list"
                );
                return TaskResponse::failed(
                    request.function,
                    request.arguments,
                    request.tag,
                    err.to_string(),
                );
            }
        };
        let started = Instant::now();
        let TaskRequest {
            function,
            arguments,
            tag,
            context,
        } = request;
        // Fresh context and connection manager per request; nothing is shared.
        let mut db = Database::new(context, Arc::clone(&self.driver));
        let outcome = dispatch(&mut db, operation, &arguments);
        db.close();
        tracing::debug!(
            operation = %operation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "dispatched"
        );
        match outcome {
            Ok(result) => TaskResponse::succeeded(function, arguments, tag, result),
            Err(err) => TaskResponse::failed(function, arguments, tag, err.to_string()),
        }
    }
}
