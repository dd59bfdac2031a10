//! Transports for exercising the fan-out paths without a network.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::json;

use sqlfan_db::{
    ConnectionConfig, ConnectionContext, MemorySettings, SqliteDriver, TaskRequest, TaskResponse,
};
use sqlfan_worker::Endpoint;

use crate::error::FanOutError;
use crate::transport::{Delivery, Transport};

pub(crate) fn context() -> ConnectionContext {
    ConnectionConfig::new("mysql", "localhost", "app")
        .validate()
        .expect("context")
}

#[derive(Default)]
struct Script {
    sent: Vec<TaskRequest>,
    failed_deliveries: Vec<(usize, String)>,
    result: serde_json::Value,
    remote_error: Option<String>,
    transport_error: Option<String>,
}

/// Records requests and answers each with a canned success.
pub(crate) struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub(crate) fn echo() -> Self {
        Self::returning(json!(true))
    }

    pub(crate) fn returning(result: serde_json::Value) -> Self {
        Self {
            script: Mutex::new(Script {
                result,
                ..Script::default()
            }),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(Script {
                transport_error: Some(message.to_string()),
                ..Script::default()
            }),
        }
    }

    /// Every response carries `message` as its remote error.
    pub(crate) fn answer_with_error(&self, message: &str) {
        self.script.lock().expect("script").remote_error = Some(message.to_string());
    }

    pub(crate) fn fail_delivery(&self, index: usize, message: &str) {
        self.script
            .lock()
            .expect("script")
            .failed_deliveries
            .push((index, message.to_string()));
    }

    pub(crate) fn sent(&self) -> Vec<TaskRequest> {
        self.script.lock().expect("script").sent.clone()
    }
}

impl Transport for ScriptedTransport {
    fn send_all(&self, requests: &[TaskRequest]) -> Result<Vec<Delivery>, FanOutError> {
        let mut script = self.script.lock().expect("script");
        if let Some(message) = &script.transport_error {
            return Err(FanOutError::Transport(message.clone()));
        }
        script.sent.extend(requests.iter().cloned());
        let deliveries = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                let failed = script.failed_deliveries.iter().find(|(i, _)| *i == index);
                if let Some((_, message)) = failed {
                    return Err(message.clone());
                }
                let (function, arguments, tag) =
                    (request.function.clone(), request.arguments.clone(), request.tag.clone());
                Ok(match &script.remote_error {
                    Some(message) => {
                        TaskResponse::failed(function, arguments, tag, message.clone())
                    }
                    None => {
                        TaskResponse::succeeded(function, arguments, tag, script.result.clone())
                    }
                })
            })
            .collect();
        Ok(deliveries)
    }
}

/// Hands every request straight to an in-process endpoint over SQLite.
pub(crate) struct LoopbackTransport {
    endpoint: Endpoint,
}

impl LoopbackTransport {
    pub(crate) fn new(dir: &Path) -> Self {
        Self {
            endpoint: Endpoint::new(
                Arc::new(SqliteDriver::new(dir)),
                Arc::new(MemorySettings::default()),
            ),
        }
    }
}

impl Transport for LoopbackTransport {
    fn send_all(&self, requests: &[TaskRequest]) -> Result<Vec<Delivery>, FanOutError> {
        requests
            .iter()
            .map(|request| {
                let body = serde_json::to_vec(request)?;
                Ok(Ok(self.endpoint.handle_bytes(&body)))
            })
            .collect()
    }
}
