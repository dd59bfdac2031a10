//! Batch HTTP transport to the remote dispatch endpoint.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::runtime::{Builder, Handle, Runtime};

use sqlfan_db::{SettingsStore, TaskRequest, TaskResponse};

use crate::error::FanOutError;

/// Per-request outcome inside a batch that reached the endpoint: the decoded
/// response, or why this one request produced none.
pub type Delivery = Result<TaskResponse, String>;

/// Issues many requests at once and hands back every response together,
/// aligned with the request list.
pub trait Transport {
    /// Fails as a whole when the endpoint cannot be reached.
    fn send_all(&self, requests: &[TaskRequest]) -> Result<Vec<Delivery>, FanOutError>;

    fn send(&self, request: &TaskRequest) -> Result<Delivery, FanOutError> {
        self.send_all(std::slice::from_ref(request))?
            .pop()
            .ok_or_else(|| FanOutError::Transport("transport returned no response".to_string()))
    }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// JSON over HTTP POST. Owns a single-threaded runtime, so it must be
/// called from synchronous code; calls made inside a tokio runtime fail
/// with [`FanOutError::Transport`].
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    /// Taken only on drop.
    runtime: Option<Runtime>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, FanOutError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, FanOutError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FanOutError::Transport(err.to_string()))?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| FanOutError::Transport(err.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
            runtime: Some(runtime),
        })
    }

    /// Uses the endpoint URL recorded in the settings store.
    pub fn from_settings(settings: &dyn SettingsStore) -> Result<Self, FanOutError> {
        let url = settings
            .endpoint_url()
            .map_err(|err| FanOutError::Transport(err.to_string()))?
            .filter(|url| !url.is_empty())
            .ok_or(FanOutError::NotConfigured)?;
        Self::new(url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

async fn post(
    client: reqwest::Client,
    url: String,
    body: Vec<u8>,
) -> Result<Delivery, reqwest::Error> {
    let response = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Ok(Err(format!("endpoint answered {status}: {text}")));
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes).map_err(|err| format!("undecodable response: {err}")))
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        // A blocking shutdown panics when dropped from async code.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Transport for HttpTransport {
    fn send_all(&self, requests: &[TaskRequest]) -> Result<Vec<Delivery>, FanOutError> {
        if Handle::try_current().is_ok() {
            return Err(FanOutError::Transport(
                "HttpTransport cannot block inside an async runtime".to_string(),
            ));
        }
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| FanOutError::Transport("transport runtime is gone".to_string()))?;
        let bodies = requests
            .iter()
            .map(serde_json::to_vec)
            .collect::<Result<Vec<_>, _>>()?;
        runtime.block_on(async {
            let handles: Vec<_> = bodies
                .into_iter()
                .map(|body| tokio::spawn(post(self.client.clone(), self.url.clone(), body)))
                .collect();
            let mut deliveries = Vec::with_capacity(handles.len());
            let mut failure = None;
            for handle in handles {
                match handle.await {
                    Ok(Ok(delivery)) => deliveries.push(delivery),
                    Ok(Err(err)) => {
                        failure.get_or_insert_with(|| err.to_string());
                    }
                    Err(err) => {
                        failure.get_or_insert_with(|| err.to_string());
                    }
                }
            }
            match failure {
                Some(message) => Err(FanOutError::Transport(message)),
                None => Ok(deliveries),
            }
        })
    }
}
