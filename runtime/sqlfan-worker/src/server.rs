//! HTTP surface: `POST /` dispatches a task, `GET /health` reports liveness.

use std::io;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

use sqlfan_db::TaskResponse;

use crate::diagnostics::HealthResponse;
use crate::endpoint::Endpoint;

pub fn router(endpoint: Arc<Endpoint>) -> Router {
    Router::new()
        .route("/", post(dispatch_task))
        .route("/health", get(health))
        .with_state(endpoint)
}

pub async fn serve(listener: TcpListener, endpoint: Arc<Endpoint>) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "sqlfan worker listening");
    }
    axum::serve(listener, router(endpoint)).await
}

/// The driver is synchronous, so requests run on the blocking pool.
async fn dispatch_task(
    State(endpoint): State<Arc<Endpoint>>,
    body: Bytes,
) -> (StatusCode, Json<TaskResponse>) {
    let handled = tokio::task::spawn_blocking(move || endpoint.handle_bytes(&body)).await;
    match handled {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(err) => {
            tracing::error!(error = %err, "dispatch task aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TaskResponse::failed(
                    String::new(),
                    Vec::new(),
                    None,
                    format!("dispatch task aborted: {err}"),
                )),
            )
        }
    }
}

async fn health(State(endpoint): State<Arc<Endpoint>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        kill_switch: endpoint.kill_switch_engaged(),
    })
}
