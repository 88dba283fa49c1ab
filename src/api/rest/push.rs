use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use crate::error::AppError;
use crate::state::AppState;
use crate::worker::WorkerEvent;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/push", post(deliver_push))
        .route("/push/test", post(request_test_push))
        .route("/notifications/:tag/click", post(click_notification))
}

/// Push service delivery endpoint. The body is handed to the worker as is.
async fn deliver_push(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    enqueue(&state, WorkerEvent::Push(body.to_vec())).await
}

async fn click_notification(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Result<StatusCode, AppError> {
    enqueue(&state, WorkerEvent::NotificationClick { tag }).await
}

async fn request_test_push(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.backend.request_test_push().await?;
    Ok(StatusCode::ACCEPTED)
}

async fn enqueue(state: &AppState, event: WorkerEvent) -> Result<StatusCode, AppError> {
    state
        .worker_tx
        .send(event)
        .await
        .map_err(|_| AppError::Internal("background worker is not running".to_string()))?;
    Ok(StatusCode::ACCEPTED)
}
