use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/window/open", post(open_window))
        .route("/window/close", post(close_window))
        .route("/window/focus", post(focus_window))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowResponse {
    pub window_id: Uuid,
}

async fn open_window(State(state): State<Arc<AppState>>) -> Result<Json<WindowResponse>, AppError> {
    let window_id = state.windows.open().await?;
    Ok(Json(WindowResponse { window_id }))
}

async fn close_window(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    let window = state.clients.primary().ok_or(AppError::NoWindow)?;
    if !state.windows.close(window.id).await {
        return Err(AppError::NoWindow);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Bringing a window to the foreground re-checks the handoff store.
async fn focus_window(State(state): State<Arc<AppState>>) -> Result<Json<WindowResponse>, AppError> {
    let window = state.clients.primary().ok_or(AppError::NoWindow)?;
    if !state.clients.focus(&window).await {
        return Err(AppError::NoWindow);
    }
    Ok(Json(WindowResponse {
        window_id: window.id,
    }))
}
