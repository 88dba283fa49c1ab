pub mod duty;
pub mod offers;
pub mod orders;
pub mod push;
pub mod windows;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::engine::view::SessionView;
use crate::engine::{Command, SessionInput};
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(offers::router())
        .merge(orders::router())
        .merge(duty::router())
        .merge(push::router())
        .merge(windows::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/state", get(session_state))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .fallback_service(ServeDir::new("static"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    nurse_id: String,
    windows: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        nurse_id: state.identity.nurse_id.clone(),
        windows: state.clients.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

async fn session_state(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>, AppError> {
    send_command(&state, Command::Snapshot).await.map(Json)
}

/// Runs `command` on the primary window and waits for its updated view.
pub(crate) async fn send_command(state: &AppState, command: Command) -> Result<SessionView, AppError> {
    let window = state.clients.primary().ok_or(AppError::NoWindow)?;
    let (reply, response) = oneshot::channel();

    window
        .inbox
        .send(SessionInput::Command(command, reply))
        .await
        .map_err(|_| AppError::NoWindow)?;

    response.await.map_err(|_| AppError::NoWindow)?
}
