use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;

use crate::api::rest::send_command;
use crate::engine::view::SessionView;
use crate::engine::Command;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/offer/accept", post(accept_offer))
        .route("/offer/decline", post(decline_offer))
}

async fn accept_offer(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>, AppError> {
    send_command(&state, Command::Accept).await.map(Json)
}

async fn decline_offer(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>, AppError> {
    send_command(&state, Command::Decline).await.map(Json)
}
