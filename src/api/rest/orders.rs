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
    Router::new().route("/order/advance", post(advance_order))
}

/// Moves the active order to its next status.
async fn advance_order(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>, AppError> {
    send_command(&state, Command::Advance).await.map(Json)
}
