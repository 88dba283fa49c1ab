use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};

use crate::engine::view::SessionView;
use crate::error::AppError;
use crate::state::AppState;

/// Streams the primary window's view: the current snapshot first, then one
/// frame per change.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let window = state.clients.primary().ok_or(AppError::NoWindow)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, window.view)))
}

async fn handle_socket(socket: WebSocket, view: watch::Receiver<SessionView>) {
    let (mut sender, mut receiver) = socket.split();
    let mut views = WatchStream::new(view);

    info!("view subscriber connected");

    let send_task = tokio::spawn(async move {
        while let Some(view) = views.next().await {
            let json = match serde_json::to_string(&view) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize session view for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("view subscriber disconnected");
}
