use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::realtime::socketio::{self, Packet};
use crate::realtime::{Connector, FrameSink, FrameStream, RealtimeError};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket.IO client over a websocket. Completes the Engine.IO handshake and
/// the default-namespace connect before handing out frames, then keeps a pump
/// task that answers pings and translates packets to envelopes.
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// `root` is the socket host, e.g. `ws://localhost:3001`.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            url: socketio::endpoint(&root.into()),
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), RealtimeError> {
        let (mut socket, response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| RealtimeError::Connect(err.to_string()))?;
        debug!(url = %self.url, status = %response.status(), "websocket handshake complete");

        timeout(HANDSHAKE_TIMEOUT, handshake(&mut socket))
            .await
            .map_err(|_| RealtimeError::Connect("socket.io handshake timed out".to_string()))??;

        let (out_tx, out_rx) = unbounded::<String>();
        let (in_tx, in_rx) = unbounded::<Result<String, RealtimeError>>();
        tokio::spawn(pump(socket, out_rx, in_tx));

        let sink: FrameSink =
            Box::pin(out_tx.sink_map_err(|err| RealtimeError::Transport(err.to_string())));
        let stream: FrameStream = Box::pin(in_rx);
        Ok((sink, stream))
    }
}

/// Waits for the Engine.IO open packet, joins the default namespace and waits
/// for the server to acknowledge it.
async fn handshake(socket: &mut Socket) -> Result<(), RealtimeError> {
    let mut opened = false;
    while let Some(message) = socket.next().await {
        let text = match message.map_err(|err| RealtimeError::Connect(err.to_string()))? {
            Message::Text(text) => text,
            Message::Close(_) => return Err(RealtimeError::Closed),
            _ => continue,
        };
        match socketio::decode(&text) {
            Ok(Packet::Open) if !opened => {
                opened = true;
                socket
                    .send(Message::Text(socketio::CONNECT.to_string()))
                    .await
                    .map_err(|err| RealtimeError::Connect(err.to_string()))?;
            }
            Ok(Packet::Connected) if opened => return Ok(()),
            Ok(Packet::ConnectError(reason)) => {
                return Err(RealtimeError::Connect(format!("namespace refused: {reason}")));
            }
            Ok(Packet::Ping) => {
                socket
                    .send(Message::Text(socketio::PONG.to_string()))
                    .await
                    .map_err(|err| RealtimeError::Connect(err.to_string()))?;
            }
            Ok(Packet::Close) => return Err(RealtimeError::Closed),
            Ok(_) => {}
            Err(err) => debug!(error = %err, "skipping packet during handshake"),
        }
    }
    Err(RealtimeError::Closed)
}

async fn pump(
    mut socket: Socket,
    mut outbound: UnboundedReceiver<String>,
    inbound: UnboundedSender<Result<String, RealtimeError>>,
) {
    loop {
        tokio::select! {
            frame = outbound.next() => {
                let Some(frame) = frame else {
                    let _ = socket.close(None).await;
                    return;
                };
                let packet = match socketio::encode_event(&frame) {
                    Ok(packet) => packet,
                    Err(err) => {
                        warn!(error = %err, "dropping unencodable frame");
                        continue;
                    }
                };
                if let Err(err) = socket.send(Message::Text(packet)).await {
                    let _ = inbound.unbounded_send(Err(RealtimeError::Transport(err.to_string())));
                    return;
                }
            }
            message = socket.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = inbound.unbounded_send(Err(RealtimeError::Closed));
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        let _ = inbound.unbounded_send(Err(RealtimeError::Transport(err.to_string())));
                        return;
                    }
                };
                match socketio::decode(&text) {
                    Ok(Packet::Ping) => {
                        if let Err(err) = socket.send(Message::Text(socketio::PONG.to_string())).await {
                            let _ = inbound.unbounded_send(Err(RealtimeError::Transport(err.to_string())));
                            return;
                        }
                    }
                    Ok(Packet::Event(envelope)) => {
                        if inbound.unbounded_send(Ok(envelope)).is_err() {
                            let _ = socket.close(None).await;
                            return;
                        }
                    }
                    Ok(Packet::Close) | Ok(Packet::Disconnected) => {
                        let _ = inbound.unbounded_send(Err(RealtimeError::Closed));
                        return;
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "ignoring undecodable socket.io packet"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use futures::{SinkExt, StreamExt};
    use serde_json::Value;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::WebSocketConnector;
    use crate::realtime::Connector;

    /// Plays the Socket.IO server side and reports what the client sent.
    async fn server(socket: WebSocket, seen: mpsc::UnboundedSender<String>) {
        let (mut tx, mut rx) = socket.split();
        tx.send(Message::Text(
            r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#
                .to_string(),
        ))
        .await
        .unwrap();

        while let Some(Ok(message)) = rx.next().await {
            let Message::Text(text) = message else { continue };
            let _ = seen.send(text.clone());
            match text.as_str() {
                "40" => {
                    tx.send(Message::Text(r#"40{"sid":"n1"}"#.to_string())).await.unwrap();
                    tx.send(Message::Text("2".to_string())).await.unwrap();
                }
                "3" => {
                    tx.send(Message::Text(
                        r#"42["order:new",{"orderId":42,"eta":12}]"#.to_string(),
                    ))
                    .await
                    .unwrap();
                }
                _ => {}
            }
        }
    }

    async fn upgrade(
        ws: WebSocketUpgrade,
        seen: mpsc::UnboundedSender<String>,
    ) -> impl IntoResponse {
        ws.on_upgrade(move |socket| server(socket, seen))
    }

    #[tokio::test]
    async fn speaks_socket_io_over_the_websocket() {
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/socket.io/",
            get(move |ws: WebSocketUpgrade| upgrade(ws, seen_tx.clone())),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let connector = WebSocketConnector::new(format!("ws://{addr}"));
        let (mut sink, mut stream) = connector.connect().await.unwrap();

        let frame = timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let envelope: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope["event"], "order:new");
        assert_eq!(envelope["data"]["orderId"], 42);

        sink.send(r#"{"event":"order:accept","data":{"orderId":"42"}}"#.to_string())
            .await
            .unwrap();

        assert_eq!(seen.recv().await.unwrap(), "40");
        assert_eq!(seen.recv().await.unwrap(), "3");
        assert_eq!(
            seen.recv().await.unwrap(),
            r#"42["order:accept",{"orderId":"42"}]"#
        );
    }
}
