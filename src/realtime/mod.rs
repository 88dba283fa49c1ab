//! Live socket to the dispatch backend.
//!
//! The channel owns the connection lifecycle for one window: it reconnects with
//! exponential backoff, re-registers the nurse and re-joins the active order's
//! room on every connect, forwards inbound events into the window's mailbox and
//! drains the window's outbound queue. It never touches order state itself.

pub mod protocol;
pub mod socketio;
pub mod ws;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::engine::view::SessionView;
use crate::engine::SessionInput;
use crate::models::offer::OfferSource;
use crate::observability::metrics::Metrics;
use crate::realtime::protocol::{Inbound, Outbound};
use crate::session::identity::Identity;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    Closed,
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = RealtimeError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, RealtimeError>> + Send>>;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), RealtimeError>;
}

enum Served {
    /// The window went away; stop reconnecting.
    Shutdown,
}

pub struct RealtimeChannel {
    connector: Arc<dyn Connector>,
    identity: Identity,
    outbound: mpsc::Receiver<Outbound>,
    inbox: mpsc::Sender<SessionInput>,
    view: watch::Receiver<SessionView>,
    reconnect_max: Duration,
    metrics: Metrics,
    unsent: Option<Outbound>,
}

impl RealtimeChannel {
    pub fn new(
        connector: Arc<dyn Connector>,
        identity: Identity,
        outbound: mpsc::Receiver<Outbound>,
        inbox: mpsc::Sender<SessionInput>,
        view: watch::Receiver<SessionView>,
        reconnect_max: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            connector,
            identity,
            outbound,
            inbox,
            view,
            reconnect_max,
            metrics,
            unsent: None,
        }
    }

    pub async fn run(mut self) {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: self.reconnect_max,
            max_elapsed_time: None,
            ..Default::default()
        };

        loop {
            match self.connector.connect().await {
                Ok((sink, stream)) => {
                    backoff.reset();
                    self.metrics.socket_connects_total.inc();
                    info!(nurse_id = %self.identity.nurse_id, "realtime connected");

                    match self.serve(sink, stream).await {
                        Ok(Served::Shutdown) => break,
                        Err(err) => warn!(error = %err, "realtime connection lost"),
                    }

                    if self.inbox.send(SessionInput::Connection(false)).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "realtime connect failed"),
            }

            let delay = backoff.next_backoff().unwrap_or(self.reconnect_max);
            debug!(delay_ms = delay.as_millis() as u64, "realtime reconnect scheduled");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.inbox.closed() => break,
            }
        }

        info!("realtime channel stopped");
    }

    async fn serve(
        &mut self,
        mut sink: FrameSink,
        mut stream: FrameStream,
    ) -> Result<Served, RealtimeError> {
        let register = Outbound::Register {
            nurse_id: self.identity.nurse_id.clone(),
            token: self.identity.token.clone(),
        };
        emit(&mut sink, &register).await?;

        let active_order = self.view.borrow().active_order_id();
        if let Some(order_id) = active_order {
            debug!(order_id = %order_id, "rejoining order room");
            emit(&mut sink, &Outbound::Watch { order_id }).await?;
        }

        if self.inbox.send(SessionInput::Connection(true)).await.is_err() {
            return Ok(Served::Shutdown);
        }

        if let Some(event) = self.unsent.take() {
            self.forward(&mut sink, event).await?;
        }

        loop {
            tokio::select! {
                event = self.outbound.recv() => match event {
                    Some(event) => self.forward(&mut sink, event).await?,
                    None => return Ok(Served::Shutdown),
                },
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        if !self.dispatch(&text).await {
                            return Ok(Served::Shutdown);
                        }
                    }
                    Some(Err(err)) => return Err(err),
                    None => return Err(RealtimeError::Closed),
                },
            }
        }
    }

    /// Sends queued traffic, keeping the event for the next connection if the
    /// socket fails underneath it.
    async fn forward(&mut self, sink: &mut FrameSink, event: Outbound) -> Result<(), RealtimeError> {
        if let Err(err) = emit(sink, &event).await {
            self.unsent = Some(event);
            return Err(err);
        }
        Ok(())
    }

    /// Returns `false` once the window's mailbox is closed.
    async fn dispatch(&self, text: &str) -> bool {
        let input = match Inbound::decode(text) {
            Ok(Inbound::OrderNew(offer)) => SessionInput::Offer(offer, OfferSource::Live),
            Ok(Inbound::OrderTaken { order_id }) => {
                debug!(order_id = order_id.as_deref().unwrap_or("-"), "order taken elsewhere");
                SessionInput::OfferTaken
            }
            Ok(Inbound::OrderUpdated { status }) => SessionInput::OrderUpdated(status),
            Err(err) => {
                warn!(error = %err, "ignoring undecodable realtime frame");
                return true;
            }
        };

        self.inbox.send(input).await.is_ok()
    }
}

async fn emit(sink: &mut FrameSink, event: &Outbound) -> Result<(), RealtimeError> {
    let frame = match event.encode() {
        Ok(frame) => frame,
        Err(err) => {
            warn!(error = %err, event = event.name(), "failed to encode realtime event");
            return Ok(());
        }
    };

    sink.send(frame).await?;
    debug!(event = event.name(), "realtime event emitted");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
    use futures::{SinkExt, StreamExt};

    use super::{Connector, FrameSink, FrameStream, RealtimeError};

    /// Server side of one scripted connection.
    pub struct ServerEnd {
        pub received: UnboundedReceiver<String>,
        pub push: UnboundedSender<Result<String, RealtimeError>>,
    }

    /// Hands out pre-built connections in order, then refuses.
    #[derive(Default)]
    pub struct ScriptedConnector {
        pending: Mutex<VecDeque<(FrameSink, FrameStream)>>,
    }

    impl ScriptedConnector {
        pub fn add_connection(&self) -> ServerEnd {
            let (client_tx, server_rx) = unbounded::<String>();
            let (server_tx, client_rx) = unbounded::<Result<String, RealtimeError>>();

            let sink: FrameSink =
                Box::pin(client_tx.sink_map_err(|err| RealtimeError::Transport(err.to_string())));
            let stream: FrameStream = Box::pin(client_rx);
            self.pending.lock().unwrap().push_back((sink, stream));

            ServerEnd {
                received: server_rx,
                push: server_tx,
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> Result<(FrameSink, FrameStream), RealtimeError> {
            self.pending
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| RealtimeError::Connect("no scripted connection".to_string()))
        }
    }

    pub async fn next_event(server: &mut ServerEnd) -> serde_json::Value {
        let frame = server.received.next().await.expect("connection closed");
        serde_json::from_str(&frame).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{mpsc, watch};

    use super::testing::{next_event, ScriptedConnector};
    use super::RealtimeChannel;
    use crate::engine::view::SessionView;
    use crate::engine::SessionInput;
    use crate::models::offer::{Offer, OfferSource};
    use crate::models::order::{ActiveOrder, OrderStatus};
    use crate::observability::metrics::Metrics;
    use crate::realtime::protocol::Outbound;
    use crate::session::identity::Identity;

    fn identity() -> Identity {
        Identity {
            nurse_id: "N1".to_string(),
            token: "tok".to_string(),
        }
    }

    fn view_with_order(order_id: &str) -> SessionView {
        let offer = Offer::from_value(serde_json::json!({ "orderId": order_id })).unwrap();
        SessionView {
            active_order: Some(ActiveOrder::from(offer)),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_rejoins_the_active_order_before_other_traffic() {
        let connector = Arc::new(ScriptedConnector::default());
        let mut first = connector.add_connection();
        let mut second = connector.add_connection();

        let (out_tx, out_rx) = mpsc::channel(16);
        let (inbox_tx, mut inbox_rx) = mpsc::channel(16);
        let (_view_tx, view_rx) = watch::channel(view_with_order("O1"));

        let channel = RealtimeChannel::new(
            connector.clone(),
            identity(),
            out_rx,
            inbox_tx,
            view_rx,
            Duration::from_secs(30),
            Metrics::new(),
        );
        let task = tokio::spawn(channel.run());

        assert_eq!(next_event(&mut first).await["event"], "nurse:register");
        let rejoin = next_event(&mut first).await;
        assert_eq!(rejoin["event"], "order:watch");
        assert_eq!(rejoin["data"]["orderId"], "O1");
        assert!(matches!(inbox_rx.recv().await, Some(SessionInput::Connection(true))));

        drop(first);
        out_tx
            .send(Outbound::Location {
                order_id: "O1".to_string(),
                lat: 41.3,
                lng: 69.2,
                speed: Some(12.5),
            })
            .await
            .unwrap();

        assert!(matches!(inbox_rx.recv().await, Some(SessionInput::Connection(false))));

        let register = next_event(&mut second).await;
        assert_eq!(register["event"], "nurse:register");
        assert_eq!(register["data"]["nurseId"], "N1");
        assert_eq!(next_event(&mut second).await["event"], "order:watch");
        let location = next_event(&mut second).await;
        assert_eq!(location["event"], "nurse:location");
        assert_eq!(location["data"]["speed"], 12.5);

        task.abort();
    }

    #[tokio::test]
    async fn inbound_events_are_routed_to_the_mailbox() {
        let connector = Arc::new(ScriptedConnector::default());
        let mut server = connector.add_connection();

        let (_out_tx, out_rx) = mpsc::channel(16);
        let (inbox_tx, mut inbox_rx) = mpsc::channel(16);
        let (_view_tx, view_rx) = watch::channel(SessionView::default());

        let channel = RealtimeChannel::new(
            connector.clone(),
            identity(),
            out_rx,
            inbox_tx,
            view_rx,
            Duration::from_secs(30),
            Metrics::new(),
        );
        let task = tokio::spawn(channel.run());

        assert_eq!(next_event(&mut server).await["event"], "nurse:register");
        assert!(matches!(inbox_rx.recv().await, Some(SessionInput::Connection(true))));

        for frame in [
            r#"{"event":"order:new","data":{"orderId":"O1","eta":12,"distance":3.4}}"#,
            r#"{"event":"bogus"}"#,
            r#"{"event":"order:taken"}"#,
            r#"{"event":"order:new","data":{"orderId":42,"service":null,"client":null}}"#,
            r#"{"event":"order:taken","data":{"orderId":"42"}}"#,
            r#"{"event":"order:updated","data":{"status":"completed"}}"#,
        ] {
            server.push.unbounded_send(Ok(frame.to_string())).unwrap();
        }

        match inbox_rx.recv().await {
            Some(SessionInput::Offer(offer, OfferSource::Live)) => assert_eq!(offer.order_id, "O1"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(inbox_rx.recv().await, Some(SessionInput::OfferTaken)));
        match inbox_rx.recv().await {
            Some(SessionInput::Offer(offer, OfferSource::Live)) => assert_eq!(offer.order_id, "42"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(inbox_rx.recv().await, Some(SessionInput::OfferTaken)));
        assert!(matches!(
            inbox_rx.recv().await,
            Some(SessionInput::OrderUpdated(OrderStatus::Completed))
        ));

        task.abort();
    }
}
