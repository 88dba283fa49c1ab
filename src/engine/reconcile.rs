//! Per-window reconciliation of incoming offers.
//!
//! A [`Session`] is the single consumer of a window's mailbox. The live socket,
//! the background worker and the handoff store all feed offers into it; it
//! decides which offer is pending, runs the acceptance countdown and the
//! alert, and owns the accepted order from then on.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::alert::AlertEngine;
use crate::config::Config;
use crate::engine::telemetry;
use crate::engine::view::{PendingView, SessionView};
use crate::error::AppError;
use crate::geo::PositionSample;
use crate::handoff::{HandoffRead, HandoffStore};
use crate::models::offer::{Offer, OfferSource};
use crate::models::order::{ActiveOrder, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::realtime::protocol::{ExpiryReason, Outbound};
use crate::session::{today, PersistedSession, SessionStore};
use crate::worker::clients::ClientMessage;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Accept,
    Decline,
    Advance,
    /// Reads the view once every earlier input has been applied.
    Snapshot,
}

pub type Reply = oneshot::Sender<Result<SessionView, AppError>>;

#[derive(Debug)]
pub enum SessionInput {
    Offer(Offer, OfferSource),
    OfferTaken,
    OrderUpdated(OrderStatus),
    Connection(bool),
    Message(ClientMessage),
    Focus,
    Command(Command, Reply),
    Close,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub live_countdown: Duration,
    pub handoff_countdown: Duration,
    pub notify_expiry: bool,
    pub speed_window: usize,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            live_countdown: config.live_countdown,
            handoff_countdown: config.handoff_countdown,
            notify_expiry: config.notify_expiry,
            speed_window: config.speed_window,
        }
    }
}

/// Collaborators a session drives.
pub struct SessionIo {
    pub alert: AlertEngine,
    pub handoff: HandoffStore,
    pub store: SessionStore,
    pub outbound: mpsc::Sender<Outbound>,
    pub positions: broadcast::Sender<PositionSample>,
    pub metrics: Metrics,
}

struct Pending {
    offer: Offer,
    remaining: u32,
    source: OfferSource,
    next_tick: Instant,
}

pub struct Session {
    settings: SessionSettings,
    persisted: PersistedSession,
    pending: Option<Pending>,
    connected: bool,
    io: SessionIo,
    telemetry: Option<JoinHandle<()>>,
    view: watch::Sender<SessionView>,
}

impl Session {
    /// Builds a session from the snapshot loaded at window start.
    pub fn new(
        settings: SessionSettings,
        persisted: PersistedSession,
        io: SessionIo,
    ) -> (Self, watch::Receiver<SessionView>) {
        let (view, view_rx) = watch::channel(SessionView::default());
        let mut session = Self {
            settings,
            persisted,
            pending: None,
            connected: false,
            io,
            telemetry: None,
            view,
        };
        session.publish();
        (session, view_rx)
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<SessionInput>) {
        self.start().await;

        loop {
            let deadline = self.pending.as_ref().map(|pending| pending.next_tick);
            let input = tokio::select! {
                input = inbox.recv() => input,
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tick();
                    continue;
                }
            };

            match input {
                Some(SessionInput::Close) | None => break,
                Some(input) => self.handle(input).await,
            }
        }

        self.shutdown();
        info!("window session closed");
    }

    /// Resumes telemetry for a persisted order and checks the handoff store.
    pub async fn start(&mut self) {
        if let Some(order) = &self.persisted.active_order {
            info!(
                order_id = %order.order_id,
                status = self.persisted.order_status.as_str(),
                "resuming active order"
            );
        }
        self.sync_telemetry();
        self.check_handoff().await;
        self.publish();
    }

    pub fn shutdown(&mut self) {
        self.io.alert.stop();
        if let Some(task) = self.telemetry.take() {
            task.abort();
        }
    }

    pub async fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::Offer(offer, source) => self.offer_arrived(offer, source),
            SessionInput::OfferTaken => self.offer_taken(),
            SessionInput::OrderUpdated(status) => self.order_updated(status).await,
            SessionInput::Connection(connected) => {
                self.connected = connected;
                self.publish();
            }
            SessionInput::Message(ClientMessage::OrderIncoming { payload }) => {
                self.offer_payload(payload, OfferSource::WorkerMessage)
            }
            SessionInput::Focus => self.check_handoff().await,
            SessionInput::Command(command, reply) => {
                let result = match command {
                    Command::Accept => self.accept().await,
                    Command::Decline => self.decline(),
                    Command::Advance => self.advance().await,
                    Command::Snapshot => Ok(()),
                };
                let _ = reply.send(result.map(|()| self.snapshot()));
            }
            SessionInput::Close => self.shutdown(),
        }
    }

    /// Entry point shared by every delivery path.
    pub fn offer_arrived(&mut self, offer: Offer, source: OfferSource) {
        let order_id = offer.order_id.clone();

        if self.pending.as_ref().is_some_and(|p| p.offer.order_id == order_id) {
            debug!(order_id = %order_id, source = %source, "duplicate offer ignored");
            return;
        }
        if self
            .persisted
            .active_order
            .as_ref()
            .is_some_and(|order| order.order_id == order_id)
        {
            debug!(order_id = %order_id, source = %source, "offer already accepted");
            return;
        }

        if let Some(previous) = self.pending.take() {
            info!(order_id = %previous.offer.order_id, "pending offer superseded");
            self.report_expiry(previous.offer.order_id, ExpiryReason::Superseded);
            self.io
                .metrics
                .offers_resolved_total
                .with_label_values(&["superseded"])
                .inc();
        }

        let countdown = source.countdown(self.settings.live_countdown, self.settings.handoff_countdown);
        self.pending = Some(Pending {
            offer,
            remaining: countdown,
            source,
            next_tick: Instant::now() + TICK,
        });
        self.io.alert.play();
        self.io
            .metrics
            .offers_received_total
            .with_label_values(&[source.as_str()])
            .inc();

        info!(order_id = %order_id, source = %source, countdown, "offer pending");
        self.publish();
    }

    fn offer_payload(&mut self, payload: serde_json::Value, source: OfferSource) {
        match Offer::from_value(payload) {
            Ok(offer) => self.offer_arrived(offer, source),
            Err(err) => warn!(error = %err, source = %source, "ignoring malformed offer payload"),
        }
    }

    pub async fn check_handoff(&mut self) {
        let read = self.io.handoff.read_and_clear().await;
        self.io
            .metrics
            .handoff_reads_total
            .with_label_values(&[read.label()])
            .inc();

        if let HandoffRead::Fresh(payload) = read {
            self.offer_payload(payload, OfferSource::Handoff);
        }
    }

    /// One countdown step. Reaching zero drops the offer without declining it.
    pub fn tick(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        pending.remaining = pending.remaining.saturating_sub(1);
        pending.next_tick += TICK;

        if pending.remaining == 0 {
            self.io.alert.stop();
            if let Some(expired) = self.pending.take() {
                info!(order_id = %expired.offer.order_id, "offer expired");
                self.report_expiry(expired.offer.order_id, ExpiryReason::Timeout);
                self.io
                    .metrics
                    .offers_resolved_total
                    .with_label_values(&["expired"])
                    .inc();
            }
        }
        self.publish();
    }

    pub async fn accept(&mut self) -> Result<(), AppError> {
        let Some(pending) = self.pending.as_ref() else {
            return Ok(());
        };
        if let Some(active) = &self.persisted.active_order {
            return Err(AppError::Conflict(format!(
                "order {} is still in progress",
                active.order_id
            )));
        }

        let order_id = pending.offer.order_id.clone();
        self.emit(Outbound::Accept {
            order_id: order_id.clone(),
        })?;
        if let Err(err) = self.emit(Outbound::Watch {
            order_id: order_id.clone(),
        }) {
            warn!(error = %err, order_id = %order_id, "order room will be joined on reconnect");
        }

        self.io.alert.stop();
        if let Some(pending) = self.pending.take() {
            self.persisted.active_order = Some(ActiveOrder::from(pending.offer));
            self.persisted.order_status = OrderStatus::Accepted;
        }
        self.persist().await;
        self.sync_telemetry();
        self.io
            .metrics
            .offers_resolved_total
            .with_label_values(&["accepted"])
            .inc();

        info!(order_id = %order_id, "offer accepted");
        self.publish();
        Ok(())
    }

    pub fn decline(&mut self) -> Result<(), AppError> {
        let Some(pending) = self.pending.as_ref() else {
            return Ok(());
        };

        let order_id = pending.offer.order_id.clone();
        self.emit(Outbound::Decline {
            order_id: order_id.clone(),
        })?;

        self.io.alert.stop();
        self.pending = None;
        self.io
            .metrics
            .offers_resolved_total
            .with_label_values(&["declined"])
            .inc();

        info!(order_id = %order_id, "offer declined");
        self.publish();
        Ok(())
    }

    /// Moves the active order one step forward. The daily counter is left to
    /// the backend's `order:updated` so a replayed completion is counted once.
    pub async fn advance(&mut self) -> Result<(), AppError> {
        let order_id = self
            .persisted
            .active_order
            .as_ref()
            .map(|order| order.order_id.clone())
            .ok_or_else(|| AppError::Conflict("no active order".to_string()))?;
        let next = self.persisted.order_status.next().ok_or_else(|| {
            AppError::Conflict(format!("order {order_id} has no further status"))
        })?;

        self.emit(Outbound::Status {
            order_id: order_id.clone(),
            status: next,
        })?;

        if next.is_terminal() {
            self.persisted.clear_order();
        } else {
            self.persisted.order_status = next;
        }
        self.persist().await;
        self.sync_telemetry();

        info!(order_id = %order_id, status = next.as_str(), "order advanced");
        self.publish();
        Ok(())
    }

    pub fn offer_taken(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.io.alert.stop();
            self.io
                .metrics
                .offers_resolved_total
                .with_label_values(&["taken"])
                .inc();
            info!(order_id = %pending.offer.order_id, "offer taken by another nurse");
            self.publish();
        }
    }

    /// Applies the backend's authoritative status.
    pub async fn order_updated(&mut self, status: OrderStatus) {
        if status.is_terminal() {
            self.persisted.clear_order();
            let count = self.persisted.completed_today.increment(today());
            info!(completed_today = count, "order completed");
        } else if self.persisted.active_order.is_some() {
            self.persisted.order_status = status;
            debug!(status = status.as_str(), "order status updated");
        } else {
            debug!(status = status.as_str(), "status update without an active order ignored");
            return;
        }

        self.persist().await;
        self.sync_telemetry();
        self.publish();
    }

    fn emit(&self, event: Outbound) -> Result<(), AppError> {
        let name = event.name();
        self.io.outbound.try_send(event).map_err(|err| {
            warn!(event = name, error = %err, "failed to queue realtime event");
            AppError::Internal(format!("failed to queue {name}"))
        })
    }

    fn report_expiry(&self, order_id: String, reason: ExpiryReason) {
        if !self.settings.notify_expiry {
            return;
        }
        if let Err(err) = self.emit(Outbound::Expired { order_id, reason }) {
            debug!(error = %err, "expiry not reported");
        }
    }

    async fn persist(&self) {
        if let Err(err) = self.io.store.save(&self.persisted).await {
            warn!(error = %err, "failed to persist session");
        }
    }

    /// Keeps the position stream alive exactly while an order is active.
    fn sync_telemetry(&mut self) {
        match &self.persisted.active_order {
            Some(order) => {
                let running = self.telemetry.as_ref().is_some_and(|task| !task.is_finished());
                if !running {
                    self.telemetry = Some(telemetry::spawn(
                        order.order_id.clone(),
                        self.io.positions.subscribe(),
                        self.io.outbound.clone(),
                        self.settings.speed_window,
                        self.io.metrics.clone(),
                    ));
                }
                self.io.metrics.active_orders.set(1);
            }
            None => {
                if let Some(task) = self.telemetry.take() {
                    task.abort();
                    debug!("position stream stopped");
                }
                self.io.metrics.active_orders.set(0);
            }
        }
    }

    fn snapshot(&self) -> SessionView {
        SessionView {
            pending: self.pending.as_ref().map(|pending| PendingView {
                offer: pending.offer.clone(),
                countdown: pending.remaining,
                source: pending.source,
            }),
            active_order: self.persisted.active_order.clone(),
            order_status: self.persisted.order_status,
            completed_today: self.persisted.completed_today(),
            connected: self.connected,
            alert_playing: self.io.alert.is_playing(),
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.snapshot());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
