use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use uuid::Uuid;

use crate::alert::output::AudioOutput;
use crate::alert::AlertEngine;
use crate::config::Config;
use crate::engine::{Session, SessionInput, SessionIo, SessionSettings};
use crate::error::AppError;
use crate::geo::PositionSample;
use crate::handoff::HandoffStore;
use crate::observability::metrics::Metrics;
use crate::realtime::{Connector, RealtimeChannel};
use crate::session::identity::Identity;
use crate::session::SessionStore;
use crate::worker::clients::{Clients, WindowLauncher};

/// Opens foreground windows: one session actor plus its live socket each.
pub struct WindowHost {
    config: Arc<Config>,
    identity: Identity,
    connector: Arc<dyn Connector>,
    audio: Arc<dyn AudioOutput>,
    clients: Arc<Clients>,
    positions: broadcast::Sender<PositionSample>,
    handoff: HandoffStore,
    store: SessionStore,
    metrics: Metrics,
}

impl WindowHost {
    pub fn new(
        config: Arc<Config>,
        identity: Identity,
        connector: Arc<dyn Connector>,
        audio: Arc<dyn AudioOutput>,
        clients: Arc<Clients>,
        positions: broadcast::Sender<PositionSample>,
        metrics: Metrics,
    ) -> Self {
        let handoff = HandoffStore::new(&config.data_dir, &config.store_name, config.handoff_freshness);
        let store = SessionStore::new(&config.data_dir, &config.store_name);
        Self {
            config,
            identity,
            connector,
            audio,
            clients,
            positions,
            handoff,
            store,
            metrics,
        }
    }

    pub fn handoff(&self) -> &HandoffStore {
        &self.handoff
    }

    pub async fn open(&self) -> Result<Uuid, AppError> {
        let persisted = self.store.load().await;

        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue_size);
        let (inbox_tx, inbox_rx) = mpsc::channel(self.config.mailbox_size);

        let io = SessionIo {
            alert: AlertEngine::new(
                self.audio.clone(),
                self.config.alert_sound.clone(),
                self.config.alert_duration,
            ),
            handoff: self.handoff.clone(),
            store: self.store.clone(),
            outbound: outbound_tx,
            positions: self.positions.clone(),
            metrics: self.metrics.clone(),
        };
        let (session, view) = Session::new(SessionSettings::from(self.config.as_ref()), persisted, io);

        let channel = RealtimeChannel::new(
            self.connector.clone(),
            self.identity.clone(),
            outbound_rx,
            inbox_tx.clone(),
            view.clone(),
            self.config.reconnect_max,
            self.metrics.clone(),
        );

        let id = self.clients.register(inbox_tx, view);
        self.metrics.windows_open.inc();
        info!(window_id = %id, "window opened");

        let clients = self.clients.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            session.run(inbox_rx).await;
            clients.unregister(id);
            metrics.windows_open.dec();
        });
        tokio::spawn(channel.run());

        Ok(id)
    }

    /// Asks a window to close. Returns `false` if it was already gone.
    pub async fn close(&self, id: Uuid) -> bool {
        let Some(window) = self.clients.match_all().into_iter().find(|w| w.id == id) else {
            return false;
        };
        window.inbox.send(SessionInput::Close).await.is_ok()
    }
}

#[async_trait]
impl WindowLauncher for WindowHost {
    async fn open_window(&self) -> Result<Uuid, AppError> {
        self.open().await
    }
}
