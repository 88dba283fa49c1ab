use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};

use crate::alert::output::AudioOutput;
use crate::api::backend::{BackendApi, PushStatus};
use crate::config::Config;
use crate::engine::window::WindowHost;
use crate::geo::PositionSample;
use crate::models::nurse::{DutyState, NurseProfile};
use crate::observability::metrics::Metrics;
use crate::realtime::Connector;
use crate::session::identity::Identity;
use crate::worker::clients::Clients;
use crate::worker::notify::Notifier;
use crate::worker::{BackgroundWorker, WorkerEvent};

pub struct AppState {
    pub config: Arc<Config>,
    pub identity: Identity,
    pub clients: Arc<Clients>,
    pub windows: Arc<WindowHost>,
    pub worker_tx: mpsc::Sender<WorkerEvent>,
    pub backend: BackendApi,
    pub profile: RwLock<NurseProfile>,
    pub duty: RwLock<DutyState>,
    pub push_status: RwLock<PushStatus>,
    pub positions: broadcast::Sender<PositionSample>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        identity: Identity,
        profile: NurseProfile,
        backend: BackendApi,
        connector: Arc<dyn Connector>,
        audio: Arc<dyn AudioOutput>,
    ) -> (Self, mpsc::Receiver<WorkerEvent>) {
        let (worker_tx, worker_rx) = mpsc::channel(config.mailbox_size);
        let (positions, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let metrics = Metrics::new();
        let clients = Arc::new(Clients::new(config.public_url.clone()));

        let windows = Arc::new(WindowHost::new(
            config.clone(),
            identity.clone(),
            connector,
            audio,
            clients.clone(),
            positions.clone(),
            metrics.clone(),
        ));

        let duty = DutyState {
            on_duty: profile.is_available,
            last_position: None,
        };

        (
            Self {
                config,
                identity,
                clients,
                windows,
                worker_tx,
                backend,
                profile: RwLock::new(profile),
                duty: RwLock::new(duty),
                push_status: RwLock::new(PushStatus::Pending),
                positions,
                metrics,
            },
            worker_rx,
        )
    }

    /// Builds the background worker that drains the receiver returned by
    /// [`AppState::new`].
    pub fn worker(&self, notifier: Arc<dyn Notifier>) -> BackgroundWorker {
        BackgroundWorker::new(
            self.clients.clone(),
            self.windows.clone(),
            notifier,
            self.windows.handoff().clone(),
        )
    }
}
