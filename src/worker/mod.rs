//! Background delivery worker.
//!
//! Runs independently of any window. A push delivery is persisted to the
//! handoff store before the notification is shown, so a tap that opens a
//! fresh window always finds the offer waiting.

pub mod clients;
pub mod notify;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handoff::HandoffStore;
use crate::worker::clients::{ClientMessage, Clients, WindowLauncher};
use crate::worker::notify::{Notification, Notifier, DEFAULT_BODY, DEFAULT_TITLE, VIBRATE_PATTERN};

const NOTIFICATION_ICON: &str = "/icon.png";

/// Upper bound on notifications remembered for click routing.
const MAX_SHOWN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Active,
}

#[derive(Debug)]
pub enum WorkerEvent {
    /// Raw push body as delivered by the push service.
    Push(Vec<u8>),
    NotificationClick { tag: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused(Uuid),
    Opened(Uuid),
}

/// Push body fields the worker understands. Anything missing or of the wrong
/// shape falls back to a default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushMessage {
    pub title: Option<String>,
    pub body: Option<String>,
    pub order_id: Option<String>,
    pub data: Option<Value>,
    raw: Value,
}

impl PushMessage {
    pub fn parse(bytes: &[u8]) -> Self {
        let raw = match serde_json::from_slice::<Value>(bytes) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) | Err(_) => {
                debug!(len = bytes.len(), "push body is not a JSON object");
                Value::Object(Map::new())
            }
        };

        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let order_id = match raw.get("orderId") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        let data = raw.get("data").filter(|data| !data.is_null()).cloned();

        Self {
            title: text("title"),
            body: text("body"),
            order_id,
            data,
            raw: raw.clone(),
        }
    }

    /// What a window needs to show the offer: the nested `data` object when
    /// the sender wrapped it, otherwise the whole body.
    pub fn offer_payload(&self) -> Value {
        self.data.clone().unwrap_or_else(|| self.raw.clone())
    }
}

struct Shown {
    notification: Notification,
    at: DateTime<Utc>,
}

pub struct BackgroundWorker {
    state: WorkerState,
    clients: Arc<Clients>,
    launcher: Arc<dyn WindowLauncher>,
    notifier: Arc<dyn Notifier>,
    handoff: HandoffStore,
    shown: HashMap<String, Shown>,
}

impl BackgroundWorker {
    pub fn new(
        clients: Arc<Clients>,
        launcher: Arc<dyn WindowLauncher>,
        notifier: Arc<dyn Notifier>,
        handoff: HandoffStore,
    ) -> Self {
        Self {
            state: WorkerState::Installing,
            clients,
            launcher,
            notifier,
            handoff,
            shown: HashMap::new(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Activates immediately and takes control of every open window.
    pub fn activate(&mut self) {
        if self.state == WorkerState::Active {
            return;
        }
        self.state = WorkerState::Active;
        let claimed = self.clients.claim();
        info!(claimed, "background worker active");
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<WorkerEvent>) {
        self.activate();

        while let Some(event) = events.recv().await {
            match event {
                WorkerEvent::Push(body) => {
                    self.on_push(&body).await;
                }
                WorkerEvent::NotificationClick { tag } => {
                    self.on_notification_click(&tag).await;
                }
            }
        }

        info!("background worker stopped");
    }

    pub async fn on_push(&mut self, body: &[u8]) -> Notification {
        self.on_push_at(body, Utc::now()).await
    }

    pub async fn on_push_at(&mut self, body: &[u8], now: DateTime<Utc>) -> Notification {
        let message = PushMessage::parse(body);

        // The record must be durable before the nurse can tap the notification.
        self.handoff.write_at(message.offer_payload(), now).await;

        let tag = format!(
            "order-{}",
            message
                .order_id
                .clone()
                .unwrap_or_else(|| now.timestamp_millis().to_string())
        );
        let notification = Notification {
            tag: tag.clone(),
            title: message.title.clone().unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: message.body.clone().unwrap_or_else(|| DEFAULT_BODY.to_string()),
            icon: Some(NOTIFICATION_ICON.to_string()),
            badge: Some(NOTIFICATION_ICON.to_string()),
            require_interaction: true,
            renotify: true,
            vibrate: VIBRATE_PATTERN.to_vec(),
            order_id: message.order_id.clone(),
            payload: message.offer_payload(),
        };

        if let Err(err) = self.notifier.show(&notification).await {
            warn!(error = %err, tag = %tag, "failed to show notification");
        }
        self.prune(now).await;
        self.shown.insert(
            tag,
            Shown {
                notification: notification.clone(),
                at: now,
            },
        );
        notification
    }

    /// Forgets notifications whose offer is past the handoff freshness window,
    /// then the oldest ones beyond `MAX_SHOWN`. Both are closed on screen.
    async fn prune(&mut self, now: DateTime<Utc>) {
        let freshness = chrono::Duration::from_std(self.handoff.freshness())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let mut stale: Vec<String> = self
            .shown
            .iter()
            .filter(|(_, shown)| now - shown.at > freshness)
            .map(|(tag, _)| tag.clone())
            .collect();

        let live = self.shown.len() - stale.len();
        if live >= MAX_SHOWN {
            let mut remaining: Vec<(&String, &Shown)> = self
                .shown
                .iter()
                .filter(|(tag, _)| !stale.contains(tag))
                .collect();
            remaining.sort_by_key(|(_, shown)| shown.at);
            let excess = live + 1 - MAX_SHOWN;
            stale.extend(remaining.into_iter().take(excess).map(|(tag, _)| tag.clone()));
        }

        for tag in stale {
            self.shown.remove(&tag);
            self.notifier.close(&tag).await;
            debug!(tag = %tag, "stale notification forgotten");
        }
    }

    pub fn shown_count(&self) -> usize {
        self.shown.len()
    }

    pub async fn on_notification_click(&mut self, tag: &str) -> Option<ClickOutcome> {
        let Some(Shown { notification, .. }) = self.shown.remove(tag) else {
            debug!(tag = %tag, "click on unknown notification ignored");
            return None;
        };
        self.notifier.close(tag).await;

        for window in self.clients.match_all() {
            let message = ClientMessage::OrderIncoming {
                payload: notification.payload.clone(),
            };
            if self.clients.post_message(&window, message).await && self.clients.focus(&window).await {
                info!(window_id = %window.id, tag = %tag, "offer handed to open window");
                return Some(ClickOutcome::Focused(window.id));
            }
        }

        // The new window finds the offer in the handoff store on load.
        match self.launcher.open_window().await {
            Ok(id) => {
                info!(window_id = %id, tag = %tag, "window opened for offer");
                Some(ClickOutcome::Opened(id))
            }
            Err(err) => {
                warn!(error = %err, tag = %tag, "failed to open window");
                None
            }
        }
    }
}
