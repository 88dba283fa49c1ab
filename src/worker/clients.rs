use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use crate::engine::view::SessionView;
use crate::engine::SessionInput;
use crate::error::AppError;

/// Direct message from the background worker to an open window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    OrderIncoming { payload: Value },
}

#[async_trait]
pub trait WindowLauncher: Send + Sync {
    async fn open_window(&self) -> Result<Uuid, AppError>;
}

#[derive(Debug, Clone)]
pub struct WindowHandle {
    pub id: Uuid,
    pub origin: String,
    pub opened_at: DateTime<Utc>,
    pub controlled: bool,
    pub inbox: mpsc::Sender<SessionInput>,
    pub view: watch::Receiver<SessionView>,
}

/// Registry of open windows, shared by the worker and the control surface.
pub struct Clients {
    origin: String,
    windows: DashMap<Uuid, WindowHandle>,
}

impl Clients {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            windows: DashMap::new(),
        }
    }

    pub fn register(
        &self,
        inbox: mpsc::Sender<SessionInput>,
        view: watch::Receiver<SessionView>,
    ) -> Uuid {
        let handle = WindowHandle {
            id: Uuid::new_v4(),
            origin: self.origin.clone(),
            opened_at: Utc::now(),
            controlled: false,
            inbox,
            view,
        };
        let id = handle.id;
        self.windows.insert(id, handle);
        debug!(window_id = %id, "window registered");
        id
    }

    pub fn unregister(&self, id: Uuid) {
        if self.windows.remove(&id).is_some() {
            debug!(window_id = %id, "window unregistered");
        }
    }

    /// Takes control of every open window. Returns how many were claimed.
    pub fn claim(&self) -> usize {
        let mut claimed = 0;
        for mut entry in self.windows.iter_mut() {
            if !entry.controlled {
                entry.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    /// Open windows at this origin, oldest first.
    pub fn match_all(&self) -> Vec<WindowHandle> {
        let mut windows: Vec<WindowHandle> = self
            .windows
            .iter()
            .filter(|entry| entry.origin == self.origin && !entry.inbox.is_closed())
            .map(|entry| entry.value().clone())
            .collect();
        windows.sort_by_key(|window| window.opened_at);
        windows
    }

    /// The window the control surface talks to: the most recently opened one.
    pub fn primary(&self) -> Option<WindowHandle> {
        self.match_all().pop()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub async fn post_message(&self, window: &WindowHandle, message: ClientMessage) -> bool {
        window.inbox.send(SessionInput::Message(message)).await.is_ok()
    }

    pub async fn focus(&self, window: &WindowHandle) -> bool {
        window.inbox.send(SessionInput::Focus).await.is_ok()
    }
}
