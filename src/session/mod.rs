//! Local session storage: auth token, the accepted order with its status, and
//! today's completed-order counter. Everything lives in one JSON document that
//! is replaced atomically, so the order and its status are never observed out
//! of step with each other.

pub mod identity;

use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use crate::models::order::{ActiveOrder, OrderStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounter {
    pub date: Option<NaiveDate>,
    pub count: u32,
}

impl DailyCounter {
    pub fn count_on(&self, today: NaiveDate) -> u32 {
        if self.date == Some(today) {
            self.count
        } else {
            0
        }
    }

    pub fn increment(&mut self, today: NaiveDate) -> u32 {
        let count = self.count_on(today) + 1;
        self.date = Some(today);
        self.count = count;
        count
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub active_order: Option<ActiveOrder>,
    #[serde(default)]
    pub order_status: OrderStatus,
    #[serde(default)]
    pub completed_today: DailyCounter,
}

impl PersistedSession {
    pub fn completed_today(&self) -> u32 {
        self.completed_today.count_on(today())
    }

    /// Drops the active order and resets its status in one step.
    pub fn clear_order(&mut self) {
        self.active_order = None;
        self.order_status = OrderStatus::default();
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path, store_name: &str) -> Self {
        Self {
            path: data_dir.join(store_name).join("session.json"),
        }
    }

    /// Reads the persisted session. A missing or unreadable document yields
    /// the default (logged-out, idle) session.
    pub async fn load(&self) -> PersistedSession {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return PersistedSession::default(),
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "failed to read session");
                return PersistedSession::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(error = %err, "session document is corrupt; starting fresh");
            PersistedSession::default()
        })
    }

    pub async fn save(&self, session: &PersistedSession) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(session).map_err(io::Error::other)?;
        let temp_path = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&temp_path, bytes).await?;
        fs::rename(&temp_path, &self.path).await
    }
}
