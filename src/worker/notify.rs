use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

pub const DEFAULT_TITLE: &str = "New order!";
pub const DEFAULT_BODY: &str = "A new order is waiting for you. Tap to view it.";
pub const VIBRATE_PATTERN: [u32; 5] = [300, 100, 300, 100, 300];

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// A system notification announcing an offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub tag: String,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub badge: Option<String>,
    /// Stays on screen until the nurse interacts with it.
    pub require_interaction: bool,
    /// Alerts again even when replacing a notification with the same tag.
    pub renotify: bool,
    pub vibrate: Vec<u32>,
    pub order_id: Option<String>,
    pub payload: Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: &Notification) -> Result<(), NotifyError>;

    async fn close(&self, tag: &str);
}

/// Surfaces notifications in the log. Used when no desktop notifier is wired.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            tag = %notification.tag,
            title = %notification.title,
            body = %notification.body,
            order_id = notification.order_id.as_deref().unwrap_or("-"),
            "notification shown"
        );
        Ok(())
    }

    async fn close(&self, tag: &str) {
        info!(tag = %tag, "notification closed");
    }
}

/// Hands notifications to a desktop notifier program such as `notify-send`,
/// invoked as `<program> <title> <body>`.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        let status = Command::new(&self.program)
            .arg(&notification.title)
            .arg(&notification.body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|err| NotifyError::Rejected(format!("{}: {err}", self.program)))?;

        if !status.success() {
            return Err(NotifyError::Rejected(format!("{} exited with {status}", self.program)));
        }
        debug!(tag = %notification.tag, "notification handed to {}", self.program);
        Ok(())
    }

    async fn close(&self, tag: &str) {
        debug!(tag = %tag, "notifier program cannot withdraw notifications");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CommandNotifier, Notification, NotifyError, Notifier, DEFAULT_BODY, DEFAULT_TITLE};

    fn notification() -> Notification {
        Notification {
            tag: "order-O1".to_string(),
            title: DEFAULT_TITLE.to_string(),
            body: DEFAULT_BODY.to_string(),
            icon: None,
            badge: None,
            require_interaction: true,
            renotify: true,
            vibrate: Vec::new(),
            order_id: Some("O1".to_string()),
            payload: json!({ "orderId": "O1" }),
        }
    }

    #[tokio::test]
    async fn failing_notifier_program_is_a_rejection() {
        assert!(CommandNotifier::new("true").show(&notification()).await.is_ok());

        let failed = CommandNotifier::new("false").show(&notification()).await;
        assert!(matches!(failed, Err(NotifyError::Rejected(msg)) if msg.contains("exited")));

        let missing = CommandNotifier::new("/nonexistent/notify-send")
            .show(&notification())
            .await;
        assert!(matches!(missing, Err(NotifyError::Rejected(_))));
    }
}
