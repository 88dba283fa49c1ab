use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub api_url: String,
    pub socket_url: String,
    pub public_url: String,
    pub nurse_token: Option<String>,
    pub data_dir: PathBuf,
    pub store_name: String,
    pub alert_sound: Option<PathBuf>,
    pub alert_player: Option<String>,
    pub notify_command: Option<String>,
    pub alert_duration: Duration,
    pub live_countdown: Duration,
    pub handoff_countdown: Duration,
    pub handoff_freshness: Duration,
    pub speed_window: usize,
    pub mailbox_size: usize,
    pub outbound_queue_size: usize,
    pub event_buffer_size: usize,
    pub reconnect_max: Duration,
    pub notify_expiry: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let http_port = parse_or_default("HTTP_PORT", 4000)?;
        let api_url = env::var("API_URL").unwrap_or_else(|_| "http://localhost:3001/api".to_string());
        let socket_url = env::var("SOCKET_URL").unwrap_or_else(|_| socket_url_from_api(&api_url));

        Ok(Self {
            http_port,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            socket_url,
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{http_port}")),
            api_url,
            nurse_token: env::var("NURSE_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string())),
            store_name: env::var("STORE_NAME").unwrap_or_else(|_| "hamshirago".to_string()),
            alert_sound: env::var("ALERT_SOUND").ok().map(PathBuf::from),
            alert_player: env::var("ALERT_PLAYER").ok().filter(|p| !p.trim().is_empty()),
            notify_command: env::var("NOTIFY_COMMAND").ok().filter(|c| !c.trim().is_empty()),
            alert_duration: Duration::from_secs(parse_or_default("ALERT_DURATION_SECS", 15)?),
            live_countdown: Duration::from_secs(parse_or_default("LIVE_COUNTDOWN_SECS", 30)?),
            handoff_countdown: Duration::from_secs(parse_or_default("HANDOFF_COUNTDOWN_SECS", 90)?),
            handoff_freshness: Duration::from_secs(parse_or_default(
                "HANDOFF_FRESHNESS_SECS",
                300,
            )?),
            speed_window: parse_or_default("SPEED_WINDOW", 5)?,
            mailbox_size: parse_or_default("MAILBOX_SIZE", 256)?,
            outbound_queue_size: parse_or_default("OUTBOUND_QUEUE_SIZE", 256)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 64)?,
            reconnect_max: Duration::from_secs(parse_or_default("RECONNECT_MAX_SECS", 30)?),
            notify_expiry: parse_or_default("NOTIFY_EXPIRY", true)?,
        })
    }

    pub fn push_endpoint(&self) -> String {
        format!("{}/push", self.public_url.trim_end_matches('/'))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 4000,
            log_level: "info".to_string(),
            api_url: "http://localhost:3001/api".to_string(),
            socket_url: "ws://localhost:3001".to_string(),
            public_url: "http://localhost:4000".to_string(),
            nurse_token: None,
            data_dir: PathBuf::from("./data"),
            store_name: "hamshirago".to_string(),
            alert_sound: None,
            alert_player: None,
            notify_command: None,
            alert_duration: Duration::from_secs(15),
            live_countdown: Duration::from_secs(30),
            handoff_countdown: Duration::from_secs(90),
            handoff_freshness: Duration::from_secs(300),
            speed_window: 5,
            mailbox_size: 256,
            outbound_queue_size: 256,
            event_buffer_size: 64,
            reconnect_max: Duration::from_secs(30),
            notify_expiry: true,
        }
    }
}

/// The Socket.IO server lives on the API host without the `/api` prefix.
fn socket_url_from_api(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/').trim_end_matches("/api");
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
