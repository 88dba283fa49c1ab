use std::sync::Arc;

use nurse_dispatch::alert::output::{AudioOutput, CommandOutput, SilentOutput};
use nurse_dispatch::api;
use nurse_dispatch::api::backend::BackendApi;
use nurse_dispatch::config::Config;
use nurse_dispatch::error::AppError;
use nurse_dispatch::realtime::ws::WebSocketConnector;
use nurse_dispatch::session::identity::Identity;
use nurse_dispatch::session::SessionStore;
use nurse_dispatch::state::AppState;
use nurse_dispatch::worker::notify::{CommandNotifier, LogNotifier, Notifier};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store = SessionStore::new(&config.data_dir, &config.store_name);
    let mut session = store.load().await;
    let token = match (&config.nurse_token, &session.token) {
        (Some(token), _) => token.clone(),
        (None, Some(token)) => token.clone(),
        (None, None) => {
            return Err(AppError::Unauthorized(
                "no token configured; log in and set NURSE_TOKEN".to_string(),
            ));
        }
    };
    let identity = Identity::from_token(&token)?;
    if session.token.as_deref() != Some(token.as_str()) {
        session.token = Some(token.clone());
        if let Err(err) = store.save(&session).await {
            tracing::warn!(error = %err, "failed to store token");
        }
    }

    let backend = BackendApi::new(config.api_url.clone(), token)?;
    let profile = backend.fetch_profile().await.map_err(|err| {
        tracing::error!(error = %err, "profile fetch failed; log in again");
        AppError::Unauthorized(err.to_string())
    })?;
    tracing::info!(nurse_id = %identity.nurse_id, name = %profile.name, "nurse signed in");

    let audio: Arc<dyn AudioOutput> = match &config.alert_player {
        Some(player) => Arc::new(CommandOutput::new(player.clone(), config.data_dir.join("audio"))),
        None => {
            tracing::info!("no ALERT_PLAYER configured; alerts are silent");
            Arc::new(SilentOutput)
        }
    };
    let connector = Arc::new(WebSocketConnector::new(config.socket_url.clone()));

    let config = Arc::new(config);
    let (app_state, worker_rx) = AppState::new(
        config.clone(),
        identity,
        profile,
        backend,
        connector,
        audio,
    );
    let shared_state = Arc::new(app_state);

    let notifier: Arc<dyn Notifier> = match &config.notify_command {
        Some(program) => Arc::new(CommandNotifier::new(program.clone())),
        None => Arc::new(LogNotifier),
    };
    let worker = shared_state.worker(notifier);
    tokio::spawn(worker.run(worker_rx));

    let push_state = shared_state.clone();
    tokio::spawn(async move {
        let status = push_state
            .backend
            .register_push(&push_state.config.push_endpoint())
            .await;
        *push_state.push_status.write().await = status;
    });

    shared_state.windows.open().await?;

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
