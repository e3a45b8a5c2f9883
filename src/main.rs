use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use fleet_tracker::api;
use fleet_tracker::config::{Config, LogFormat};
use fleet_tracker::error::AppError;
use fleet_tracker::state::AppState;
use fleet_tracker::store::{DurableStore, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let store: Arc<dyn DurableStore> = match config.seed_file.as_deref() {
        Some(path) => Arc::new(MemoryStore::from_seed_file(path)?),
        None => Arc::new(MemoryStore::new()),
    };

    let shared_state = Arc::new(AppState::new(&config, store));
    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        history_limit = ?config.location_history_limit,
        "tracking server started"
    );

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
