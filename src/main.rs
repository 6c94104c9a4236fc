use std::sync::Arc;
use std::time::Duration;

use corridor_dispatch::api::rest::router;
use corridor_dispatch::config::{Config, LogFormat};
use corridor_dispatch::engine::processor::run_dispatch_loop;
use corridor_dispatch::error::AppError;
use corridor_dispatch::state::AppState;
use corridor_dispatch::storage::{InMemoryStorage, SqliteStorage, Storage};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let storage: Arc<dyn Storage> = match &config.database_path {
        Some(path) => {
            tracing::info!(path = %path, "using sqlite storage");
            Arc::new(SqliteStorage::open(path)?)
        }
        None => {
            tracing::info!("using in-memory storage");
            Arc::new(InMemoryStorage::new())
        }
    };

    let shared_state = Arc::new(AppState::new(
        storage,
        config.origin,
        config.corridor,
        config.event_buffer_size,
    ));

    let app = router(shared_state.clone());

    tokio::spawn(run_dispatch_loop(
        shared_state.clone(),
        Duration::from_millis(config.dispatch_interval_ms),
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        origin_lat = config.origin.lat,
        origin_lon = config.origin.lon,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_target(false);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
