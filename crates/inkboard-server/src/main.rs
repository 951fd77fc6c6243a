//! Inkboard board server binary.

use inkboard_server::{AppState, ServerConfig, build_router};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkboard_server=info,tower_http=info".into()),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    if config.sessions.is_empty() {
        info!("No sessions configured; every request except /health will be rejected");
    }

    let state = Arc::new(AppState::from_config(&config));
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind, e);
            std::process::exit(1);
        }
    };
    info!("Inkboard board server listening on {}", config.bind);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
