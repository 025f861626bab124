pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod frontend;
pub mod metrics;

use crate::client::ResilientClient;
use crate::config::UiConfig;
use crate::error::{Result, ServiceError};
use crate::frontend::AppState;
use crate::metrics::MetricsService;
use std::sync::Arc;
use tracing::info;

/// Initialize the UI server
pub async fn init_ui(config: UiConfig) -> Result<()> {
    config.validate()?;

    info!("Starting podcast UI");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    let client = ResilientClient::new(
        &config.api.base_url,
        config.api.timeout(),
        config.api.circuit_breaker.clone(),
        config.api.retry.clone(),
    )?;
    info!(base_url = %client.base_url(), "API client ready");

    let metrics = if config.server.metrics_enabled {
        Some(MetricsService::new()?)
    } else {
        None
    };

    let state = AppState::new(
        Arc::new(client),
        config.server.external_api_host.clone(),
        config.server.feeds_path.clone(),
    );
    let app = frontend::router(state, metrics);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("UI ready to accept connections");

    axum::serve(listener, app)
        .await
        .map_err(|e| ServiceError::Server(format!("Server error: {}", e)))?;

    Ok(())
}

/// Initialize tracing/logging; `LOG_FORMAT=json` switches to JSON lines
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "podcast_ui=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}
