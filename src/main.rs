// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::calibration::desk::CalibrationDesk;
use crate::application::device_api::DeviceApi;
use crate::application::telemetry_poller::{PollOptions, TelemetryPoller};
use crate::infrastructure::config::load_console_config;
use crate::infrastructure::device_client::HttpDevice;
use crate::presentation::app_state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_console_config().context("failed to load console configuration")?;
    tracing::info!(device = %config.device.base_url, "starting pool console");

    // Device adapter (infrastructure layer)
    let device: Arc<dyn DeviceApi> = Arc::new(HttpDevice::new(config.device.base_url.clone()));

    // Services (application layer)
    let telemetry = TelemetryPoller::new(device.clone(), config.telemetry.poller_settings());
    let desk = CalibrationDesk::new(device, telemetry.clone(), config.calibration.desk_settings());

    telemetry.load_history(&config.telemetry.history_range).await;
    if let Err(e) = telemetry.poll(PollOptions::forced("startup")).await {
        tracing::warn!("first poll failed, retrying in background: {}", e);
    }
    telemetry.spawn_interval_loop();
    telemetry.spawn_watchdog();
    desk.spawn_status_refresh();

    let state = Arc::new(AppState { telemetry, desk });

    // Build router (presentation layer)
    let router = presentation::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("invalid listen address '{}'", config.server.listen))?;
    tracing::info!(%addr, "console API listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
