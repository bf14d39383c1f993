//! services/relay/src/bin/relay.rs

use relay_lib::{config::Config, error::RelayError, web, web::state::AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting relay...");
    info!(
        "Day sections use UTC offset {}; plan channel capacity {}",
        config.day_offset, config.plan_channel_capacity
    );

    // --- 2. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config.clone()));

    // --- 3. Create the Web Router ---
    let app = web::router(app_state.clone())?;

    // --- 4. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await?;

    info!("Relay stopped.");
    Ok(())
}

async fn shutdown_signal(app_state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
    // Workers finish the plan they are applying; renderer sockets see their
    // plan stream close so the server can drain.
    app_state.shutdown().await;
}
