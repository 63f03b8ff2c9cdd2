//! zapi facade
//!
//! Provisions one messaging connector container per instance, tracks it in
//! the metadata store, and relays outbound messages to the right connector.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zapi_facade::{
    api, config,
    runtime::DockerRuntime,
    state::AppState,
    store::PostgrestStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to ZAPI_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting zapi facade");
    info!(
        listen_addr = %config.listen_addr,
        network = %config.provisioning.network_name,
        image = %config.provisioning.connector_image,
        "Configuration loaded"
    );

    let store = PostgrestStore::new(&config.store)?;
    let runtime = DockerRuntime::new(&config.docker_socket);
    info!(socket = %config.docker_socket.display(), "Using Docker daemon socket");

    // Create application state
    let state = AppState::new(Arc::new(store), Arc::new(runtime), &config)?;

    // Build and run the server
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal");
    });

    if let Err(e) = server.await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Facade shutdown complete");
    Ok(())
}
