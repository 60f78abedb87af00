use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use news_portal_store::config::Settings;
use news_portal_store::database::{seed_sample_articles, ConnectionManager};
use news_portal_store::server::{create_app, AppState};
use news_portal_store::telemetry::init_telemetry;

/// Deadline for each seeding statement
const SEED_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(run_mode = %std::env::var("RUN_MODE").unwrap_or_default(), "Configuration loaded");

    // Connect before serving anything; exhausting the retries aborts startup
    let manager = ConnectionManager::from_settings(&settings.database)?;
    let (database, monitor) = match manager.connect_and_monitor().await {
        Ok(connected) => connected,
        Err(e) => {
            tracing::error!(error = %e, "Database unavailable, aborting startup");
            return Err(e.into());
        }
    };

    if settings.database.seed_sample_data {
        if let Err(e) = seed_sample_articles(&database, SEED_TIMEOUT).await {
            tracing::warn!(error = %e, "Failed to seed sample data");
        }
    }

    // Create application state
    let state = AppState::new(database.clone());
    tracing::info!("Application state initialized");

    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler())
        .await?;

    tracing::info!("Stopping connection monitor...");
    monitor.stop().await;
    database.close().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
