use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pharmalink_realtime::config::Settings;
use pharmalink_realtime::server::{create_app, AppState};
use pharmalink_realtime::store::{MarketStore, MemoryStore};
use pharmalink_realtime::sweep::SweepScheduler;
use pharmalink_realtime::tasks::QueueDrainTask;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    // Standalone runs use the in-memory store; a durable store slots in
    // behind the same trait
    let store: Arc<dyn MarketStore> = Arc::new(MemoryStore::new());

    // Create application state
    let state = AppState::new(settings.clone(), store.clone());
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start queue drain task in background
    let drain_task = QueueDrainTask::new(
        state.queue.clone(),
        state.dispatcher.clone(),
        settings.notification.drain_interval_ms,
        shutdown_tx.subscribe(),
    );
    let drain_handle = tokio::spawn(drain_task.run());

    // Start sweep jobs in background
    let sweep_handles = SweepScheduler::new(shutdown_tx.clone())
        .with_standard_jobs(&settings.sweep, store, state.bus.clone())
        .start();

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    let _ = drain_handle.await;
    for handle in sweep_handles {
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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

    // Stop background tasks
    let _ = shutdown_tx.send(());
}
