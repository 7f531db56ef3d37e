//! Initialize the shared database pool and cache client, serve readiness and metrics,
//! and release both on SIGTERM/SIGINT.
use std::sync::Arc;

use envconfig::Envconfig;
use eyre::Result;
use tokio::signal;

use resource_service::config::Config;
use resource_service::handlers;
use resource_service::resources::Resources;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let resources = Arc::new(Resources::from_config(&config));
    let recorder_handle = resources.start().await?;
    let app = handlers::app(resources.clone(), Some(recorder_handle));

    let bind = config.bind();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    resources.shutdown().await?;

    Ok(())
}
