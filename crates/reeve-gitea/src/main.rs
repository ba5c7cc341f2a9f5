//! Reeve Gitea bridge server

use anyhow::Context;
use clap::Parser;
use reeve_config::SystemConfig;
use reeve_gitea::{AppState, EngineClient, GiteaClient, GiteaPlugin, routes};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reeve-gitea")]
#[command(about = "Gitea bridge for the Reeve pipeline engine", long_about = None)]
struct Args {
    /// Path to the service configuration
    #[arg(long, env = "REEVE_GITEA_CONFIG", default_value = "reeve-gitea.kdl")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!(path = %args.config.display(), "Loading configuration");
    let config = SystemConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let host = Arc::new(GiteaClient::from_config(&config.gitea));
    let engine = Arc::new(EngineClient::new(config.server.engine_url.as_str()));

    let listen = config.server.listen.clone();
    let webhook_secret = config.server.webhook_secret.clone();
    let plugin = Arc::new(GiteaPlugin::start(config, host, engine)?);

    let app = routes::router(AppState::new(plugin.clone(), webhook_secret))
        .layer(TraceLayer::new_for_http());

    info!("Starting server on {}", listen);
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {}", listen))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    plugin.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
