use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use lead_funnel::chat::spawn_sweeper;
use lead_funnel::config::FunnelConfig;
use lead_funnel::server::{self, AppState, spawn_limiter_pruner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading any configuration
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to parse .env"),
    }

    let config = FunnelConfig::from_env().context("invalid configuration")?;
    let state = AppState::new(&config).context("failed to build services")?;

    let _sweeper = spawn_sweeper(Arc::clone(&state.sessions), config.session.sweep_interval);
    let _pruner = spawn_limiter_pruner(Arc::clone(&state.limiter), config.rate_limit.window);

    let app = server::app(&state, &config);
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;

    eprintln!("Lead funnel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Environment: {}", config.environment.as_str());
    eprintln!("   REST: http://{}/api", config.bind_addr());
    eprintln!("   Chat WS: ws://{}/ws/chat", config.bind_addr());
    tracing::info!(
        addr = %config.bind_addr(),
        origins = ?config.allowed_origins,
        "Lead funnel server started"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Lead funnel server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
