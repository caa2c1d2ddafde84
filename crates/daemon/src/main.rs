// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rxd: the Remedy engine daemon.
//!
//! Loads the engine configuration, starts the tool servers and the watch
//! loop, and serves the Alertmanager webhook until interrupted. Chat
//! transports register their senders with the [`rx_adapters::ChannelRouter`]
//! in the hosting bot process; a bare `rxd` runs with an empty router and
//! logs every message it would have sent.

use rx_adapters::ChannelRouter;
use rx_daemon::{Config, ConfigError, Engine, StartupError};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum DaemonError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("startup: {0}")]
    Startup(#[from] StartupError),
    #[error("listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("http server: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RX_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "rxd failed");
        eprintln!("rxd: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), DaemonError> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RX_CONFIG").ok())
        .unwrap_or_else(|| "rx.toml".to_string());
    let config = Config::load(&config_path)?;
    tracing::info!(%config_path, "configuration loaded");

    // The conversational surface registers real chat senders here.
    let channels = ChannelRouter::new();

    let engine = Engine::start(config.clone(), channels).await?;

    let addr = config.engine.listen_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| DaemonError::Bind { addr: addr.clone(), source })?;
    tracing::info!(%addr, "http ingress listening");

    let app = rx_daemon::ingress::router(engine.events());
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("ctrl-c handler unavailable, serving until killed");
                std::future::pending::<()>().await;
            }
            tracing::info!("interrupt received");
        })
        .await
        .map_err(DaemonError::Serve)?;

    engine.shutdown().await;
    Ok(())
}
