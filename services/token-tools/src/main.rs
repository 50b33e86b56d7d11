//! Token broker tool host
//!
//! Single-binary service that:
//! 1. Loads configuration and opens the credential store
//! 2. Serves the token tools over HTTP
//! 3. Resolves tokens from the store, by refresh, or through a browser flow

mod config;
mod metrics;
mod tools;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use token_auth::{
    BrowserLauncher, CredentialStore, NoBrowser, SystemBrowser, TokenAcquirer, TokenRefresher,
    build_client,
};
use token_resolver::TokenResolver;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::tools::{AppState, build_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting token-tools");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(
        path = %config_path.path.display(),
        explicit = config_path.explicit,
        "loading configuration"
    );

    let config = Config::load(&config_path).with_context(|| {
        format!(
            "failed to load config from {}",
            config_path.path.display()
        )
    })?;

    let store_path = config
        .store_path()
        .context("failed to resolve credential store path")?;
    let poll_config = config.poll_config();

    info!(
        listen_addr = %config.server.listen_addr,
        store_path = %store_path.display(),
        poll_interval_secs = config.polling.interval_secs,
        max_attempts = config.polling.max_attempts,
        accept_invalid_certs = config.tls.accept_invalid_certs,
        browser = config.browser.enabled,
        "configuration loaded"
    );

    let client = build_client(config.tls.accept_invalid_certs)
        .context("failed to build HTTP client")?;
    let browser: Arc<dyn BrowserLauncher> = if config.browser.enabled {
        Arc::new(SystemBrowser)
    } else {
        Arc::new(NoBrowser)
    };

    let acquirer = TokenAcquirer::new(client.clone(), browser, poll_config.clone());
    let refresher = TokenRefresher::new(client, poll_config.request_timeout);
    let resolver = TokenResolver::new(acquirer, refresher);
    let store = CredentialStore::new(store_path);

    let app_state = AppState::new(resolver, store, prometheus_handle);
    let calls_served = app_state.calls_served.clone();
    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting tool calls");

    // The drain timeout starts when the shutdown signal fires. Calls still
    // polling at the deadline are dropped without persisting anything.
    let drain_timeout = Duration::from_secs(config.server.drain_timeout_secs);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(drain_timeout, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight calls drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = drain_timeout.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!(
        calls_served = calls_served.load(Ordering::Relaxed),
        "shutdown complete"
    );
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
