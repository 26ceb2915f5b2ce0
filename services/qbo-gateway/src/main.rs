//! QuickBooks Online gateway
//!
//! Single-binary service that:
//! 1. Loads config and the persisted token pair
//! 2. Exposes the operation catalog as JSON over HTTP
//! 3. Refreshes the access token on 401/403 and persists the new pair
//!
//! `qbo-gateway --refresh` rotates the stored pair once and exits.

mod config;
mod error;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use intuit_auth::{CredentialStore, EnvFileStore, TokenRefresher};
use qbo_client::{EndpointResolver, OperationCatalog, RequestDispatcher, Session};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::{AppState, build_router};

/// Time allowed for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL then RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());
    let refresh_only = args.iter().any(|a| a == "--refresh");

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        environment = %config.quickbooks.environment,
        company_id = %config.quickbooks.company_id,
        credentials_file = %config.oauth.credentials_file.display(),
        proactive_refresh = config.oauth.refresh_margin_secs.is_some(),
        "configuration loaded"
    );

    // Installed before anything can emit, including the refresher
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let client = reqwest::Client::new();
    let refresher = Arc::new(build_refresher(&config, client.clone())?);

    if refresh_only {
        return rotate_once(&refresher).await;
    }

    let catalog = build_catalog(&config, refresher, client);
    let app = build_router(
        AppState::new(catalog, prometheus_handle),
        config.server.max_connections,
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start.
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

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

fn build_refresher(config: &Config, client: reqwest::Client) -> Result<TokenRefresher> {
    let client_secret = config
        .oauth
        .client_secret
        .clone()
        .context("client secret not configured")?;
    let store: Arc<dyn CredentialStore> =
        Arc::new(EnvFileStore::new(&config.oauth.credentials_file));

    Ok(TokenRefresher::new(
        client,
        config.oauth.client_id.clone(),
        client_secret,
        store,
    )
    .with_token_endpoint(config.oauth.token_endpoint.clone()))
}

fn build_catalog(
    config: &Config,
    refresher: Arc<TokenRefresher>,
    client: reqwest::Client,
) -> OperationCatalog {
    let dispatcher =
        RequestDispatcher::new(client, Duration::from_secs(config.quickbooks.timeout_secs));
    let mut session = Session::new(refresher, dispatcher);
    if let Some(margin) = config.oauth.refresh_margin_secs {
        session = session.with_refresh_margin(Duration::from_secs(margin));
    }

    let mut resolver = EndpointResolver::new(
        config.quickbooks.environment,
        config.quickbooks.company_id.clone(),
    );
    if let Some(ref base_url) = config.quickbooks.base_url {
        resolver = resolver.with_base_url(base_url.clone());
    }

    OperationCatalog::new(session, resolver).with_time_api(
        config.quickbooks.time_base_url.clone(),
        config.quickbooks.time_access_token.clone(),
    )
}

/// `--refresh`: one unconditional exchange, persisted before exit.
async fn rotate_once(refresher: &TokenRefresher) -> Result<()> {
    match refresher.refresh_now().await {
        Ok(_) => {
            info!("token pair rotated and saved");
            Ok(())
        }
        Err(e) => {
            error!(kind = e.label(), error = %e, "token rotation failed");
            Err(e).context("token rotation failed")
        }
    }
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
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
