//! Keeper server entry point.
//!
//! Loads configuration, opens the selected storage, composes the pipeline
//! and serves it over HTTP with graceful shutdown.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use keeper_core::{Repositories, SystemClock};
use keeper_server::config::{ServerConfig, StorageBackendType};
use keeper_server::gateway;
use keeper_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    if let Some(value) = &config.unknown_storage {
        warn!(storage = %value, "unknown storage backend, falling back to in-memory storage");
    }
    info!(storage = ?config.storage_backend, "Keeper starting");

    let repos = build_repositories(&config).await?;
    let state = AppState::build(&config, repos, Arc::new(SystemClock))
        .context("failed to build application state")?;
    let app = gateway::router(Arc::new(state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "Keeper server listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .into_future(),
    );

    tokio::select! {
        joined = &mut server => {
            joined.context("server task failed")?.context("server error")?;
        }
        _ = shutdown_rx.changed() => {
            match tokio::time::timeout(config.shutdown_timeout, &mut server).await {
                Ok(joined) => joined.context("server task failed")?.context("server error")?,
                Err(_) => {
                    warn!(
                        timeout_secs = config.shutdown_timeout.as_secs(),
                        "in-flight calls did not finish in time, forcing shutdown"
                    );
                    server.abort();
                }
            }
        }
    }

    info!("Keeper server stopped");
    Ok(())
}

async fn build_repositories(config: &ServerConfig) -> anyhow::Result<Repositories> {
    match &config.storage_backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            Ok(Repositories::in_memory())
        }
        #[cfg(feature = "s3-backend")]
        StorageBackendType::S3(s3) => {
            info!(bucket = %s3.bucket, endpoint = ?s3.endpoint, "using S3 object storage");
            let backend = keeper_storage::S3Backend::connect(&keeper_storage::S3Config {
                bucket: s3.bucket.clone(),
                region: s3.region.clone(),
                endpoint: s3.endpoint.clone(),
                access_key: s3.access_key.clone(),
                secret_key: s3.secret_key.clone(),
                conditional_writes: s3.conditional_writes,
            })
            .await
            .context("failed to connect to object storage")?;
            Ok(Repositories::object_store(Arc::new(backend)))
        }
        #[cfg(not(feature = "s3-backend"))]
        StorageBackendType::S3(_) => {
            anyhow::bail!("S3 backend requested but feature 's3-backend' is not enabled");
        }
    }
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
