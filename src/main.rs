use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use config::{AppConfig, StoreKind};
use services::{
    fs_store::FsObjectStore,
    memory_store::MemoryObjectStore,
    object_store::ObjectStore,
    reporter::TracingReporter,
    resize_service::ResizeService,
    s3_store::S3ObjectStore,
    transform::ImageTransformer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting resize-proxy with config: {:?}", cfg);

    // --- Initialize object store ---
    let store: Arc<dyn ObjectStore> = match cfg.store {
        StoreKind::Fs => {
            let fs_store = open_fs_store(&cfg).await?;
            fs_store.migrate().await?;
            if migrate {
                tracing::info!("Database migration complete.");
                return Ok(()); // exit after migration
            }
            Arc::new(fs_store)
        }
        StoreKind::S3 => Arc::new(
            S3ObjectStore::connect(cfg.s3_endpoint.as_deref(), cfg.s3_region.as_deref()).await,
        ),
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory store; objects are lost on exit");
            Arc::new(MemoryObjectStore::new())
        }
    };

    if migrate {
        tracing::warn!("--migrate only applies to the fs store; nothing to do");
        return Ok(());
    }

    // --- Initialize core service ---
    let service = ResizeService::new(
        store,
        Arc::new(ImageTransformer::new().with_max_dimension(cfg.max_dimension)),
        Arc::new(TracingReporter),
        cfg.resize_settings(),
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service.clone());

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Waiting for pending cache backfills...");
    service.drain_backfills().await;
    tracing::info!("Shutdown complete.");

    Ok(())
}

/// Open the SQLite metadata pool and payload directory for the fs store.
async fn open_fs_store(cfg: &AppConfig) -> Result<FsObjectStore> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let opts = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database URL `{}`", db_url))?
        .create_if_missing(true);
    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    Ok(FsObjectStore::new(Arc::new(db), cfg.storage_dir.clone()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
