mod config;
mod error;
mod handlers;
mod progress;
mod state;

use anyhow::{Context, Result};
use common::ProgressTracker;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use worker::{spawn_worker, SegmentationRunner};

use crate::config::ServerConfig;
use crate::state::AppState;

const DEFAULT_LOG_FILTER: &str = "seg_server=debug,worker=debug,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let mut config = ServerConfig::from_env();
    // rutas absolutas: el programa corre con cwd en el directorio de salida
    config.upload_dir = ensure_dir(&config.upload_dir)?;
    config.runner.output_root = ensure_dir(&config.runner.output_root)?;
    config.runner.log_dir = ensure_dir(&config.runner.log_dir)?;

    info!(
        "programa={} args={:?} uploads={} outputs={} logs={}",
        config.runner.program,
        config.runner.leading_args,
        config.upload_dir.display(),
        config.runner.output_root.display(),
        config.runner.log_dir.display()
    );

    let tracker = ProgressTracker::new();
    let cancel = CancellationToken::new();

    // único worker en segundo plano
    let (queue, worker_handle) = spawn_worker(
        SegmentationRunner::new(config.runner.clone()),
        tracker.clone(),
        cancel.clone(),
    );

    let bind_addr = config.bind_addr.clone();
    let app = handlers::build_router(AppState::new(tracker, queue, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {bind_addr}"))?;
    info!("servidor escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    worker_handle.join().await;
    info!("servidor detenido");
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("no se pudo crear {}", dir.display()))?;
    Ok(std::fs::canonicalize(dir)?)
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("no se pudo escuchar ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("apagando: se termina la tarea en curso y se descartan las encoladas");
    cancel.cancel();
}
