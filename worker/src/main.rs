use anyhow::{bail, Context, Result};
use common::{ArtifactSlot, ProgressTracker, Task, TaskIdGenerator, TaskStatus};
use std::{env, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use worker::{spawn_worker, RunnerConfig, SegmentationRunner};

const DEFAULT_LOG_FILTER: &str = "seg_worker=debug,worker=debug";

/// Corre una sola segmentación local, sin servidor HTTP.
/// Uso: seg-worker <imagen>
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let input = env::args().nth(1).context("uso: seg-worker <imagen>")?;
    let input = std::fs::canonicalize(&input).with_context(|| format!("no existe {input}"))?;

    let cfg = RunnerConfig::from_env();
    let tracker = ProgressTracker::new();
    let task = Task::new(TaskIdGenerator::new().next_id(), input, &cfg.log_dir, &cfg.output_root);
    tracker.register(&task.id, task.input_file_name());

    info!(
        "tarea {} (programa={} log={})",
        task.id,
        cfg.program,
        task.log_path.display()
    );

    let (queue, handle) = spawn_worker(
        SegmentationRunner::new(cfg),
        tracker.clone(),
        CancellationToken::new(),
    );
    queue.submit(task.clone())?;

    let mut last = None;
    loop {
        let snap = tracker.snapshot(&task.id);
        if last != Some(snap.progress) {
            info!("paso {}", snap.progress);
            last = Some(snap.progress);
        }
        if snap.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    handle.shutdown().await;

    let snap = tracker.snapshot(&task.id);
    if snap.status != TaskStatus::Completed {
        bail!(
            "la segmentación falló en el paso {}: {}",
            snap.progress,
            snap.error.unwrap_or_default()
        );
    }

    let artifacts = tracker.artifacts(&task.id).unwrap_or_default();
    for slot in ArtifactSlot::ALL {
        println!(
            "{:?}: {}",
            slot,
            task.output_dir.join(artifacts.file_name_or_default(slot)).display()
        );
    }

    Ok(())
}
