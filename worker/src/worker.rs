use std::sync::Arc;

use common::{ProgressTracker, Task};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::queue::{task_queue, TaskQueue};
use crate::runner::SegmentationRunner;

/// Control del worker en segundo plano.
pub struct WorkerHandle {
    close: CancellationToken,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Deja de aceptar tareas; las que ya estaban en cola se procesan igual.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Se detiene después de la tarea en curso. Lo que quede en cola se marca
    /// como fallido para que sus streams terminen.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!("el worker terminó con panic: {:?}", e);
        }
    }

    /// Cierra la cola y espera a que se vacíe.
    pub async fn shutdown(self) {
        self.close();
        self.join().await;
    }
}

/// Arranca el único worker.
/// - Espera tareas de la cola.
/// - Ejecuta una a la vez: la siguiente no sale de la cola hasta que la
///   anterior terminó de drenar su salida.
/// - Los errores (y panics) de una tarea quedan en esa tarea como Failed.
pub fn spawn_worker(
    runner: SegmentationRunner,
    tracker: ProgressTracker,
    cancel: CancellationToken,
) -> (TaskQueue, WorkerHandle) {
    let (queue, rx) = task_queue();
    let close = CancellationToken::new();

    let join = tokio::spawn(run_loop(
        rx,
        Arc::new(runner),
        tracker,
        close.clone(),
        cancel.clone(),
    ));

    (queue, WorkerHandle { close, cancel, join })
}

async fn run_loop(
    mut rx: mpsc::UnboundedReceiver<Task>,
    runner: Arc<SegmentationRunner>,
    tracker: ProgressTracker,
    close: CancellationToken,
    cancel: CancellationToken,
) {
    info!("worker iniciado");
    let mut closing = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = close.cancelled(), if !closing => {
                info!("cola cerrada, procesando tareas pendientes");
                rx.close();
                closing = true;
                continue;
            }
            next = rx.recv() => next,
        };

        let Some(task) = next else {
            break;
        };
        process_task(&runner, &tracker, task).await;
    }

    rx.close();
    while let Ok(task) = rx.try_recv() {
        warn!(task_id = %task.id, "worker detenido, la tarea no se ejecutó");
        tracker.fail(&task.id, "worker detenido antes de ejecutar la tarea");
    }

    info!("worker detenido");
}

/// Corre una tarea en su propio task de tokio para aislar panics, y espera
/// a que termine antes de volver al loop.
async fn process_task(runner: &Arc<SegmentationRunner>, tracker: &ProgressTracker, task: Task) {
    info!(
        task_id = %task.id,
        input = %task.input_path.display(),
        "procesando tarea"
    );

    let handle = {
        let runner = runner.clone();
        let tracker = tracker.clone();
        let task = task.clone();
        tokio::spawn(async move { runner.run(&task, &tracker).await })
    };

    match handle.await {
        Ok(Ok(())) => {
            info!(task_id = %task.id, "tarea terminada correctamente");
        }
        Ok(Err(e)) => {
            error!(task_id = %task.id, error = %e, "error procesando tarea");
            tracker.fail(&task.id, e.to_string());
        }
        Err(e) => {
            error!(task_id = %task.id, "panic o join error en tarea: {:?}", e);
            tracker.fail(&task.id, format!("panic: {e}"));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::SubmitError;
    use crate::runner::tests::{canonical_script_body, mock_program, temp_dir};
    use crate::RunnerConfig;
    use common::{ProgressState, TaskStatus};
    use std::{fs, time::Duration};

    fn submit(
        queue: &TaskQueue,
        tracker: &ProgressTracker,
        cfg: &RunnerConfig,
        id: &str,
        input: &str,
    ) {
        let task = Task::new(id.to_string(), input, &cfg.log_dir, &cfg.output_root);
        tracker.register(&task.id, task.input_file_name());
        queue.submit(task).unwrap();
    }

    #[tokio::test]
    async fn tareas_se_ejecutan_de_a_una_en_orden_de_envio() {
        let dir = temp_dir("serial");
        let trace = dir.join("trace.txt");
        let body = format!(
            "echo \"start $1\" >> {trace}\nsleep 0.2\necho \"end $1\" >> {trace}",
            trace = trace.display()
        );
        let cfg = mock_program(&dir, &body);
        let tracker = ProgressTracker::new();
        let (queue, handle) = spawn_worker(
            SegmentationRunner::new(cfg.clone()),
            tracker.clone(),
            CancellationToken::new(),
        );

        submit(&queue, &tracker, &cfg, "1", "a");
        submit(&queue, &tracker, &cfg, "2", "b");
        submit(&queue, &tracker, &cfg, "3", "c");
        handle.shutdown().await;

        let content = fs::read_to_string(&trace).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec!["start a", "end a", "start b", "end b", "start c", "end c"]
        );
        for id in ["1", "2", "3"] {
            assert_eq!(tracker.status(id), TaskStatus::Completed);
        }
    }

    #[tokio::test]
    async fn una_tarea_fallida_no_detiene_al_worker() {
        let dir = temp_dir("keeps_going");
        let body = format!(
            "case \"$1\" in *malo*) echo 'begin load'; exit 2;; esac\n{}",
            canonical_script_body()
        );
        let cfg = mock_program(&dir, &body);
        let tracker = ProgressTracker::new();
        let (queue, handle) = spawn_worker(
            SegmentationRunner::new(cfg.clone()),
            tracker.clone(),
            CancellationToken::new(),
        );

        submit(&queue, &tracker, &cfg, "1", "malo.png");
        submit(&queue, &tracker, &cfg, "2", "bueno.png");
        handle.shutdown().await;

        let failed = tracker.snapshot("1");
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.progress, ProgressState::new(2, 25));
        assert!(failed.error.unwrap().contains("código 2"));

        assert_eq!(tracker.status("2"), TaskStatus::Completed);
        assert_eq!(tracker.get_progress("2"), ProgressState::new(25, 25));
    }

    #[tokio::test]
    async fn cancelar_marca_como_fallidas_las_tareas_en_cola() {
        let dir = temp_dir("cancel");
        let cfg = mock_program(&dir, "sleep 0.3\necho 'begin load'");
        let tracker = ProgressTracker::new();
        let (queue, handle) = spawn_worker(
            SegmentationRunner::new(cfg.clone()),
            tracker.clone(),
            CancellationToken::new(),
        );

        submit(&queue, &tracker, &cfg, "1", "a");
        submit(&queue, &tracker, &cfg, "2", "b");

        // esperar a que la primera esté corriendo
        while tracker.status("1") != TaskStatus::Running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.cancel();
        handle.join().await;

        // la tarea en curso termina igual
        assert_eq!(tracker.status("1"), TaskStatus::Completed);
        let queued = tracker.snapshot("2");
        assert_eq!(queued.status, TaskStatus::Failed);
        assert_eq!(queued.progress.current, 0);
        assert!(matches!(
            queue.submit(Task::new("3".into(), "c", &cfg.log_dir, &cfg.output_root)),
            Err(SubmitError::Closed)
        ));
    }

    #[tokio::test]
    async fn close_rechaza_tareas_nuevas_pero_drena_las_encoladas() {
        let dir = temp_dir("close");
        let cfg = mock_program(&dir, "echo 'begin load'");
        let tracker = ProgressTracker::new();
        let (queue, handle) = spawn_worker(
            SegmentationRunner::new(cfg.clone()),
            tracker.clone(),
            CancellationToken::new(),
        );

        submit(&queue, &tracker, &cfg, "1", "a");
        handle.close();
        handle.join().await;

        assert_eq!(tracker.status("1"), TaskStatus::Completed);
        assert!(queue.is_closed());
    }
}
