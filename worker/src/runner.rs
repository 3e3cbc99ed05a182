use std::{
    io::{self, BufRead, Read},
    process::Stdio,
};

use common::{ProgressTracker, Task};
use os_pipe::PipeWriter;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    process::Command,
    sync::mpsc,
};
use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::error::RunError;

/// Lanza el programa de segmentación y sigue su salida línea a línea.
#[derive(Debug, Clone)]
pub struct SegmentationRunner {
    cfg: RunnerConfig,
}

impl SegmentationRunner {
    pub fn new(cfg: RunnerConfig) -> Self {
        Self { cfg }
    }

    /// `<program> <leading_args...> <input>` con cwd en el directorio de la tarea.
    /// stdout y stderr escriben en el mismo pipe, como `2>&1`.
    fn command_for(&self, task: &Task, output: &PipeWriter) -> io::Result<Command> {
        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&self.cfg.leading_args)
            .arg(&task.input_path)
            .current_dir(&task.output_dir)
            .stdin(Stdio::null())
            .stdout(output.try_clone()?)
            .stderr(output.try_clone()?)
            .kill_on_drop(true);
        Ok(cmd)
    }

    /// Corre una tarea completa:
    /// 1. arranca el progreso en 0/total
    /// 2. cada línea (stdout y stderr mezclados en el orden en que se
    ///    escribieron) va al log con flush inmediato y después al tracker
    /// 3. al agotarse la salida espera el exit; si fue exitoso fija current = total
    ///
    /// Si algo falla el error sube al worker y la tarea nunca llega al total.
    pub async fn run(&self, task: &Task, tracker: &ProgressTracker) -> Result<(), RunError> {
        fs::create_dir_all(&task.output_dir).await?;
        if let Some(parent) = task.log_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&task.log_path)
            .await?;

        tracker.init_task(&task.id, tracker.total_steps());

        let (output, writer) = os_pipe::pipe()?;
        let mut cmd = self.command_for(task, &writer)?;
        let spawned = cmd.spawn();
        // el padre no puede quedarse con el extremo de escritura: sin esto el
        // pipe nunca llega a EOF
        drop(cmd);
        drop(writer);

        let mut child = spawned.map_err(|source| RunError::Spawn {
            program: self.cfg.program.clone(),
            source,
        })?;

        info!(
            task_id = %task.id,
            pid = child.id(),
            log = %task.log_path.display(),
            "proceso de segmentación lanzado"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let reader = tokio::task::spawn_blocking(move || forward_lines(output, tx));

        while let Some(line) = rx.recv().await {
            log.write_all(line.as_bytes()).await?;
            log.write_all(b"\n").await?;
            log.flush().await?;

            if let Some(state) = tracker.observe_line(&task.id, &line) {
                debug!(task_id = %task.id, progress = %state, %line, "salida");
            }
        }

        reader.await.map_err(io::Error::other)??;

        let status = child.wait().await?;
        if !status.success() {
            return Err(match status.code() {
                Some(code) => RunError::NonZeroExit { code },
                None => RunError::Killed,
            });
        }

        tracker.complete(&task.id);
        info!(task_id = %task.id, "segmentación completada");
        Ok(())
    }
}

/// Lee líneas del pipe de salida y las manda al canal. Es bloqueante: corre
/// en `spawn_blocking`.
/// Los bytes que no son UTF-8 se reemplazan; se quitan `\r\n` finales.
fn forward_lines(output: impl Read, tx: mpsc::UnboundedSender<String>) -> io::Result<()> {
    let mut reader = io::BufReader::new(output);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        if tx.send(decode_line(&buf)).is_err() {
            // el consumidor se fue (error escribiendo el log)
            return Ok(());
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
