use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

pub type TaskId = String;

/// Una corrida de segmentación encolada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Imagen de entrada (ya subida)
    pub input_path: PathBuf,
    /// Log crudo de la corrida (stdout + stderr del proceso)
    pub log_path: PathBuf,
    /// Directorio de trabajo del proceso; ahí quedan las imágenes de salida
    pub output_dir: PathBuf,
}

impl Task {
    pub fn new(
        id: TaskId,
        input_path: impl Into<PathBuf>,
        log_dir: &Path,
        output_root: &Path,
    ) -> Self {
        let log_path = log_dir.join(log_file_name(&id));
        let output_dir = output_root.join(&id);
        Self {
            id,
            input_path: input_path.into(),
            log_path,
            output_dir,
        }
    }

    /// Nombre del archivo de entrada, sin directorios.
    pub fn input_file_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

pub fn log_file_name(id: &str) -> String {
    format!("segmentation_{}.log", id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// El id nunca fue registrado
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Unknown
        )
    }
}

/// Genera ids a partir de la hora de envío (ms desde epoch).
/// Si dos envíos caen en el mismo milisegundo, el segundo se corre en uno,
/// así los ids son únicos y estrictamente crecientes.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    last: AtomicU64,
}

impl TaskIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> TaskId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);

        now.max(prev + 1).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_son_estrictamente_crecientes_aunque_caigan_en_el_mismo_ms() {
        let ids = TaskIdGenerator::new();
        let generated: Vec<u64> = (0..1000)
            .map(|_| ids.next_id().parse::<u64>().unwrap())
            .collect();

        for pair in generated.windows(2) {
            assert!(pair[1] > pair[0], "{} no es mayor que {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn id_se_deriva_de_la_hora_de_envio() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let id: u64 = TaskIdGenerator::new().next_id().parse().unwrap();
        assert!(id >= before);
    }

    #[test]
    fn task_arma_rutas_de_log_y_salida_por_id() {
        let task = Task::new(
            "1700000000000".to_string(),
            "/data/uploads/perro.png",
            Path::new("/tmp/logs"),
            Path::new("/data/outputs"),
        );

        assert_eq!(
            task.log_path,
            PathBuf::from("/tmp/logs/segmentation_1700000000000.log")
        );
        assert_eq!(task.output_dir, PathBuf::from("/data/outputs/1700000000000"));
        assert_eq!(task.input_file_name(), "perro.png");
    }

    #[test]
    fn status_terminales() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Unknown.is_terminal());
    }

    #[test]
    fn status_se_serializa_en_mayusculas() {
        let json = serde_json::to_string(&TaskStatus::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
    }
}
