use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifacts::{ArtifactSlot, OutputArtifacts};
use crate::task::{TaskId, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Nombre con el que quedó guardado el archivo
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub status: TaskStatus,
    pub input_file: String,

    pub current: u32,
    pub total: u32,
    /// Sólo en tareas fallidas
    pub error: Option<String>,

    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    pub artifacts: OutputArtifacts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLink {
    pub slot: ArtifactSlot,
    pub filename: String,
    /// Ruta relativa al servidor para descargar el archivo
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub artifacts: Vec<ArtifactLink>,
}

impl TaskResults {
    /// Un link por slot; los slots no vistos usan el nombre fijo.
    pub fn from_artifacts(task_id: &str, status: TaskStatus, artifacts: &OutputArtifacts) -> Self {
        let artifacts = ArtifactSlot::ALL
            .into_iter()
            .map(|slot| {
                let filename = artifacts.file_name_or_default(slot).to_string();
                ArtifactLink {
                    slot,
                    url: format!("/files/outputs/{}/{}", task_id, filename),
                    filename,
                }
            })
            .collect();

        Self {
            task_id: task_id.to_string(),
            status,
            artifacts,
        }
    }
}
