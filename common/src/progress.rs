use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::artifacts::OutputArtifacts;
use crate::results::TaskInfo;
use crate::script::EXPECTED_MESSAGES;
use crate::task::{TaskId, TaskStatus};

/// Paso actual / total de una tarea. Siempre `current <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub current: u32,
    pub total: u32,
}

impl ProgressState {
    pub fn new(current: u32, total: u32) -> Self {
        Self { current, total }
    }

    pub fn is_done(&self) -> bool {
        self.current >= self.total
    }
}

/// Formato del canal de progreso: `current/total`.
impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.total)
    }
}

impl FromStr for ProgressState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (current, total) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("progreso inválido: {s:?}"))?;
        let current = current
            .trim()
            .parse()
            .map_err(|_| format!("paso actual inválido: {s:?}"))?;
        let total = total
            .trim()
            .parse()
            .map_err(|_| format!("total inválido: {s:?}"))?;
        Ok(Self { current, total })
    }
}

/// Lectura atómica de estado + progreso de una tarea.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub status: TaskStatus,
    pub progress: ProgressState,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct TaskEntry {
    input_file: String,
    status: TaskStatus,
    progress: ProgressState,
    // ocurrencias por índice del script
    occurrences: Vec<u32>,
    artifacts: OutputArtifacts,
    error: Option<String>,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TaskEntry {
    fn new(input_file: String, total: u32, script_len: usize) -> Self {
        Self {
            input_file,
            status: TaskStatus::Pending,
            progress: ProgressState::new(0, total),
            occurrences: vec![0; script_len],
            artifacts: OutputArtifacts::default(),
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Estado compartido de todas las tareas: progreso, estado, imágenes de salida.
///
/// Lo escribe sólo el worker (una tarea a la vez) y lo leen los streams de
/// progreso. Un único mutex protege el mapa; toda lectura devuelve una copia.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    tasks: Arc<Mutex<HashMap<TaskId, TaskEntry>>>,
    script: &'static [&'static str],
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::with_script(&EXPECTED_MESSAGES)
    }

    pub fn with_script(script: &'static [&'static str]) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            script,
        }
    }

    pub fn total_steps(&self) -> u32 {
        self.script.len() as u32
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<TaskId, TaskEntry>> {
        // un panic con el lock tomado no deja el mapa a medio escribir
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Alta de una tarea recién enviada (Pending).
    pub fn register(&self, task_id: &str, input_file: impl Into<String>) {
        let entry = TaskEntry::new(input_file.into(), self.total_steps(), self.script.len());
        self.entries().insert(task_id.to_string(), entry);
    }

    /// Arranque de la corrida: pasa a Running con `current = 0`.
    pub fn init_task(&self, task_id: &str, total_steps: u32) {
        let script_len = self.script.len();
        let mut tasks = self.entries();
        let entry = tasks
            .entry(task_id.to_string())
            .or_insert_with(|| TaskEntry::new(String::new(), total_steps, script_len));

        entry.status = TaskStatus::Running;
        entry.progress = ProgressState::new(0, total_steps);
        entry.occurrences = vec![0; script_len];
        entry.artifacts = OutputArtifacts::default();
        entry.error = None;
        entry.started_at = Some(Utc::now());
        entry.finished_at = None;
    }

    /// Procesa una línea de salida del programa.
    ///
    /// Se busca, en orden, el primer mensaje del script contenido en la línea.
    /// Con `n` = cantidad de veces que ese mensaje ya apareció (contando esta),
    /// el progreso pasa a `indice + 1 + n`, recortado a `total - 1` y sin bajar
    /// nunca del valor anterior. Las líneas que no coinciden no cambian nada.
    ///
    /// Mientras la tarea corre nunca llega a `total`: sólo `complete` lo fija,
    /// así `current == total` significa siempre tarea completada.
    ///
    /// Devuelve el progreso resultante, o `None` si la tarea no existe o ya
    /// terminó.
    pub fn observe_line(&self, task_id: &str, line: &str) -> Option<ProgressState> {
        let mut tasks = self.entries();
        let entry = tasks.get_mut(task_id)?;
        if entry.status.is_terminal() {
            return None;
        }

        if let Some(index) = self.script.iter().position(|msg| line.contains(msg)) {
            entry.occurrences[index] += 1;
            let seen = entry.occurrences[index];
            let ceiling = entry.progress.total.saturating_sub(1);
            let step = (index as u32 + 1 + seen).min(ceiling);
            entry.progress.current = entry.progress.current.max(step);
        }

        entry.artifacts.observe_line(line);

        Some(entry.progress)
    }

    /// Fin del stream de salida: `current` queda exactamente en `total`.
    pub fn complete(&self, task_id: &str) {
        if let Some(entry) = self.entries().get_mut(task_id) {
            entry.progress.current = entry.progress.total;
            entry.status = TaskStatus::Completed;
            entry.finished_at = Some(Utc::now());
        }
    }

    /// Marca la tarea como fallida. El progreso queda donde estaba.
    pub fn fail(&self, task_id: &str, reason: impl Into<String>) {
        if let Some(entry) = self.entries().get_mut(task_id) {
            entry.status = TaskStatus::Failed;
            entry.error = Some(reason.into());
            entry.finished_at = Some(Utc::now());
        }
    }

    /// Progreso de la tarea; `0/0` si no existe.
    pub fn get_progress(&self, task_id: &str) -> ProgressState {
        self.entries()
            .get(task_id)
            .map(|e| e.progress)
            .unwrap_or_default()
    }

    pub fn status(&self, task_id: &str) -> TaskStatus {
        self.entries()
            .get(task_id)
            .map(|e| e.status)
            .unwrap_or(TaskStatus::Unknown)
    }

    pub fn snapshot(&self, task_id: &str) -> ProgressSnapshot {
        match self.entries().get(task_id) {
            Some(entry) => ProgressSnapshot {
                status: entry.status,
                progress: entry.progress,
                error: entry.error.clone(),
            },
            None => ProgressSnapshot {
                status: TaskStatus::Unknown,
                progress: ProgressState::default(),
                error: None,
            },
        }
    }

    pub fn artifacts(&self, task_id: &str) -> Option<OutputArtifacts> {
        self.entries().get(task_id).map(|e| e.artifacts.clone())
    }

    pub fn info(&self, task_id: &str) -> Option<TaskInfo> {
        let tasks = self.entries();
        let entry = tasks.get(task_id)?;
        Some(TaskInfo {
            id: task_id.to_string(),
            status: entry.status,
            input_file: entry.input_file.clone(),
            current: entry.progress.current,
            total: entry.progress.total,
            error: entry.error.clone(),
            submitted_at: entry.submitted_at,
            started_at: entry.started_at,
            finished_at: entry.finished_at,
            artifacts: entry.artifacts.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactSlot;

    fn running_tracker(id: &str) -> ProgressTracker {
        let tracker = ProgressTracker::new();
        tracker.register(id, "perro.png");
        tracker.init_task(id, tracker.total_steps());
        tracker
    }

    #[test]
    fn register_deja_la_tarea_pendiente_en_cero() {
        let tracker = ProgressTracker::new();
        tracker.register("t1", "perro.png");

        assert_eq!(tracker.status("t1"), TaskStatus::Pending);
        assert_eq!(tracker.get_progress("t1"), ProgressState::new(0, 25));
    }

    #[test]
    fn tarea_desconocida_es_cero_de_cero() {
        let tracker = ProgressTracker::new();

        assert_eq!(tracker.get_progress("nope"), ProgressState::new(0, 0));
        assert_eq!(tracker.status("nope"), TaskStatus::Unknown);
        assert!(tracker.info("nope").is_none());
        assert_eq!(tracker.observe_line("nope", "begin load"), None);
    }

    #[test]
    fn linea_sin_match_no_cambia_el_progreso() {
        let tracker = running_tracker("t1");
        tracker.observe_line("t1", "Loading weights");
        let before = tracker.get_progress("t1");

        tracker.observe_line("t1", "warning: deprecated numpy alias");
        tracker.observe_line("t1", "");

        assert_eq!(tracker.get_progress("t1"), before);
    }

    #[test]
    fn match_en_indice_i_por_n_esima_vez_da_i_mas_1_mas_n() {
        let tracker = running_tracker("t1");

        // indice 1, primera vez -> 1 + 1 + 1
        tracker.observe_line("t1", "Loading weights from /models/x.pth");
        assert_eq!(tracker.get_progress("t1").current, 3);

        // "Starting get_fill..." es indice 11
        tracker.observe_line("t1", "Starting get_fill...");
        assert_eq!(tracker.get_progress("t1").current, 13);
        tracker.observe_line("t1", "Starting get_fill...");
        assert_eq!(tracker.get_progress("t1").current, 14);
        tracker.observe_line("t1", "Starting get_fill...");
        assert_eq!(tracker.get_progress("t1").current, 15);
    }

    #[test]
    fn primer_patron_gana_cuando_la_linea_contiene_varios() {
        let tracker = running_tracker("t1");

        // contiene "begin load" (0) y "Loading weights" (1)
        tracker.observe_line("t1", "begin load / Loading weights");
        assert_eq!(tracker.get_progress("t1").current, 2);

        // la siguiente aparición de "Loading weights" cuenta como la primera
        tracker.observe_line("t1", "Loading weights");
        assert_eq!(tracker.get_progress("t1").current, 3);
    }

    #[test]
    fn corriendo_nunca_llega_al_total_aunque_salga_todo_el_script() {
        let tracker = running_tracker("t1");
        for line in EXPECTED_MESSAGES {
            tracker.observe_line("t1", line);
        }

        assert_eq!(tracker.get_progress("t1"), ProgressState::new(24, 25));
        assert_eq!(tracker.status("t1"), TaskStatus::Running);

        tracker.fail("t1", "el proceso terminó con código 1");
        let snap = tracker.snapshot("t1");
        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.progress, ProgressState::new(24, 25));
    }

    #[test]
    fn script_canonico_completo_termina_en_25_de_25() {
        let tracker = running_tracker("t1");
        let mut previous = 0;

        for line in EXPECTED_MESSAGES {
            let state = tracker.observe_line("t1", line).unwrap();
            assert!(state.current >= previous, "el progreso bajó en {line:?}");
            assert!(state.current <= state.total);
            previous = state.current;
        }
        tracker.complete("t1");

        assert_eq!(tracker.get_progress("t1"), ProgressState::new(25, 25));
        assert_eq!(tracker.status("t1"), TaskStatus::Completed);
    }

    #[test]
    fn progreso_nunca_baja_ni_supera_el_total() {
        let tracker = running_tracker("t1");
        let lines = [
            "Processing complete!",
            "begin load",
            "Processing complete!",
            "Processing complete!",
            "Loading weights",
            "Starting go_flipped_vector...",
        ];

        let mut previous = 0;
        for line in lines {
            let state = tracker.observe_line("t1", line).unwrap();
            assert!(state.current >= previous);
            assert!(state.current < 25);
            previous = state.current;
        }
        assert_eq!(previous, 24);
    }

    #[test]
    fn complete_fija_exactamente_el_total_aunque_falten_lineas() {
        let tracker = running_tracker("t1");
        tracker.observe_line("t1", "begin load");
        tracker.complete("t1");

        assert_eq!(tracker.get_progress("t1"), ProgressState::new(25, 25));
    }

    #[test]
    fn fail_conserva_el_progreso_y_guarda_el_motivo() {
        let tracker = running_tracker("t1");
        for line in &EXPECTED_MESSAGES[..5] {
            tracker.observe_line("t1", line);
        }
        let partial = tracker.get_progress("t1");

        tracker.fail("t1", "el proceso terminó por una señal");

        let snap = tracker.snapshot("t1");
        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.progress, partial);
        assert!(snap.progress.current < snap.progress.total);
        assert_eq!(snap.error.as_deref(), Some("el proceso terminó por una señal"));
    }

    #[test]
    fn lineas_despues_de_terminar_se_ignoran() {
        let tracker = running_tracker("t1");
        tracker.fail("t1", "boom");

        assert_eq!(tracker.observe_line("t1", "Processing complete!"), None);
        assert_eq!(tracker.get_progress("t1").current, 0);
    }

    #[test]
    fn imagenes_de_salida_quedan_por_tarea() {
        let tracker = ProgressTracker::new();
        for id in ["a", "b"] {
            tracker.register(id, "x.png");
            tracker.init_task(id, tracker.total_steps());
        }

        tracker.observe_line("a", "./current_skeleton.png");
        tracker.observe_line("b", "./current_flatten.png");

        let a = tracker.artifacts("a").unwrap();
        let b = tracker.artifacts("b").unwrap();
        assert_eq!(a.get(ArtifactSlot::Skeleton), Some("current_skeleton.png"));
        assert_eq!(a.get(ArtifactSlot::Flatten), None);
        assert_eq!(b.get(ArtifactSlot::Flatten), Some("current_flatten.png"));
        assert_eq!(b.get(ArtifactSlot::Skeleton), None);
    }

    #[test]
    fn init_task_reinicia_contadores() {
        let tracker = running_tracker("t1");
        tracker.observe_line("t1", "Starting get_fill...");
        tracker.observe_line("t1", "Starting get_fill...");

        tracker.init_task("t1", tracker.total_steps());
        tracker.observe_line("t1", "Starting get_fill...");

        assert_eq!(tracker.get_progress("t1").current, 13);
    }

    #[test]
    fn script_corto_para_probar_la_formula() {
        static SCRIPT: [&str; 4] = ["uno", "dos", "uno", "fin"];
        let tracker = ProgressTracker::with_script(&SCRIPT);
        tracker.register("t", "in");
        tracker.init_task("t", tracker.total_steps());

        assert_eq!(tracker.observe_line("t", "uno").unwrap().current, 2);
        assert_eq!(tracker.observe_line("t", "dos").unwrap().current, 3);
        // "uno" otra vez: 0 + 1 + 2 = 3, no baja
        assert_eq!(tracker.observe_line("t", "uno").unwrap().current, 3);
        // "fin" daría 4 = total, queda en total - 1 hasta complete
        assert_eq!(tracker.observe_line("t", "fin").unwrap().current, 3);
        tracker.complete("t");
        assert_eq!(tracker.get_progress("t"), ProgressState::new(4, 4));
    }

    #[test]
    fn progreso_se_formatea_y_parsea_como_current_barra_total() {
        let state = ProgressState::new(7, 25);
        assert_eq!(state.to_string(), "7/25");
        assert_eq!("7/25".parse::<ProgressState>().unwrap(), state);
        assert_eq!(" 0/0 ".parse::<ProgressState>().unwrap(), ProgressState::default());
        assert!("siete/25".parse::<ProgressState>().is_err());
        assert!("25".parse::<ProgressState>().is_err());
    }

    #[test]
    fn info_refleja_estado_y_fechas() {
        let tracker = running_tracker("t1");
        tracker.observe_line("t1", "begin load");

        let info = tracker.info("t1").unwrap();
        assert_eq!(info.status, TaskStatus::Running);
        assert_eq!(info.input_file, "perro.png");
        assert_eq!((info.current, info.total), (2, 25));
        assert!(info.started_at.is_some());
        assert!(info.finished_at.is_none());
    }
}
