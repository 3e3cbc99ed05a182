use std::{env, path::PathBuf};

/// Configuración del programa de segmentación.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Ejecutable, ej: "python3.6"
    pub program: String,
    /// Argumentos que van antes de la imagen, ej: ["~/app/segment.py"]
    pub leading_args: Vec<String>,
    /// Cada tarea escribe sus imágenes en `output_root/<task_id>`
    pub output_root: PathBuf,
    pub log_dir: PathBuf,
}

/// Directorio base de la app.
/// - SEG_APP_DIR si está definida
/// - si no, $HOME/app
pub fn app_dir() -> PathBuf {
    if let Ok(dir) = env::var("SEG_APP_DIR") {
        return PathBuf::from(dir);
    }
    env::var("HOME")
        .map(|home| PathBuf::from(home).join("app"))
        .unwrap_or_else(|_| PathBuf::from("app"))
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        let app = app_dir();

        let program = env::var("SEG_PROGRAM").unwrap_or_else(|_| "python3.6".to_string());

        // SEG_SCRIPT="" deja al programa sin argumentos extra
        let script = env::var("SEG_SCRIPT")
            .unwrap_or_else(|_| app.join("segment.py").to_string_lossy().to_string());
        let leading_args = if script.is_empty() {
            Vec::new()
        } else {
            vec![script]
        };

        Self {
            program,
            leading_args,
            output_root: env_path("SEG_OUTPUT_DIR", app.join("outputs")),
            log_dir: env_path("SEG_LOG_DIR", env::temp_dir()),
        }
    }
}
