use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{RunRequest, Task, TaskInfo, TaskResults, UploadResponse};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::progress::progress_stream;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/uploads", post(upload_file))
        .route("/api/v1/tasks", post(create_task))
        .route("/api/v1/tasks/:id", get(get_task))
        .route("/api/v1/tasks/:id/progress", get(progress_stream))
        .route("/api/v1/tasks/:id/results", get(get_task_results))
        // imágenes subidas y salidas de cada tarea (`/files/outputs/<id>/<archivo>`)
        .nest_service("/files/uploads", ServeDir::new(&config.upload_dir))
        .nest_service("/files/outputs", ServeDir::new(&config.runner.output_root))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

/// Deja sólo el último componente del nombre que mandó el cliente.
fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

// Guarda la imagen del campo `file` en el directorio de uploads
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or_else(|| ApiError::BadRequest("nombre de archivo inválido".to_string()))?;
        let data = field.bytes().await?;

        let upload_dir = &state.config.upload_dir;
        tokio::fs::create_dir_all(upload_dir).await?;
        tokio::fs::write(upload_dir.join(&filename), &data).await?;

        info!(file = %filename, bytes = data.len(), "archivo subido");
        return Ok(Json(UploadResponse { filename }));
    }

    Err(ApiError::BadRequest("falta el campo 'file'".to_string()))
}

// Crea una tarea para un archivo ya subido y la deja en la cola del worker
async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<(StatusCode, Json<TaskInfo>), ApiError> {
    let filename = sanitize_file_name(&req.filename)
        .ok_or_else(|| ApiError::BadRequest("nombre de archivo inválido".to_string()))?;
    let upload = state.config.upload_dir.join(&filename);
    if !tokio::fs::try_exists(&upload).await.unwrap_or(false) {
        return Err(ApiError::BadRequest(format!(
            "no hay ningún archivo subido con nombre {filename}"
        )));
    }

    // la tarea trabaja sobre su propia copia: volver a subir el mismo nombre
    // no cambia la entrada de una tarea ya encolada
    let runner = &state.config.runner;
    let task_id = state.ids.next_id();
    let task_dir = runner.output_root.join(&task_id);
    tokio::fs::create_dir_all(&task_dir).await?;
    let input = task_dir.join(&filename);
    tokio::fs::copy(&upload, &input).await?;

    let task = Task::new(task_id.clone(), input, &runner.log_dir, &runner.output_root);
    state.tracker.register(&task_id, task.input_file_name());

    if let Err(e) = state.queue.submit(task) {
        warn!(task_id = %task_id, "no se pudo encolar: {}", e);
        state.tracker.fail(&task_id, e.to_string());
        return Err(ApiError::Unavailable(e.to_string()));
    }

    info!(task_id = %task_id, file = %filename, "tarea encolada");

    let info = state
        .tracker
        .info(&task_id)
        .ok_or_else(|| ApiError::TaskNotFound(task_id.clone()))?;
    Ok((StatusCode::ACCEPTED, Json(info)))
}

// Devuelve estado, progreso y tiempos de una tarea
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskInfo>, ApiError> {
    state
        .tracker
        .info(&id)
        .map(Json)
        .ok_or(ApiError::TaskNotFound(id))
}

// Links de descarga de las tres imágenes de salida
async fn get_task_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskResults>, ApiError> {
    let Some(artifacts) = state.tracker.artifacts(&id) else {
        return Err(ApiError::TaskNotFound(id));
    };
    let status = state.tracker.status(&id);

    Ok(Json(TaskResults::from_artifacts(&id, status, &artifacts)))
}
