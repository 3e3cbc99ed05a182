//! Stream de progreso por tarea (SSE).
//!
//! Es polling: se lee el tracker, se emite, se duerme `poll_interval` y se
//! repite mientras la tarea esté Pending o Running.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use common::{ProgressState, ProgressTracker, TaskId, TaskStatus};
use futures::{Stream, StreamExt};
use tracing::{debug, info};

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Tarea en cola o corriendo
    Progress(ProgressState),
    /// Último evento de una tarea exitosa: siempre `total/total`
    Completed(ProgressState),
    Failed {
        progress: ProgressState,
        reason: String,
    },
    /// El id nunca existió; se emite `0/0`
    Unknown,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress(_))
    }

    /// Progreso y completado van como `message` con `current/total`.
    /// Fallo y id desconocido llevan su propio nombre de evento.
    pub fn into_sse(self) -> Event {
        match self {
            ProgressEvent::Progress(state) | ProgressEvent::Completed(state) => {
                Event::default().data(state.to_string())
            }
            ProgressEvent::Failed { progress, reason } => Event::default()
                .event("failed")
                .data(format!("{}\n{}", progress, reason.replace('\r', " "))),
            ProgressEvent::Unknown => Event::default()
                .event("unknown")
                .data(ProgressState::default().to_string()),
        }
    }
}

/// Secuencia de snapshots de una tarea hasta que llega a un estado terminal.
pub fn progress_updates(
    tracker: ProgressTracker,
    task_id: TaskId,
    poll_interval: Duration,
) -> impl Stream<Item = ProgressEvent> {
    async_stream::stream! {
        loop {
            let snap = tracker.snapshot(&task_id);
            match snap.status {
                TaskStatus::Pending | TaskStatus::Running => {
                    yield ProgressEvent::Progress(snap.progress);
                }
                TaskStatus::Completed => {
                    let total = snap.progress.total;
                    yield ProgressEvent::Completed(ProgressState::new(total, total));
                    break;
                }
                TaskStatus::Failed => {
                    yield ProgressEvent::Failed {
                        progress: snap.progress,
                        reason: snap.error.unwrap_or_default(),
                    };
                    break;
                }
                TaskStatus::Unknown => {
                    yield ProgressEvent::Unknown;
                    break;
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

// GET /api/v1/tasks/:id/progress
pub async fn progress_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(task_id = %id, "cliente SSE conectado");

    let task_id = id.clone();
    let events = progress_updates(state.tracker.clone(), id, state.config.poll_interval).map(
        move |event| {
            if event.is_terminal() {
                debug!(task_id = %task_id, ?event, "fin del stream de progreso");
            }
            Ok(event.into_sse())
        },
    );

    Sse::new(events).keep_alive(KeepAlive::default())
}
