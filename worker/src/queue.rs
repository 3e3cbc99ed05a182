use common::Task;
use tokio::sync::mpsc;

use crate::error::SubmitError;

/// Extremo de envío de la cola FIFO de tareas (sin límite).
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
}

/// Crea la cola; el receptor lo consume un único worker.
pub fn task_queue() -> (TaskQueue, mpsc::UnboundedReceiver<Task>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TaskQueue { tx }, rx)
}

impl TaskQueue {
    /// Encola sin bloquear. Sólo falla si el worker ya se detuvo.
    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        self.tx.send(task).map_err(|_| SubmitError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
