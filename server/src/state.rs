// server/src/state.rs

use common::{ProgressTracker, TaskIdGenerator};
use std::sync::Arc;
use worker::TaskQueue;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub tracker: ProgressTracker,
    // extremo de envío de la cola del worker
    pub queue: TaskQueue,
    pub ids: Arc<TaskIdGenerator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(tracker: ProgressTracker, queue: TaskQueue, config: ServerConfig) -> Self {
        Self {
            tracker,
            queue,
            ids: Arc::new(TaskIdGenerator::new()),
            config: Arc::new(config),
        }
    }
}
