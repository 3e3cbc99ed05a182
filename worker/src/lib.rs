pub mod config;
pub mod error;
pub mod queue;
pub mod runner;
pub mod worker;

pub use config::RunnerConfig;
pub use error::{RunError, SubmitError};
pub use queue::{task_queue, TaskQueue};
pub use runner::SegmentationRunner;
pub use worker::{spawn_worker, WorkerHandle};
