pub mod artifacts;
pub mod progress;
pub mod results;
pub mod script;
pub mod task;

pub use artifacts::{ArtifactSlot, OutputArtifacts};
pub use progress::{ProgressSnapshot, ProgressState, ProgressTracker};
pub use results::{ArtifactLink, RunRequest, TaskInfo, TaskResults, UploadResponse};
pub use script::EXPECTED_MESSAGES;
pub use task::{Task, TaskId, TaskIdGenerator, TaskStatus};
