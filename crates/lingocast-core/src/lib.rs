pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod session;
pub mod subtitles;

pub use error::CoreError;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle, PlayerCommand};
pub use queue::{EnqueueOutcome, FragmentQueue, PlaybackState, QueueConfig, QueueSnapshot};
pub use session::Session;
pub use subtitles::{SubtitleLog, DEFAULT_TRANSCRIPT_LINES};
