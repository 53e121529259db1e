//! Broadcasting of import progress for subscribers such as the CLI or an
//! HTTP layer.

pub mod job_progress;

pub use job_progress::{ImportPhase, ImportProgressEvent, JobProgressBroadcaster, JobProgressTracker};
