//! Job lifecycle: the in-memory registry and the per-job observers that run
//! alongside the persister.

pub mod monitor;
pub mod progress;
pub mod registry;

pub use monitor::TerminationMonitor;
pub use progress::{ProgressCounter, ProgressReporter};
pub use registry::{CancelOutcome, JobRegistry, RuntimeSnapshot, RuntimeStatus};
